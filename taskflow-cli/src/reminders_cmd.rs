use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Subcommand;
use taskflow_core::{PermissionStatus, PlannedReminder, ReminderAction, SettingsProvider};

use crate::App;
use crate::tasks_cmd::{format_local, resolve_id};

#[derive(Subcommand, Debug)]
pub enum RemindersCommand {
    /// List scheduled reminders, soonest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Deliver reminders that are due and drop them from the queue
    Fire {
        /// Print what would fire without touching the queue
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Include reminders due within the next N minutes
        #[arg(long, default_value_t = 0)]
        include_future_minutes: i64,
    },

    /// Mark the task behind a delivered reminder as completed
    Complete { id: String },

    /// Postpone the task behind a delivered reminder by one hour
    Snooze { id: String },

    /// Queue summary (due/future) and permission state
    Status,

    /// Recompute reminders for every pending task
    Reconcile,

    /// Show or change the reminder permission
    Permission {
        #[command(subcommand)]
        command: Option<PermissionCommand>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum PermissionCommand {
    Allow,
    Deny,
    /// Forget the answer so the next reminder asks again
    Reset,
}

pub async fn run(app: &App, cmd: RemindersCommand) -> Result<()> {
    match cmd {
        RemindersCommand::List { limit } => list(app, limit),
        RemindersCommand::Fire {
            dry_run,
            include_future_minutes,
        } => fire(app, dry_run, include_future_minutes),
        RemindersCommand::Complete { id } => act(app, &id, ReminderAction::Complete).await,
        RemindersCommand::Snooze { id } => act(app, &id, ReminderAction::Postpone).await,
        RemindersCommand::Status => status(app),
        RemindersCommand::Reconcile => {
            app.controller.reconcile_all().await;
            app.finish().await;
            println!("Reconciled {} pending tasks.", app.controller.pending_tasks().len());
            Ok(())
        }
        RemindersCommand::Permission { command } => permission(app, command).await,
    }
}

fn list(app: &App, limit: usize) -> Result<()> {
    let pending = app.queue.pending()?;
    if pending.is_empty() {
        println!("No scheduled reminders.");
        return Ok(());
    }
    for r in pending.iter().take(limit) {
        println!("{}", render_reminder(app, r));
    }
    if pending.len() > limit {
        println!("... and {} more", pending.len() - limit);
    }
    Ok(())
}

fn fire(app: &App, dry_run: bool, include_future_minutes: i64) -> Result<()> {
    if app.queue.permission()? == PermissionStatus::Denied {
        println!("Reminders are not allowed; nothing delivered.");
        return Ok(());
    }
    let cutoff = Utc::now() + Duration::minutes(include_future_minutes.max(0));

    let due: Vec<PlannedReminder> = if dry_run {
        app.queue
            .pending()?
            .into_iter()
            .filter(|r| r.trigger_at <= cutoff)
            .collect()
    } else {
        app.queue.take_due(cutoff)?
    };

    if due.is_empty() {
        println!("No due reminders.");
        return Ok(());
    }
    for r in &due {
        let prefix = if dry_run { "[dry-run] " } else { "" };
        println!("{prefix}{}: {}", r.content.title, r.content.body.replace('\n', " | "));
        println!("    {}", action_hint(r));
    }
    if !dry_run {
        tracing::info!(count = due.len(), "delivered reminders");
    }
    Ok(())
}

async fn act(app: &App, id: &str, action: ReminderAction) -> Result<()> {
    let id = resolve_id(&app.controller.tasks(), id)?;
    let task = app.controller.apply_reminder_action(id, action).await?;
    app.finish().await;
    match action {
        ReminderAction::Complete => println!("completed: {}", task.title),
        ReminderAction::Postpone => {
            let due = task.due.map(|d| format_local(d, app.tz)).unwrap_or_default();
            println!("postponed: {} (due {due})", task.title);
        }
    }
    Ok(())
}

fn action_hint(r: &PlannedReminder) -> String {
    let short = &r.key.task_id.to_string()[..8];
    ReminderAction::ALL
        .iter()
        .map(|a| {
            let verb = match a {
                ReminderAction::Complete => "complete",
                ReminderAction::Postpone => "snooze",
            };
            format!("[{}: taskflow reminders {verb} {short}]", a.title())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn status(app: &App) -> Result<()> {
    let now = Utc::now();
    let pending = app.queue.pending()?;
    let due = pending.iter().filter(|r| r.trigger_at <= now).count();
    println!(
        "Queue: {} total, {} due, {} future",
        pending.len(),
        due,
        pending.len() - due
    );
    println!("Permission: {}", permission_label(app.queue.permission()?));
    println!(
        "Notifications: {} (default lead {} min)",
        if app.settings.snapshot().notifications_enabled { "on" } else { "off" },
        app.settings.snapshot().default_lead_minutes
    );
    Ok(())
}

async fn permission(app: &App, command: Option<PermissionCommand>) -> Result<()> {
    let Some(command) = command else {
        println!("{}", permission_label(app.queue.permission()?));
        return Ok(());
    };
    let status = match command {
        PermissionCommand::Allow => PermissionStatus::Authorized,
        PermissionCommand::Deny => PermissionStatus::Denied,
        PermissionCommand::Reset => PermissionStatus::NotDetermined,
    };
    app.queue.set_permission(status)?;

    match status {
        // Newly allowed reminders are scheduled right away.
        PermissionStatus::Authorized => {
            app.controller.reconcile_all().await;
            app.finish().await;
        }
        PermissionStatus::Denied => {
            let dropped = app.queue.clear()?;
            if dropped > 0 {
                println!("Dropped {dropped} queued reminders.");
            }
        }
        PermissionStatus::NotDetermined => {}
    }
    println!("Permission: {}", permission_label(status));
    Ok(())
}

fn permission_label(status: PermissionStatus) -> &'static str {
    match status {
        PermissionStatus::Authorized => "allowed",
        PermissionStatus::Denied => "denied",
        PermissionStatus::NotDetermined => "not asked yet",
    }
}

fn render_reminder(app: &App, r: &PlannedReminder) -> String {
    let at = r.trigger_at.with_timezone(&app.tz).format("%Y-%m-%d %H:%M");
    let title = r.content.body.lines().next().unwrap_or_default();
    format!(
        "{at}  {:>5}m  {:<14} {}  ({})",
        r.key.offset_minutes,
        r.content.title,
        title,
        r.key.identifier()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_core::{Settings, Task, plan_reminders};

    #[test]
    fn hint_names_both_actions_with_short_id() {
        let t = Task::new("pay rent").with_due(Utc::now() + Duration::hours(3));
        let r = &plan_reminders(&t, &Settings::default())[0];
        let hint = action_hint(r);
        let short = &t.id.to_string()[..8];

        assert!(hint.contains(&format!("taskflow reminders complete {short}")));
        assert!(hint.contains(&format!("taskflow reminders snooze {short}")));
        assert!(hint.contains(ReminderAction::Postpone.title()));
    }
}
