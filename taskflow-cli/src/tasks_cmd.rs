use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Args;
use taskflow_core::{
    EarlyReminder, Priority, RepeatRule, SettingsProvider, Task, TaskDraft, TaskId, TaskStats,
    parse_local_due, plan_reminders,
};

use crate::App;

#[derive(Args, Debug, Default)]
pub struct TaskFields {
    /// Longer description
    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Due date as "YYYY-MM-DD HH:MM" in --tz (or the configured timezone)
    #[arg(long)]
    pub due: Option<String>,

    /// IANA timezone for --due (e.g. Europe/Rome)
    #[arg(long)]
    pub tz: Option<String>,

    /// low | medium | high
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,

    /// Reference URL
    #[arg(long)]
    pub url: Option<String>,

    /// never | hourly | daily | weekdays | weekends | weekly | monthly | quarterly | biannually | yearly
    #[arg(long)]
    pub repeat: Option<RepeatRule>,

    /// Early reminder in minutes (5, 15, 30, 60, 120, 1440, 2880, 10080, 43200) or "none"
    #[arg(long)]
    pub early: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub pending: bool,
    pub completed: bool,
    pub today: bool,
}

pub async fn add(app: &App, title: String, fields: TaskFields) -> Result<()> {
    let due = parse_due(app, &fields)?;
    let draft = TaskDraft {
        title,
        description: fields.description,
        due,
        completed: false,
        priority: fields.priority,
        url: fields.url,
        repeat: fields.repeat.unwrap_or_default(),
        early_reminder: parse_early(fields.early.as_deref())?.flatten(),
    };

    let task = app.controller.add(draft).await?;
    app.finish().await;
    if app.controller.task(task.id).is_some() {
        println!("Added {}", render_row(&task, app.tz));
    }
    Ok(())
}

pub async fn edit(app: &App, id: &str, title: Option<String>, clear_due: bool, fields: TaskFields) -> Result<()> {
    let id = resolve_id(&app.controller.tasks(), id)?;
    let mut task = app
        .controller
        .task(id)
        .with_context(|| format!("task {id} is not in the list"))?;

    if let Some(title) = title {
        task.title = title;
    }
    if let Some(d) = fields.description.clone() {
        task.description = Some(d);
    }
    if clear_due {
        task.due = None;
    } else if let Some(due) = parse_due(app, &fields)? {
        task.due = Some(due);
    }
    if let Some(p) = fields.priority {
        task.priority = p;
    }
    if let Some(url) = fields.url.clone() {
        task.url = Some(url);
    }
    if let Some(r) = fields.repeat {
        task.repeat = r;
    }
    if let Some(early) = parse_early(fields.early.as_deref())? {
        task.early_reminder = early;
    }

    app.controller.update(task).await?;
    app.finish().await;
    if let Some(t) = app.controller.task(id) {
        println!("Updated {}", render_row(&t, app.tz));
    }
    Ok(())
}

pub async fn toggle(app: &App, id: &str) -> Result<()> {
    let id = resolve_id(&app.controller.tasks(), id)?;
    let task = app.controller.toggle_completion(id).await?;
    app.finish().await;
    let state = if task.completed { "completed" } else { "reopened" };
    println!("{state}: {}", task.title);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    let id = resolve_id(&app.controller.tasks(), id)?;
    let title = app.controller.task(id).map(|t| t.title).unwrap_or_default();
    app.controller.delete(id).await;
    app.finish().await;
    println!("Deleted {title}");
    Ok(())
}

pub fn list(app: &App, filter: ListFilter) -> Result<()> {
    let tasks = if filter.today {
        app.controller.tasks_due_today(app.tz)
    } else if filter.pending {
        app.controller.pending_tasks()
    } else if filter.completed {
        app.controller.completed_tasks()
    } else {
        app.controller.tasks()
    };

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for t in &tasks {
        println!("{}", render_row(t, app.tz));
    }
    Ok(())
}

pub fn show(app: &App, id: &str) -> Result<()> {
    let id = resolve_id(&app.controller.tasks(), id)?;
    let t = app
        .controller
        .task(id)
        .with_context(|| format!("task {id} is not in the list"))?;

    println!("{}", t.title);
    println!("  id:        {}", t.id);
    println!("  status:    {}", if t.completed { "completed" } else { "pending" });
    println!("  priority:  {}", t.priority.title());
    if let Some(d) = &t.description {
        println!("  notes:     {d}");
    }
    if let Some(url) = &t.url {
        println!("  url:       {url}");
    }
    match t.due {
        Some(due) => {
            println!("  due:       {}", format_local(due, app.tz));
            if let Some(next) = t.repeat.next_occurrence(due) {
                println!("  repeats:   {} (next {})", t.repeat, format_local(next, app.tz));
            }
        }
        None => println!("  due:       -"),
    }
    if let Some(early) = t.early_reminder {
        println!("  early:     {} before", early.title());
    }

    let settings = app.settings.snapshot();
    let plan = plan_reminders(&t, &settings);
    if plan.is_empty() {
        println!("  reminders: none");
    } else {
        for r in plan {
            println!(
                "  reminder:  {} min before -> {}",
                r.key.offset_minutes,
                format_local(r.trigger_at, app.tz)
            );
        }
    }
    Ok(())
}

pub fn stats(app: &App) -> Result<()> {
    let s: TaskStats = app.controller.stats();
    println!("Tasks:        {} ({} pending, {} completed)", s.total, s.pending, s.completed);
    println!("Priority:     high {} | medium {} | low {}", s.high, s.medium, s.low);
    println!("Completion:   {:.0}%", s.completion_rate * 100.0);
    println!("Per day:      {:.2}", s.daily_productivity);
    Ok(())
}

/// Accept a full UUID or a unique prefix of one.
pub fn resolve_id(tasks: &[Task], needle: &str) -> Result<TaskId> {
    let needle = needle.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("empty task id");
    }
    if let Ok(id) = needle.parse::<TaskId>() {
        return Ok(id);
    }

    let matches: Vec<TaskId> = tasks
        .iter()
        .map(|t| t.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no task matches id '{needle}'"),
        _ => bail!("id prefix '{needle}' is ambiguous ({} tasks)", matches.len()),
    }
}

/// `None` = flag absent, `Some(None)` = explicitly cleared.
fn parse_early(raw: Option<&str>) -> Result<Option<Option<EarlyReminder>>> {
    let Some(raw) = raw else { return Ok(None) };
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(Some(None));
    }
    let minutes: u32 = raw
        .parse()
        .with_context(|| format!("early reminder must be minutes or 'none', got '{raw}'"))?;
    let early = EarlyReminder::from_minutes(minutes)
        .with_context(|| format!("unsupported early reminder: {minutes} minutes"))?;
    Ok(Some(Some(early)))
}

fn parse_due(app: &App, fields: &TaskFields) -> Result<Option<DateTime<Utc>>> {
    let Some(local) = fields.due.as_deref() else {
        return Ok(None);
    };
    let tz = fields.tz.clone().unwrap_or_else(|| app.tz.name().to_string());
    Ok(Some(parse_local_due(local, &tz)?))
}

pub fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

pub fn render_row(t: &Task, tz: Tz) -> String {
    let check = if t.completed { "x" } else { " " };
    let flag = match t.priority {
        Priority::High => "!!",
        Priority::Medium => "! ",
        Priority::Low => "  ",
    };
    let due = t
        .due
        .map(|d| format!("  due {}", format_local(d, tz)))
        .unwrap_or_default();
    let id = t.id.to_string();
    format!("[{check}] {flag} {}{due}  ({})", t.title, &id[..8])
}
