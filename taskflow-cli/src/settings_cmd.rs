use anyhow::{Result, anyhow, bail};
use chrono_tz::Tz;
use clap::Subcommand;
use taskflow_core::{Priority, Settings, SettingsProvider, SortOption};

use crate::App;
use crate::config::save_config;

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Change one or more settings
    Set {
        /// Default reminder lead time in minutes (0 = at due time)
        #[arg(long)]
        lead: Option<u32>,

        /// Turn reminders on or off (true/false)
        #[arg(long)]
        notifications: Option<bool>,

        /// Priority given to new tasks
        #[arg(long)]
        priority: Option<Priority>,

        /// priority | due_date | created
        #[arg(long)]
        sort: Option<SortOption>,

        /// IANA timezone for reading and printing due dates
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Restore defaults (timezone is kept)
    Reset,
}

pub async fn run(app: &App, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => {
            print_settings(&app.settings.snapshot(), &app.config.display.timezone);
            Ok(())
        }
        SettingsCommand::Set {
            lead,
            notifications,
            priority,
            sort,
            timezone,
        } => {
            let mut next = app.settings.snapshot();
            if let Some(v) = lead {
                next.default_lead_minutes = v;
            }
            if let Some(v) = notifications {
                next.notifications_enabled = v;
            }
            if let Some(v) = priority {
                next.default_priority = v;
            }
            if let Some(v) = sort {
                next.sort_option = v;
            }
            next.validate().map_err(|e| anyhow!(e))?;

            let mut config = app.config.clone();
            if let Some(tz) = timezone {
                if tz.parse::<Tz>().is_err() {
                    bail!("invalid timezone: {tz}");
                }
                config.display.timezone = tz;
            }
            apply(app, config, next).await
        }
        SettingsCommand::Reset => apply(app, app.config.clone(), Settings::default()).await,
    }
}

async fn apply(app: &App, mut config: crate::config::Config, next: Settings) -> Result<()> {
    config.apply_settings(&next);
    save_config(&config)?;

    // Reminder-affecting changes are swept by the controller before `finish` returns.
    app.settings.replace(next);
    app.finish().await;

    print_settings(&next, &config.display.timezone);
    Ok(())
}

fn print_settings(s: &Settings, timezone: &str) {
    println!("notifications:    {}", if s.notifications_enabled { "on" } else { "off" });
    println!("lead minutes:     {}", s.default_lead_minutes);
    println!("default priority: {}", s.default_priority.title());
    println!(
        "sort:             {}",
        match s.sort_option {
            SortOption::Priority => "priority",
            SortOption::DueDate => "due_date",
            SortOption::Created => "created",
        }
    );
    println!("timezone:         {timezone}");
}
