use anyhow::Result;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use taskflow_core::{SettingsHandle, SettingsProvider, SystemClock, TaskLifecycleController};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod json_store;
mod queue;
mod reminders_cmd;
mod settings_cmd;
mod state;
mod tasks_cmd;

use config::{Config, load_config};
use json_store::JsonTaskStore;
use queue::QueueDispatcher;
use reminders_cmd::RemindersCommand;
use settings_cmd::SettingsCommand;
use tasks_cmd::{ListFilter, TaskFields};

#[derive(Parser, Debug)]
#[command(
    name = "taskflow",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TASKFLOW_BUILD_SHA"), ")"),
    about = "Tasks with due dates, priorities and reminders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// Edit a task (id or unique id prefix)
    Edit {
        id: String,
        #[arg(long, short = 't')]
        title: Option<String>,
        /// Remove the due date
        #[arg(long, default_value_t = false, conflicts_with = "due")]
        clear_due: bool,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// Mark a task completed, or reopen it
    Toggle { id: String },

    /// Delete a task and its reminders
    Delete { id: String },

    /// List tasks in the configured sort order
    List {
        #[arg(long, conflicts_with_all = ["completed", "today"])]
        pending: bool,
        #[arg(long, conflicts_with = "today")]
        completed: bool,
        /// Tasks due today in the configured timezone
        #[arg(long)]
        today: bool,
    },

    /// Show one task with its planned reminders
    Show { id: String },

    /// Completion and priority statistics
    Stats,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Inspect and deliver scheduled reminders
    Reminders {
        #[command(subcommand)]
        command: RemindersCommand,
    },
}

/// Everything a command needs: the controller and the stores it was built on.
pub struct App {
    pub controller: TaskLifecycleController,
    pub settings: Arc<SettingsHandle>,
    pub queue: Arc<QueueDispatcher>,
    pub config: Config,
    pub tz: Tz,
}

impl App {
    async fn open() -> Result<Self> {
        let config = load_config()?;
        let tz = config.timezone()?;
        let settings = Arc::new(SettingsHandle::new(config.settings()));
        let queue = Arc::new(QueueDispatcher::open(state::reminders_dir()?).interactive(true));
        let store = Arc::new(JsonTaskStore::open(state::tasks_path()?));

        let controller = TaskLifecycleController::new(
            store,
            queue.clone(),
            settings.clone(),
            Arc::new(SystemClock),
        );

        // config.toml may have been edited since reminders were last planned.
        if let Some(previous) = queue.applied_settings()? {
            if controller.sweep_if_stale(previous).await {
                controller.settled().await;
            }
        }
        queue.record_applied(&settings.snapshot())?;

        Ok(Self {
            controller,
            settings,
            queue,
            config,
            tz,
        })
    }

    /// Drain reminder work and surface any recorded failure.
    pub async fn finish(&self) {
        self.controller.settled().await;
        if let Err(e) = self.queue.record_applied(&self.settings.snapshot()) {
            tracing::warn!(error = %e, "could not record applied settings");
        }
        if let Some(failure) = self.controller.last_error() {
            eprintln!("warning: {failure}");
            self.controller.clear_error();
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let app = App::open().await?;
    if let Some(failure) = app.controller.last_error() {
        eprintln!("warning: {failure}");
        app.controller.clear_error();
    }

    match cli.command {
        Command::Add { title, fields } => tasks_cmd::add(&app, title, fields).await?,
        Command::Edit {
            id,
            title,
            clear_due,
            fields,
        } => tasks_cmd::edit(&app, &id, title, clear_due, fields).await?,
        Command::Toggle { id } => tasks_cmd::toggle(&app, &id).await?,
        Command::Delete { id } => tasks_cmd::delete(&app, &id).await?,
        Command::List {
            pending,
            completed,
            today,
        } => tasks_cmd::list(
            &app,
            ListFilter {
                pending,
                completed,
                today,
            },
        )?,
        Command::Show { id } => tasks_cmd::show(&app, &id)?,
        Command::Stats => tasks_cmd::stats(&app)?,
        Command::Settings { command } => settings_cmd::run(&app, command).await?,
        Command::Reminders { command } => reminders_cmd::run(&app, command).await?,
    }

    Ok(())
}
