//! Process-wide user settings and change notification.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::task::Priority;

/// Largest accepted default lead time (30 days).
pub const MAX_LEAD_MINUTES: u32 = 43_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    /// Priority descending, then due date ascending (no due date last).
    #[default]
    Priority,
    /// Due date ascending (no due date last), then priority descending.
    DueDate,
    /// Creation time ascending.
    Created,
}

impl std::str::FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "priority" => Ok(SortOption::Priority),
            "due_date" | "due" => Ok(SortOption::DueDate),
            "created" => Ok(SortOption::Created),
            other => Err(format!("unknown sort option: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_priority: Priority,
    pub notifications_enabled: bool,
    /// Lead time of the default reminder, in minutes before due. 0 = at due time.
    pub default_lead_minutes: u32,
    pub sort_option: SortOption,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_priority: Priority::Medium,
            notifications_enabled: true,
            default_lead_minutes: 60,
            sort_option: SortOption::Priority,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_lead_minutes > MAX_LEAD_MINUTES {
            return Err(format!(
                "default_lead_minutes must be <= {MAX_LEAD_MINUTES}, got {}",
                self.default_lead_minutes
            ));
        }
        Ok(())
    }

    /// Whether moving from `self` to `next` changes which reminders should exist.
    pub fn affects_reminders(&self, next: &Settings) -> bool {
        self.notifications_enabled != next.notifications_enabled
            || self.default_lead_minutes != next.default_lead_minutes
    }
}

/// Read-only settings access for the core.
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> Settings;

    /// Receiver that observes every published settings value.
    fn subscribe(&self) -> watch::Receiver<Settings>;
}

/// In-process settings cell backed by a `watch` channel.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<Settings>,
}

impl SettingsHandle {
    pub fn new(initial: Settings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Apply `f` to the current settings and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(f);
    }

    pub fn replace(&self, settings: Settings) {
        self.tx.send_replace(settings);
    }

    pub fn reset_to_defaults(&self) {
        self.replace(Settings::default());
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsProvider for SettingsHandle {
    fn snapshot(&self) -> Settings {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}
