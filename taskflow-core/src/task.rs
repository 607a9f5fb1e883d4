//! Task model shared by the store, reminder policy and lifecycle controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repeat::RepeatRule;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn title(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Selectable lead times for an explicit early reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum EarlyReminder {
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    OneDay,
    TwoDays,
    OneWeek,
    OneMonth,
}

impl EarlyReminder {
    pub const ALL: [EarlyReminder; 9] = [
        EarlyReminder::FiveMinutes,
        EarlyReminder::FifteenMinutes,
        EarlyReminder::ThirtyMinutes,
        EarlyReminder::OneHour,
        EarlyReminder::TwoHours,
        EarlyReminder::OneDay,
        EarlyReminder::TwoDays,
        EarlyReminder::OneWeek,
        EarlyReminder::OneMonth,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            EarlyReminder::FiveMinutes => 5,
            EarlyReminder::FifteenMinutes => 15,
            EarlyReminder::ThirtyMinutes => 30,
            EarlyReminder::OneHour => 60,
            EarlyReminder::TwoHours => 120,
            EarlyReminder::OneDay => 1440,
            EarlyReminder::TwoDays => 2880,
            EarlyReminder::OneWeek => 10080,
            EarlyReminder::OneMonth => 43200,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.minutes() == minutes)
    }

    pub fn title(self) -> &'static str {
        match self {
            EarlyReminder::FiveMinutes => "5 minutes",
            EarlyReminder::FifteenMinutes => "15 minutes",
            EarlyReminder::ThirtyMinutes => "30 minutes",
            EarlyReminder::OneHour => "1 hour",
            EarlyReminder::TwoHours => "2 hours",
            EarlyReminder::OneDay => "1 day",
            EarlyReminder::TwoDays => "2 days",
            EarlyReminder::OneWeek => "1 week",
            EarlyReminder::OneMonth => "1 month",
        }
    }
}

impl TryFrom<u32> for EarlyReminder {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes).ok_or_else(|| format!("unsupported early reminder: {minutes} minutes"))
    }
}

impl From<EarlyReminder> for u32 {
    fn from(r: EarlyReminder) -> u32 {
        r.minutes()
    }
}

/// A persisted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,

    /// Optional due instant (UTC). No due date means no reminders.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub repeat: RepeatRule,

    /// Explicit early reminder, in addition to the settings lead time.
    #[serde(default)]
    pub early_reminder: Option<EarlyReminder>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            due: None,
            completed: false,
            priority: Priority::Medium,
            url: None,
            repeat: RepeatRule::Never,
            early_reminder: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_early_reminder(mut self, early: EarlyReminder) -> Self {
        self.early_reminder = Some(early);
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatRule) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.completed
    }
}

/// User input for a new task, before an identifier is assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub completed: bool,
    /// `None` falls back to the settings default priority.
    pub priority: Option<Priority>,
    pub url: Option<String>,
    pub repeat: RepeatRule,
    pub early_reminder: Option<EarlyReminder>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Build the task snapshot. Blank description/url collapse to `None`.
    pub fn into_task(self, default_priority: Priority, now: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: non_blank(self.description),
            due: self.due,
            completed: self.completed,
            priority: self.priority.unwrap_or(default_priority),
            url: non_blank(self.url),
            repeat: self.repeat,
            early_reminder: self.early_reminder,
            created_at: now,
        }
    }
}

pub(crate) fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
