//! Reminder policy: which reminder slots a task should have.
//!
//! Pure functions only. A reminder is addressed by `(task id, offset minutes)`;
//! offset 0 fires at the due instant. Triggers that already passed are still
//! part of the desired set; the scheduler decides not to dispatch them.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::task::{Priority, Task, TaskId};

/// Stable address of one reminder slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub task_id: TaskId,
    pub offset_minutes: u32,
}

impl ReminderKey {
    pub fn new(task_id: TaskId, offset_minutes: u32) -> Self {
        Self {
            task_id,
            offset_minutes,
        }
    }

    /// Dispatcher-side identifier. Scheduling the same key twice overwrites.
    pub fn identifier(&self) -> String {
        format!("task-{}-{}", self.task_id, self.offset_minutes)
    }
}

/// Text and metadata delivered with a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderContent {
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

impl ReminderContent {
    pub fn for_task(task: &Task, offset_minutes: u32) -> Self {
        let title = if offset_minutes == 0 {
            "Task due now"
        } else {
            "Task due soon"
        };
        let body = match task.description.as_deref() {
            Some(d) if !d.trim().is_empty() => format!("{}\n{}", task.title, d.trim()),
            _ => task.title.clone(),
        };
        Self {
            title: title.to_string(),
            body,
            priority: task.priority,
        }
    }
}

/// Minutes a postponed task's due date moves forward.
pub const POSTPONE_MINUTES: i64 = 60;

/// Actions offered alongside a delivered reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderAction {
    /// Mark the task completed.
    Complete,
    /// Push the due date back by [`POSTPONE_MINUTES`].
    Postpone,
}

impl ReminderAction {
    pub const ALL: [ReminderAction; 2] = [ReminderAction::Complete, ReminderAction::Postpone];

    /// Category identifier understood by notification front ends.
    pub fn identifier(self) -> &'static str {
        match self {
            ReminderAction::Complete => "COMPLETE_TASK",
            ReminderAction::Postpone => "POSTPONE_TASK",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReminderAction::Complete => "Mark as completed",
            ReminderAction::Postpone => "Postpone 1 hour",
        }
    }
}

/// A desired reminder with its absolute trigger instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReminder {
    pub key: ReminderKey,
    pub trigger_at: DateTime<Utc>,
    pub content: ReminderContent,
}

impl PlannedReminder {
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.trigger_at > now
    }
}

/// Offsets (minutes before due) that should have a reminder.
///
/// Empty when notifications are disabled, the task has no due date, or it is
/// completed. The default lead time and the early reminder collapse into one
/// slot when they are equal.
pub fn desired_reminders(task: &Task, settings: &Settings) -> BTreeSet<u32> {
    if !settings.notifications_enabled || task.due.is_none() || task.completed {
        return BTreeSet::new();
    }

    let mut offsets = BTreeSet::from([settings.default_lead_minutes]);
    if let Some(early) = task.early_reminder {
        offsets.insert(early.minutes());
    }
    offsets
}

pub fn trigger_instant(due: DateTime<Utc>, offset_minutes: u32) -> DateTime<Utc> {
    due - Duration::minutes(i64::from(offset_minutes))
}

/// Desired reminders with trigger instants, ordered by offset.
pub fn plan_reminders(task: &Task, settings: &Settings) -> Vec<PlannedReminder> {
    let Some(due) = task.due else {
        return vec![];
    };

    desired_reminders(task, settings)
        .into_iter()
        .map(|offset| PlannedReminder {
            key: ReminderKey::new(task.id, offset),
            trigger_at: trigger_instant(due, offset),
            content: ReminderContent::for_task(task, offset),
        })
        .collect()
}
