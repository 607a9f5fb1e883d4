//! Summary statistics over a task list.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::{Priority, Task};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    /// completed / total, 0 when there are no tasks.
    pub completion_rate: f64,
    /// Completed tasks per day since the earliest completed due date (min 1 day).
    pub daily_productivity: f64,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let total = tasks.len();
        let completed: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
        let count = |p: Priority| tasks.iter().filter(|t| t.priority == p).count();

        let completion_rate = if total == 0 {
            0.0
        } else {
            completed.len() as f64 / total as f64
        };

        let daily_productivity = if completed.is_empty() {
            0.0
        } else {
            let first = completed.iter().filter_map(|t| t.due).min().unwrap_or(now);
            let days = (now - first).num_days().max(1);
            completed.len() as f64 / days as f64
        };

        Self {
            total,
            completed: completed.len(),
            pending: total - completed.len(),
            low: count(Priority::Low),
            medium: count(Priority::Medium),
            high: count(Priority::High),
            completion_rate,
            daily_productivity,
        }
    }
}
