//! taskflow-core: task lifecycle and reminder scheduling for TaskFlow

pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod reminders;
pub mod repeat;
pub mod scheduler;
pub mod settings;
pub mod stats;
pub mod store;
pub mod task;
pub mod time;

pub use dispatcher::{DispatchCall, MemoryDispatcher, PermissionStatus, ReminderDispatcher};
pub use error::{DispatchError, LifecycleError, StoreError};
pub use lifecycle::{LifecycleFailure, Operation, TaskLifecycleController};
pub use reminders::{
    POSTPONE_MINUTES, PlannedReminder, ReminderAction, ReminderContent, ReminderKey, desired_reminders,
    plan_reminders, trigger_instant,
};
pub use repeat::RepeatRule;
pub use scheduler::{ReconcileOutcome, ReminderScheduler};
pub use settings::{Settings, SettingsHandle, SettingsProvider, SortOption};
pub use stats::TaskStats;
pub use store::{MemoryTaskStore, TaskStore, sort_tasks};
pub use task::{EarlyReminder, Priority, Task, TaskDraft, TaskId};
pub use time::{Clock, FixedClock, SystemClock, parse_local_due};
