//! Reminder Scheduler: reconciles a task's desired reminder slots against
//! what the dispatcher currently has pending.
//!
//! Reconciliation is a diff keyed by offset, comparing trigger instants:
//! - pending but no longer desired -> cancel
//! - desired but not pending -> schedule (future triggers only, permission gated)
//! - pending at a different trigger (due date moved) -> reschedule, which
//!   overwrites the slot; cancel instead when the new trigger already passed
//! - pending at the planned trigger -> untouched

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dispatcher::{PermissionStatus, ReminderDispatcher};
use crate::error::DispatchError;
use crate::reminders::{ReminderKey, plan_reminders};
use crate::settings::Settings;
use crate::task::{Task, TaskId};

/// What a single reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub desired: BTreeSet<u32>,
    pub scheduled: Vec<u32>,
    pub cancelled: Vec<u32>,
    /// Desired offsets whose trigger was not in the future.
    pub skipped_past: Vec<u32>,
    /// Desired offsets withheld because notification permission is denied.
    pub suppressed: Vec<u32>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.scheduled.is_empty() && self.cancelled.is_empty()
    }
}

pub struct ReminderScheduler {
    dispatcher: Arc<dyn ReminderDispatcher>,
}

impl ReminderScheduler {
    pub fn new(dispatcher: Arc<dyn ReminderDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<dyn ReminderDispatcher> {
        &self.dispatcher
    }

    pub async fn reconcile(
        &self,
        task: &Task,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, DispatchError> {
        let plan = plan_reminders(task, settings);
        let desired: BTreeSet<u32> = plan.iter().map(|p| p.key.offset_minutes).collect();
        let current = self.dispatcher.pending_triggers(task.id).await?;

        let mut out = ReconcileOutcome {
            desired: desired.clone(),
            ..ReconcileOutcome::default()
        };

        let dropped: Vec<u32> = current.keys().copied().filter(|o| !desired.contains(o)).collect();
        for offset in dropped {
            self.cancel(task.id, offset, &mut out).await?;
        }

        let mut to_add = Vec::new();
        let mut stale = Vec::new();
        for planned in &plan {
            let offset = planned.key.offset_minutes;
            let pending_at = current.get(&offset);
            if pending_at == Some(&planned.trigger_at) {
                continue;
            }
            if pending_at.is_some() {
                stale.push(offset);
            }
            if planned.is_future(now) {
                to_add.push(planned);
            } else {
                out.skipped_past.push(offset);
            }
        }

        // A moved slot whose new trigger is in the past must not fire at the old time.
        let moved_past: Vec<u32> = stale.iter().copied().filter(|o| out.skipped_past.contains(o)).collect();
        for offset in moved_past {
            self.cancel(task.id, offset, &mut out).await?;
        }

        if !to_add.is_empty() {
            if self.may_schedule().await? {
                for planned in to_add {
                    self.dispatcher.schedule(planned).await?;
                    out.scheduled.push(planned.key.offset_minutes);
                }
            } else {
                out.suppressed = to_add.iter().map(|p| p.key.offset_minutes).collect();
                let withheld: Vec<u32> = stale.iter().copied().filter(|o| out.suppressed.contains(o)).collect();
                for offset in withheld {
                    self.cancel(task.id, offset, &mut out).await?;
                }
            }
        }

        debug!(
            task_id = %task.id,
            scheduled = ?out.scheduled,
            cancelled = ?out.cancelled,
            skipped_past = ?out.skipped_past,
            suppressed = ?out.suppressed,
            "reconciled reminders"
        );
        Ok(out)
    }

    async fn cancel(&self, task_id: TaskId, offset: u32, out: &mut ReconcileOutcome) -> Result<(), DispatchError> {
        self.dispatcher.cancel(ReminderKey::new(task_id, offset)).await?;
        out.cancelled.push(offset);
        Ok(())
    }

    pub async fn cancel_all(&self, task_id: TaskId) -> Result<(), DispatchError> {
        self.dispatcher.cancel_all(task_id).await?;
        debug!(%task_id, "cancelled all reminders");
        Ok(())
    }

    /// Permission gate. Undetermined permission is requested first; a denial
    /// is a terminal outcome, not an error.
    async fn may_schedule(&self) -> Result<bool, DispatchError> {
        match self.dispatcher.permission_status().await? {
            PermissionStatus::Authorized => Ok(true),
            PermissionStatus::Denied => Ok(false),
            PermissionStatus::NotDetermined => self.dispatcher.request_permission().await,
        }
    }
}
