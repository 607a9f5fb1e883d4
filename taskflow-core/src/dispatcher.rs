//! Reminder dispatcher contract (the device/OS side of notifications).
//!
//! Concrete adapters live outside the core. [`MemoryDispatcher`] is an
//! in-process implementation that records every call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::reminders::{PlannedReminder, ReminderKey};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    #[default]
    NotDetermined,
    Authorized,
    Denied,
}

#[async_trait]
pub trait ReminderDispatcher: Send + Sync {
    /// Ask the user for permission. Returns whether it was granted.
    async fn request_permission(&self) -> Result<bool, DispatchError>;

    async fn permission_status(&self) -> Result<PermissionStatus, DispatchError>;

    /// Schedule (or overwrite) the reminder addressed by `reminder.key`.
    async fn schedule(&self, reminder: &PlannedReminder) -> Result<(), DispatchError>;

    async fn cancel(&self, key: ReminderKey) -> Result<(), DispatchError>;

    async fn cancel_all(&self, task_id: TaskId) -> Result<(), DispatchError>;

    /// Pending trigger instant per offset for one task.
    async fn pending_triggers(&self, task_id: TaskId) -> Result<BTreeMap<u32, DateTime<Utc>>, DispatchError>;

    async fn pending_offsets(&self, task_id: TaskId) -> Result<BTreeSet<u32>, DispatchError> {
        Ok(self.pending_triggers(task_id).await?.into_keys().collect())
    }
}

/// One recorded dispatcher interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCall {
    RequestPermission,
    Schedule(ReminderKey),
    Cancel(ReminderKey),
    CancelAll(TaskId),
}

impl DispatchCall {
    /// Calls that change the pending set.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, DispatchCall::RequestPermission)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    permission: PermissionStatus,
    grant_on_request: bool,
    pending: BTreeMap<ReminderKey, PlannedReminder>,
    calls: Vec<DispatchCall>,
}

#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    state: Mutex<MemoryState>,
}

impl MemoryDispatcher {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                permission,
                grant_on_request: true,
                ..MemoryState::default()
            }),
        }
    }

    pub fn authorized() -> Self {
        Self::new(PermissionStatus::Authorized)
    }

    /// Answer used when permission is requested while undetermined.
    pub fn with_grant_on_request(self, grant: bool) -> Self {
        self.lock().grant_on_request = grant;
        self
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.lock().permission = permission;
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn pending(&self) -> Vec<PlannedReminder> {
        self.lock().pending.values().cloned().collect()
    }

    pub fn pending_for(&self, task_id: TaskId) -> Vec<PlannedReminder> {
        self.lock()
            .pending
            .values()
            .filter(|r| r.key.task_id == task_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReminderDispatcher for MemoryDispatcher {
    async fn request_permission(&self) -> Result<bool, DispatchError> {
        let mut st = self.lock();
        st.calls.push(DispatchCall::RequestPermission);
        if st.permission == PermissionStatus::NotDetermined {
            st.permission = if st.grant_on_request {
                PermissionStatus::Authorized
            } else {
                PermissionStatus::Denied
            };
        }
        Ok(st.permission == PermissionStatus::Authorized)
    }

    async fn permission_status(&self) -> Result<PermissionStatus, DispatchError> {
        Ok(self.lock().permission)
    }

    async fn schedule(&self, reminder: &PlannedReminder) -> Result<(), DispatchError> {
        let mut st = self.lock();
        st.calls.push(DispatchCall::Schedule(reminder.key));
        st.pending.insert(reminder.key, reminder.clone());
        Ok(())
    }

    async fn cancel(&self, key: ReminderKey) -> Result<(), DispatchError> {
        let mut st = self.lock();
        st.calls.push(DispatchCall::Cancel(key));
        st.pending.remove(&key);
        Ok(())
    }

    async fn cancel_all(&self, task_id: TaskId) -> Result<(), DispatchError> {
        let mut st = self.lock();
        st.calls.push(DispatchCall::CancelAll(task_id));
        st.pending.retain(|k, _| k.task_id != task_id);
        Ok(())
    }

    async fn pending_triggers(&self, task_id: TaskId) -> Result<BTreeMap<u32, DateTime<Utc>>, DispatchError> {
        Ok(self
            .lock()
            .pending
            .values()
            .filter(|r| r.key.task_id == task_id)
            .map(|r| (r.key.offset_minutes, r.trigger_at))
            .collect())
    }
}
