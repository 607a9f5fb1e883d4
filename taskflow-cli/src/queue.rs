//! File-backed reminder dispatcher.
//!
//! Pending reminders are kept in `reminders/pending.json`, keyed by the stable
//! reminder identifier so rescheduling overwrites. Delivered identifiers are
//! appended to `reminders/delivered.log`. Permission lives in
//! `reminders/permission.json`, and the settings the queue was last swept
//! against in `reminders/applied.json`.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskflow_core::{
    DispatchError, PermissionStatus, PlannedReminder, ReminderDispatcher, ReminderKey, Settings, TaskId,
};

use crate::state::write_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PermissionFile {
    status: PermissionStatus,
}

#[derive(Debug)]
pub struct QueueDispatcher {
    dir: PathBuf,
    interactive: bool,
    lock: Mutex<()>,
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> DispatchError {
    DispatchError(format!("{}: {e}", path.display()))
}

impl QueueDispatcher {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interactive: false,
            lock: Mutex::new(()),
        }
    }

    /// Prompt on the terminal when permission is requested.
    pub fn interactive(mut self, yes: bool) -> Self {
        self.interactive = yes;
        self
    }

    fn pending_path(&self) -> PathBuf {
        self.dir.join("pending.json")
    }

    fn permission_path(&self) -> PathBuf {
        self.dir.join("permission.json")
    }

    fn applied_path(&self) -> PathBuf {
        self.dir.join("applied.json")
    }

    pub fn delivered_path(&self) -> PathBuf {
        self.dir.join("delivered.log")
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_pending(&self) -> Result<BTreeMap<String, PlannedReminder>, DispatchError> {
        let p = self.pending_path();
        if !p.exists() {
            return Ok(BTreeMap::new());
        }
        let s = fs::read_to_string(&p).map_err(|e| io_err(&p, e))?;
        if s.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&s).map_err(|e| io_err(&p, e))
    }

    fn write_pending(&self, pending: &BTreeMap<String, PlannedReminder>) -> Result<(), DispatchError> {
        let p = self.pending_path();
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let json = serde_json::to_string_pretty(pending).map_err(|e| io_err(&p, e))?;
        write_atomic(&p, &json).map_err(|e| io_err(&p, e))
    }

    pub fn permission(&self) -> Result<PermissionStatus, DispatchError> {
        let p = self.permission_path();
        if !p.exists() {
            return Ok(PermissionStatus::NotDetermined);
        }
        let s = fs::read_to_string(&p).map_err(|e| io_err(&p, e))?;
        let file: PermissionFile = serde_json::from_str(&s).map_err(|e| io_err(&p, e))?;
        Ok(file.status)
    }

    pub fn set_permission(&self, status: PermissionStatus) -> Result<(), DispatchError> {
        let p = self.permission_path();
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let json = serde_json::to_string_pretty(&PermissionFile { status }).map_err(|e| io_err(&p, e))?;
        write_atomic(&p, &json).map_err(|e| io_err(&p, e))
    }

    /// Settings the queued reminders were last reconciled with, if recorded.
    pub fn applied_settings(&self) -> Result<Option<Settings>, DispatchError> {
        let p = self.applied_path();
        if !p.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&p).map_err(|e| io_err(&p, e))?;
        serde_json::from_str(&s).map(Some).map_err(|e| io_err(&p, e))
    }

    pub fn record_applied(&self, settings: &Settings) -> Result<(), DispatchError> {
        let p = self.applied_path();
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let json = serde_json::to_string_pretty(settings).map_err(|e| io_err(&p, e))?;
        write_atomic(&p, &json).map_err(|e| io_err(&p, e))
    }

    /// Drop every queued reminder. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, DispatchError> {
        let _g = self.guard();
        let pending = self.read_pending()?;
        if !pending.is_empty() {
            self.write_pending(&BTreeMap::new())?;
        }
        Ok(pending.len())
    }

    /// All pending reminders ordered by trigger time.
    pub fn pending(&self) -> Result<Vec<PlannedReminder>, DispatchError> {
        let _g = self.guard();
        let mut out: Vec<PlannedReminder> = self.read_pending()?.into_values().collect();
        out.sort_by_key(|r| (r.trigger_at, r.key));
        Ok(out)
    }

    /// Remove and return reminders whose trigger is at or before `now`,
    /// appending their identifiers to the delivered log. Nothing is delivered
    /// while permission is denied; the entries stay queued.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<PlannedReminder>, DispatchError> {
        if self.permission()? == PermissionStatus::Denied {
            return Ok(vec![]);
        }
        let _g = self.guard();
        let mut pending = self.read_pending()?;
        let due_ids: Vec<String> = pending
            .iter()
            .filter(|(_, r)| r.trigger_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if due_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut due: Vec<PlannedReminder> = due_ids.iter().filter_map(|id| pending.remove(id)).collect();
        due.sort_by_key(|r| r.trigger_at);
        self.write_pending(&pending)?;

        let log = self.delivered_path();
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| io_err(&log, e))?;
        for r in &due {
            writeln!(f, "{}\t{}", r.key.identifier(), now.to_rfc3339()).map_err(|e| io_err(&log, e))?;
        }
        Ok(due)
    }

    fn prompt_for_permission(&self) -> Result<bool, DispatchError> {
        print!("Allow TaskFlow to schedule reminders? [y/N]: ");
        io::stdout().flush().ok();
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| DispatchError(format!("read answer: {e}")))?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

#[async_trait]
impl ReminderDispatcher for QueueDispatcher {
    async fn request_permission(&self) -> Result<bool, DispatchError> {
        match self.permission()? {
            PermissionStatus::Authorized => return Ok(true),
            PermissionStatus::Denied => return Ok(false),
            PermissionStatus::NotDetermined => {}
        }
        // Without a terminal the question stays open for the next run.
        if !self.interactive || !io::stdin().is_terminal() {
            return Ok(false);
        }
        let granted = self.prompt_for_permission()?;
        self.set_permission(if granted {
            PermissionStatus::Authorized
        } else {
            PermissionStatus::Denied
        })?;
        Ok(granted)
    }

    async fn permission_status(&self) -> Result<PermissionStatus, DispatchError> {
        self.permission()
    }

    async fn schedule(&self, reminder: &PlannedReminder) -> Result<(), DispatchError> {
        let _g = self.guard();
        let mut pending = self.read_pending()?;
        pending.insert(reminder.key.identifier(), reminder.clone());
        self.write_pending(&pending)
    }

    async fn cancel(&self, key: ReminderKey) -> Result<(), DispatchError> {
        let _g = self.guard();
        let mut pending = self.read_pending()?;
        if pending.remove(&key.identifier()).is_some() {
            self.write_pending(&pending)?;
        }
        Ok(())
    }

    async fn cancel_all(&self, task_id: TaskId) -> Result<(), DispatchError> {
        let _g = self.guard();
        let mut pending = self.read_pending()?;
        let before = pending.len();
        pending.retain(|_, r| r.key.task_id != task_id);
        if pending.len() != before {
            self.write_pending(&pending)?;
        }
        Ok(())
    }

    async fn pending_triggers(&self, task_id: TaskId) -> Result<BTreeMap<u32, DateTime<Utc>>, DispatchError> {
        let _g = self.guard();
        Ok(self
            .read_pending()?
            .values()
            .filter(|r| r.key.task_id == task_id)
            .map(|r| (r.key.offset_minutes, r.trigger_at))
            .collect())
    }
}
