//! Task lifecycle controller: the only mutation gateway for tasks.
//!
//! Every mutation runs under one async gate: write the store, refresh the
//! cached list, then enqueue reminder work. Reminder work is drained by a
//! single worker task in FIFO order, so for any task the last enqueued
//! reconcile is the one whose effect remains once the queue settles.
//!
//! Store failures never cross this boundary. They land in the `last_error`
//! slot and the cached list keeps its last known durable state.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::Duration;
use chrono_tz::Tz;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::dispatcher::ReminderDispatcher;
use crate::error::{LifecycleError, StoreError};
use crate::reminders::{POSTPONE_MINUTES, ReminderAction};
use crate::scheduler::ReminderScheduler;
use crate::settings::{Settings, SettingsProvider};
use crate::stats::TaskStats;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft, TaskId, non_blank};
use crate::time::{Clock, local_day};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Add,
    Update,
    Toggle,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Load => "load",
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Toggle => "toggle",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A recorded store failure, for display by presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleFailure {
    pub operation: Operation,
    pub message: String,
}

impl std::fmt::Display for LifecycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

#[derive(Debug)]
enum Job {
    Reconcile { task: Box<Task>, settings: Settings },
    CancelAll { task_id: TaskId },
    Flush(oneshot::Sender<()>),
}

/// State owned by the mutation gate.
struct Gate {
    /// Settings the outstanding reminders were last swept against.
    applied: Settings,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    tasks: RwLock<Vec<Task>>,
    last_error: Mutex<Option<LifecycleFailure>>,
    gate: tokio::sync::Mutex<Gate>,
    jobs: mpsc::UnboundedSender<Job>,
}

#[derive(Clone)]
pub struct TaskLifecycleController {
    inner: Arc<Inner>,
}

impl TaskLifecycleController {
    /// Build the controller, load the task list and start the reminder worker
    /// and settings subscription. Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<dyn ReminderDispatcher>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(ReminderScheduler::new(dispatcher), clock.clone(), rx));

        let settings_rx = settings.subscribe();
        let applied = settings.snapshot();
        let controller = Self {
            inner: Arc::new(Inner {
                store,
                settings,
                clock,
                tasks: RwLock::new(Vec::new()),
                last_error: Mutex::new(None),
                gate: tokio::sync::Mutex::new(Gate { applied }),
                jobs: tx,
            }),
        };

        controller.load_tasks();
        spawn_settings_watcher(Arc::downgrade(&controller.inner), settings_rx);
        controller
    }

    // ---- reads -------------------------------------------------------------

    /// Refresh the cached list from the store. On failure the previous list
    /// is kept and the error recorded.
    pub fn load_tasks(&self) {
        let sort = self.inner.settings.snapshot().sort_option;
        match self.inner.store.fetch_all(sort) {
            Ok(tasks) => *self.write_cache() = tasks,
            Err(e) => self.record(Operation::Load, &e),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read_cache().clone()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.read_cache().iter().find(|t| t.id == id).cloned()
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.read_cache().iter().filter(|t| !t.completed).cloned().collect()
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        self.read_cache().iter().filter(|t| t.completed).cloned().collect()
    }

    /// Tasks whose due date falls on today's calendar day in `tz`.
    pub fn tasks_due_today(&self, tz: Tz) -> Vec<Task> {
        let today = local_day(self.inner.clock.now(), tz);
        self.read_cache()
            .iter()
            .filter(|t| t.due.is_some_and(|d| local_day(d, tz) == today))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.read_cache(), self.inner.clock.now())
    }

    pub fn last_error(&self) -> Option<LifecycleFailure> {
        self.error_slot().clone()
    }

    pub fn clear_error(&self) {
        *self.error_slot() = None;
    }

    // ---- mutations ---------------------------------------------------------

    /// Validate, persist and schedule a new task.
    ///
    /// If the store write fails the returned task was not persisted; the
    /// failure is available from [`Self::last_error`].
    pub async fn add(&self, draft: TaskDraft) -> Result<Task, LifecycleError> {
        validate_title(&draft.title)?;

        let _gate = self.inner.gate.lock().await;
        let settings = self.inner.settings.snapshot();
        let task = draft.into_task(settings.default_priority, self.inner.clock.now());

        if let Err(e) = self.inner.store.create(&task) {
            self.record(Operation::Add, &e);
            return Ok(task);
        }

        info!(task_id = %task.id, "task added");
        self.load_tasks();
        self.enqueue_reconcile(task.clone(), settings);
        Ok(task)
    }

    /// Persist a new snapshot of an existing task and reconcile its reminders.
    pub async fn update(&self, task: Task) -> Result<(), LifecycleError> {
        validate_title(&task.title)?;
        let task = normalize(task);

        let _gate = self.inner.gate.lock().await;
        match self.inner.store.fetch_by_id(task.id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(LifecycleError::NotFound(task.id)),
            Err(e) => {
                self.record(Operation::Update, &e);
                return Ok(());
            }
        }

        match self.inner.store.update(&task) {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => return Err(LifecycleError::NotFound(id)),
            Err(e) => {
                self.record(Operation::Update, &e);
                self.load_tasks();
                return Ok(());
            }
        }

        debug!(task_id = %task.id, "task updated");
        self.load_tasks();
        let settings = self.inner.settings.snapshot();
        self.enqueue_reconcile(task, settings);
        Ok(())
    }

    /// Flip the completion flag.
    ///
    /// The cached list changes before the store write; afterwards the cache
    /// and reminders are reconciled against what the store actually holds.
    /// Returns the snapshot the cache shows once the write settled.
    pub async fn toggle_completion(&self, id: TaskId) -> Result<Task, LifecycleError> {
        let _gate = self.inner.gate.lock().await;

        let current = match self.task(id) {
            Some(t) => t,
            None => match self.inner.store.fetch_by_id(id) {
                Ok(Some(t)) => t,
                Ok(None) => return Err(LifecycleError::NotFound(id)),
                Err(e) => {
                    self.record(Operation::Toggle, &e);
                    return Err(LifecycleError::NotFound(id));
                }
            },
        };

        let mut flipped = current;
        flipped.completed = !flipped.completed;
        self.replace_cached(&flipped);

        match self.inner.store.update(&flipped) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                self.load_tasks();
                return Err(LifecycleError::NotFound(id));
            }
            Err(e) => self.record(Operation::Toggle, &e),
        }

        self.load_tasks();
        let settings = self.inner.settings.snapshot();
        match self.inner.store.fetch_by_id(id) {
            Ok(Some(durable)) => {
                debug!(task_id = %id, completed = durable.completed, "completion toggled");
                self.enqueue_reconcile(durable.clone(), settings);
                Ok(durable)
            }
            Ok(None) => Err(LifecycleError::NotFound(id)),
            Err(e) => {
                self.record(Operation::Toggle, &e);
                Ok(self.task(id).unwrap_or(flipped))
            }
        }
    }

    /// Remove a task and cancel all of its reminders. A task that is already
    /// gone counts as deleted.
    pub async fn delete(&self, id: TaskId) {
        let _gate = self.inner.gate.lock().await;

        match self.inner.store.delete(id) {
            Ok(()) => info!(task_id = %id, "task deleted"),
            Err(StoreError::NotFound(_)) => debug!(task_id = %id, "delete: task already absent"),
            Err(e) => {
                // Still durable; its reminders stay consistent with the record.
                self.record(Operation::Delete, &e);
                return;
            }
        }

        self.send(Job::CancelAll { task_id: id });
        self.load_tasks();
    }

    /// Apply an action picked on a delivered reminder.
    ///
    /// `Complete` leaves an already completed task untouched. `Postpone`
    /// moves the due date forward; a task without one becomes due
    /// [`POSTPONE_MINUTES`] from now.
    pub async fn apply_reminder_action(&self, id: TaskId, action: ReminderAction) -> Result<Task, LifecycleError> {
        let current = match self.inner.store.fetch_by_id(id) {
            Ok(Some(t)) => t,
            Ok(None) => return Err(LifecycleError::NotFound(id)),
            Err(e) => {
                self.record(Operation::Load, &e);
                self.task(id).ok_or(LifecycleError::NotFound(id))?
            }
        };

        match action {
            ReminderAction::Complete if current.completed => Ok(current),
            ReminderAction::Complete => self.toggle_completion(id).await,
            ReminderAction::Postpone => {
                let base = current.due.unwrap_or_else(|| self.inner.clock.now());
                let due = base + Duration::minutes(POSTPONE_MINUTES);
                info!(task_id = %id, %due, "postponing task");
                let mut moved = current;
                moved.due = Some(due);
                self.update(moved.clone()).await?;
                Ok(self.task(id).unwrap_or(moved))
            }
        }
    }

    /// Sweep every pending task when reminders were last reconciled under
    /// settings whose lead time or enablement differ from the current ones.
    /// Returns whether a sweep was queued.
    pub async fn sweep_if_stale(&self, last_applied: Settings) -> bool {
        let current = self.inner.settings.snapshot();
        if !last_applied.affects_reminders(&current) {
            return false;
        }
        debug!(
            from = last_applied.default_lead_minutes,
            to = current.default_lead_minutes,
            "reminders were reconciled under other settings"
        );
        self.reconcile_all().await;
        true
    }

    /// Reconcile every pending task against the current settings.
    pub async fn reconcile_all(&self) {
        let mut gate = self.inner.gate.lock().await;
        let settings = self.inner.settings.snapshot();
        gate.applied = settings;
        self.enqueue_pending(settings);
    }

    /// Wait until every reminder job issued so far, including a sweep owed to
    /// a settings change, has been applied to the dispatcher.
    pub async fn settled(&self) {
        sweep_if_changed(&self.inner).await;

        let (tx, rx) = oneshot::channel();
        self.send(Job::Flush(tx));
        let _ = rx.await;
    }

    // ---- internals ---------------------------------------------------------

    fn enqueue_reconcile(&self, task: Task, settings: Settings) {
        self.send(Job::Reconcile {
            task: Box::new(task),
            settings,
        });
    }

    fn enqueue_pending(&self, settings: Settings) {
        enqueue_pending(&self.inner, settings);
    }

    fn send(&self, job: Job) {
        if self.inner.jobs.send(job).is_err() {
            warn!("reminder worker stopped; dropping job");
        }
    }

    fn replace_cached(&self, task: &Task) {
        if let Some(slot) = self.write_cache().iter_mut().find(|t| t.id == task.id) {
            *slot = task.clone();
        }
    }

    fn record(&self, operation: Operation, err: &StoreError) {
        record(&self.inner, operation, err);
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Vec<Task>> {
        self.inner.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Vec<Task>> {
        self.inner.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn error_slot(&self) -> MutexGuard<'_, Option<LifecycleFailure>> {
        self.inner.last_error.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_title(title: &str) -> Result<(), LifecycleError> {
    if title.trim().is_empty() {
        return Err(LifecycleError::Validation("empty title".to_string()));
    }
    Ok(())
}

fn normalize(mut task: Task) -> Task {
    task.title = task.title.trim().to_string();
    task.description = non_blank(task.description);
    task.url = non_blank(task.url);
    task
}

fn record(inner: &Inner, operation: Operation, err: &StoreError) {
    warn!(%operation, error = %err, "task store failure");
    *inner.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(LifecycleFailure {
        operation,
        message: err.to_string(),
    });
}

/// Enqueue a reconcile for every pending task, reading the durable list.
fn enqueue_pending(inner: &Inner, settings: Settings) {
    let tasks = match inner.store.fetch_all(settings.sort_option) {
        Ok(tasks) => {
            *inner.tasks.write().unwrap_or_else(|e| e.into_inner()) = tasks.clone();
            tasks
        }
        Err(e) => {
            record(inner, Operation::Load, &e);
            inner.tasks.read().unwrap_or_else(|e| e.into_inner()).clone()
        }
    };

    let mut count = 0usize;
    for task in tasks.into_iter().filter(Task::is_pending) {
        count += 1;
        let job = Job::Reconcile {
            task: Box::new(task),
            settings,
        };
        if inner.jobs.send(job).is_err() {
            warn!("reminder worker stopped; dropping job");
            return;
        }
    }
    info!(count, "queued reminder sweep for pending tasks");
}

/// Run a sweep if the provider's settings changed reminder-relevant fields
/// since the last one.
async fn sweep_if_changed(inner: &Inner) {
    let mut gate = inner.gate.lock().await;
    let next = inner.settings.snapshot();
    let affects = gate.applied.affects_reminders(&next);
    gate.applied = next;
    if affects {
        debug!(
            notifications_enabled = next.notifications_enabled,
            lead_minutes = next.default_lead_minutes,
            "settings changed; sweeping reminders"
        );
        enqueue_pending(inner, next);
    }
}

fn spawn_settings_watcher(inner: Weak<Inner>, mut rx: watch::Receiver<Settings>) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let Some(inner) = inner.upgrade() else { break };
            sweep_if_changed(&inner).await;
        }
    });
}

async fn run_worker(
    scheduler: ReminderScheduler,
    clock: Arc<dyn Clock>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Reconcile { task, settings } => {
                if let Err(e) = scheduler.reconcile(&task, &settings, clock.now()).await {
                    warn!(task_id = %task.id, error = %e, "reminder reconcile failed");
                }
            }
            Job::CancelAll { task_id } => {
                if let Err(e) = scheduler.cancel_all(task_id).await {
                    warn!(%task_id, error = %e, "reminder cancel failed");
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{MemoryDispatcher, PermissionStatus};
    use crate::settings::SettingsHandle;
    use crate::store::MemoryTaskStore;
    use crate::task::EarlyReminder;
    use crate::time::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    struct Harness {
        controller: TaskLifecycleController,
        store: Arc<MemoryTaskStore>,
        dispatcher: Arc<MemoryDispatcher>,
        settings: SettingsHandle,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTaskStore::new());
        let dispatcher = Arc::new(MemoryDispatcher::authorized());
        let settings = SettingsHandle::default();
        let controller = TaskLifecycleController::new(
            store.clone(),
            dispatcher.clone(),
            Arc::new(settings.clone()),
            Arc::new(FixedClock::new(now())),
        );
        Harness {
            controller,
            store,
            dispatcher,
            settings,
        }
    }

    fn due_in(minutes: i64) -> TaskDraft {
        TaskDraft {
            due: Some(now() + Duration::minutes(minutes)),
            ..TaskDraft::new("call the bank")
        }
    }

    async fn offsets(h: &Harness, id: TaskId) -> BTreeSet<u32> {
        h.controller.settled().await;
        h.dispatcher.pending_for(id).iter().map(|r| r.key.offset_minutes).collect()
    }

    #[tokio::test]
    async fn add_rejects_blank_title() {
        let h = harness();
        let err = h.controller.add(TaskDraft::new("   ")).await.unwrap_err();
        assert_eq!(err, LifecycleError::Validation("empty title".to_string()));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn add_persists_and_schedules() {
        let h = harness();
        let task = h.controller.add(due_in(120)).await.unwrap();

        assert_eq!(h.controller.tasks().len(), 1);
        assert_eq!(task.priority, h.settings.snapshot().default_priority);
        assert_eq!(offsets(&h, task.id).await, BTreeSet::from([60]));
    }

    #[tokio::test]
    async fn update_missing_task_is_not_found() {
        let h = harness();
        let ghost = Task::new("ghost");
        let err = h.controller.update(ghost.clone()).await.unwrap_err();
        assert_eq!(err, LifecycleError::NotFound(ghost.id));
    }

    #[tokio::test]
    async fn toggle_cancels_then_restores() {
        let h = harness();
        let mut draft = due_in(3 * 24 * 60);
        draft.early_reminder = Some(EarlyReminder::OneDay);
        let task = h.controller.add(draft).await.unwrap();
        let before = offsets(&h, task.id).await;
        assert_eq!(before, BTreeSet::from([60, 1440]));

        let done = h.controller.toggle_completion(task.id).await.unwrap();
        assert!(done.completed);
        assert!(offsets(&h, task.id).await.is_empty());

        let again = h.controller.toggle_completion(task.id).await.unwrap();
        assert!(!again.completed);
        assert_eq!(offsets(&h, task.id).await, before);
    }

    #[tokio::test]
    async fn toggle_write_failure_reverts_to_durable_state() {
        let h = harness();
        let task = h.controller.add(due_in(600)).await.unwrap();
        h.store.fail_writes(Some("disk full"));

        let shown = h.controller.toggle_completion(task.id).await.unwrap();
        assert!(!shown.completed);
        assert!(!h.controller.task(task.id).unwrap().completed);

        let failure = h.controller.last_error().unwrap();
        assert_eq!(failure.operation, Operation::Toggle);
        assert!(failure.message.contains("disk full"));
        assert_eq!(offsets(&h, task.id).await, BTreeSet::from([60]));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_cancels() {
        let h = harness();
        let task = h.controller.add(due_in(600)).await.unwrap();
        h.controller.delete(task.id).await;
        h.controller.delete(task.id).await;

        assert!(h.controller.tasks().is_empty());
        assert!(offsets(&h, task.id).await.is_empty());
        assert!(h.controller.last_error().is_none());
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_list() {
        let h = harness();
        h.controller.add(due_in(600)).await.unwrap();
        h.store.fail_reads(Some("engine offline"));

        h.controller.load_tasks();
        assert_eq!(h.controller.tasks().len(), 1);
        assert_eq!(h.controller.last_error().unwrap().operation, Operation::Load);

        h.controller.clear_error();
        assert!(h.controller.last_error().is_none());
    }

    #[tokio::test]
    async fn denied_permission_is_not_an_error() {
        let h = harness();
        h.dispatcher.set_permission(PermissionStatus::Denied);
        let task = h.controller.add(due_in(600)).await.unwrap();

        assert!(offsets(&h, task.id).await.is_empty());
        assert!(h.controller.last_error().is_none());
    }
}
