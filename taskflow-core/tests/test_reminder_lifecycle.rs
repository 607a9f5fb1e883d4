use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskflow_core::{
    DispatchCall, EarlyReminder, FixedClock, MemoryDispatcher, MemoryTaskStore, PermissionStatus,
    ReminderAction, ReminderKey, Settings, SettingsHandle, SettingsProvider, TaskDraft, TaskId,
    TaskLifecycleController, TaskStore,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap()
}

struct World {
    controller: TaskLifecycleController,
    store: Arc<MemoryTaskStore>,
    dispatcher: Arc<MemoryDispatcher>,
    settings: SettingsHandle,
}

fn world_with(dispatcher: MemoryDispatcher) -> World {
    let store = Arc::new(MemoryTaskStore::new());
    let dispatcher = Arc::new(dispatcher);
    let settings = SettingsHandle::default();
    let controller = TaskLifecycleController::new(
        store.clone(),
        dispatcher.clone(),
        Arc::new(settings.clone()),
        Arc::new(FixedClock::new(now())),
    );
    World {
        controller,
        store,
        dispatcher,
        settings,
    }
}

fn world() -> World {
    world_with(MemoryDispatcher::authorized())
}

fn draft(title: &str, due_in_minutes: i64, early: Option<EarlyReminder>) -> TaskDraft {
    TaskDraft {
        due: Some(now() + Duration::minutes(due_in_minutes)),
        early_reminder: early,
        ..TaskDraft::new(title)
    }
}

async fn pending(w: &World, id: TaskId) -> BTreeSet<u32> {
    w.controller.settled().await;
    w.dispatcher
        .pending_for(id)
        .iter()
        .map(|r| r.key.offset_minutes)
        .collect()
}

/// due = now+120min, lead 60, no early reminder -> one reminder at now+60min.
#[tokio::test]
async fn default_lead_scenario() {
    let w = world();
    let t = w.controller.add(draft("dentist", 120, None)).await.unwrap();
    w.controller.settled().await;

    let reminders = w.dispatcher.pending_for(t.id);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].key.offset_minutes, 60);
    assert_eq!(reminders[0].trigger_at, now() + Duration::minutes(60));
    assert_eq!(reminders[0].content.body, "dentist");
}

/// Early reminder of one day on a task due in two hours computes a past
/// trigger; only the 60 minute reminder is dispatched.
#[tokio::test]
async fn past_early_reminder_scenario() {
    let w = world();
    let t = w
        .controller
        .add(draft("dentist", 120, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();

    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60]));
    assert!(
        !w.dispatcher
            .calls()
            .contains(&DispatchCall::Schedule(ReminderKey::new(t.id, 1440)))
    );
}

#[tokio::test]
async fn title_only_update_causes_no_churn() {
    let w = world();
    let t = w
        .controller
        .add(draft("report", 3 * 24 * 60, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60, 1440]));

    w.dispatcher.clear_calls();
    let mut edited = t.clone();
    edited.title = "quarterly report".to_string();
    w.controller.update(edited).await.unwrap();
    w.controller.settled().await;

    assert!(w.dispatcher.calls().iter().all(|c| !c.is_mutation()));
    assert_eq!(w.controller.task(t.id).unwrap().title, "quarterly report");
}

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let w = world();
    w.controller.add(draft("a", 600, Some(EarlyReminder::TwoHours))).await.unwrap();
    w.controller.settled().await;

    w.controller.reconcile_all().await;
    w.controller.settled().await;
    w.dispatcher.clear_calls();

    w.controller.reconcile_all().await;
    w.controller.settled().await;
    assert!(w.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn delete_clears_both_slots() {
    let w = world();
    let t = w
        .controller
        .add(draft("flight", 5 * 24 * 60, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();
    assert_eq!(pending(&w, t.id).await.len(), 2);

    w.controller.delete(t.id).await;
    assert!(pending(&w, t.id).await.is_empty());
    assert!(w.store.fetch_by_id(t.id).unwrap().is_none());
}

#[tokio::test]
async fn disabling_notifications_cancels_every_pending_task() {
    let w = world();
    let a = w.controller.add(draft("a", 600, None)).await.unwrap();
    let b = w
        .controller
        .add(draft("b", 3000, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();
    assert_eq!(pending(&w, a.id).await.len(), 1);
    assert_eq!(pending(&w, b.id).await.len(), 2);

    w.settings.update(|s| s.notifications_enabled = false);
    w.controller.settled().await;
    assert!(w.dispatcher.pending().is_empty());

    w.settings.update(|s| s.notifications_enabled = true);
    assert_eq!(pending(&w, b.id).await, BTreeSet::from([60, 1440]));
}

#[tokio::test]
async fn lead_time_change_moves_default_slot() {
    let w = world();
    let t = w.controller.add(draft("a", 600, None)).await.unwrap();
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60]));

    w.settings.update(|s| s.default_lead_minutes = 15);
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([15]));
    assert_eq!(w.settings.snapshot().default_lead_minutes, 15);
}

#[tokio::test]
async fn last_update_wins() {
    let w = world();
    let t = w.controller.add(draft("a", 5 * 24 * 60, None)).await.unwrap();

    let mut first = t.clone();
    first.early_reminder = Some(EarlyReminder::OneDay);
    let mut second = t.clone();
    second.early_reminder = Some(EarlyReminder::TwoDays);

    // Issue both before any reminder work has settled.
    w.controller.update(first).await.unwrap();
    w.controller.update(second).await.unwrap();

    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60, 2880]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_update_and_delete_leave_no_dangling_reminder() {
    let w = world();
    for i in 0..20 {
        let t = w
            .controller
            .add(draft(&format!("task {i}"), 600, Some(EarlyReminder::TwoHours)))
            .await
            .unwrap();

        let mut edited = t.clone();
        edited.early_reminder = Some(EarlyReminder::ThirtyMinutes);

        let (c1, c2) = (w.controller.clone(), w.controller.clone());
        let id = t.id;
        let upd = tokio::spawn(async move { c1.update(edited).await });
        let del = tokio::spawn(async move { c2.delete(id).await });
        let update_result = upd.await.unwrap();
        del.await.unwrap();

        w.controller.settled().await;
        assert!(w.store.fetch_by_id(id).unwrap().is_none());
        assert!(w.dispatcher.pending_for(id).is_empty(), "dangling reminder for {id}");
        // Either the update ran first, or it found the task already gone.
        if let Err(e) = update_result {
            assert_eq!(e, taskflow_core::LifecycleError::NotFound(id));
        }
    }
}

#[tokio::test]
async fn undetermined_permission_denied_yields_empty_schedule() {
    let w = world_with(MemoryDispatcher::new(PermissionStatus::NotDetermined).with_grant_on_request(false));
    let t = w.controller.add(draft("a", 600, None)).await.unwrap();

    assert!(pending(&w, t.id).await.is_empty());
    assert_eq!(w.dispatcher.calls(), vec![DispatchCall::RequestPermission]);
    assert!(w.controller.last_error().is_none());
}

#[tokio::test]
async fn store_write_failure_is_recorded_not_thrown() {
    let w = world();
    w.store.fail_writes(Some("disk full"));

    let t = w.controller.add(draft("a", 600, None)).await.unwrap();
    assert!(w.controller.tasks().is_empty());
    assert!(pending(&w, t.id).await.is_empty());

    let failure = w.controller.last_error().unwrap();
    assert_eq!(failure.operation, taskflow_core::Operation::Add);
    assert!(failure.to_string().contains("disk full"));
}

async fn triggers(w: &World, id: TaskId) -> Vec<(u32, DateTime<Utc>)> {
    w.controller.settled().await;
    w.dispatcher
        .pending_for(id)
        .iter()
        .map(|r| (r.key.offset_minutes, r.trigger_at))
        .collect()
}

#[tokio::test]
async fn moving_due_date_moves_trigger() {
    let w = world();
    let t = w.controller.add(draft("invoice", 24 * 60, None)).await.unwrap();
    assert_eq!(
        triggers(&w, t.id).await,
        vec![(60, Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap())]
    );

    let mut edited = t.clone();
    edited.due = Some(now() + Duration::days(3));
    w.controller.update(edited).await.unwrap();

    assert_eq!(
        triggers(&w, t.id).await,
        vec![(60, Utc.with_ymd_and_hms(2026, 2, 24, 7, 0, 0).unwrap())]
    );
}

#[tokio::test]
async fn moving_due_date_moves_early_slot_too() {
    let w = world();
    let t = w
        .controller
        .add(draft("trip", 3 * 24 * 60, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60, 1440]));

    let mut edited = t.clone();
    edited.due = Some(now() + Duration::days(5));
    w.controller.update(edited).await.unwrap();

    let due = now() + Duration::days(5);
    assert_eq!(
        triggers(&w, t.id).await,
        vec![(60, due - Duration::minutes(60)), (1440, due - Duration::days(1))]
    );
}

#[tokio::test]
async fn clearing_due_date_cancels_every_slot() {
    let w = world();
    let t = w
        .controller
        .add(draft("trip", 3 * 24 * 60, Some(EarlyReminder::OneDay)))
        .await
        .unwrap();
    assert_eq!(pending(&w, t.id).await.len(), 2);

    let mut edited = t.clone();
    edited.due = None;
    w.controller.update(edited).await.unwrap();

    assert!(pending(&w, t.id).await.is_empty());
    assert_eq!(w.controller.task(t.id).unwrap().due, None);
    assert!(w.dispatcher.pending().is_empty());
}

#[tokio::test]
async fn complete_action_cancels_reminders() {
    let w = world();
    let t = w.controller.add(draft("call bank", 600, None)).await.unwrap();
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60]));

    let done = w
        .controller
        .apply_reminder_action(t.id, ReminderAction::Complete)
        .await
        .unwrap();
    assert!(done.completed);
    assert!(pending(&w, t.id).await.is_empty());

    // Completing twice does not reopen the task.
    let again = w
        .controller
        .apply_reminder_action(t.id, ReminderAction::Complete)
        .await
        .unwrap();
    assert!(again.completed);
    assert!(w.store.fetch_by_id(t.id).unwrap().unwrap().completed);
}

#[tokio::test]
async fn postpone_action_moves_due_and_trigger_by_an_hour() {
    let w = world();
    let t = w.controller.add(draft("standup", 120, None)).await.unwrap();
    assert_eq!(triggers(&w, t.id).await, vec![(60, now() + Duration::minutes(60))]);

    let moved = w
        .controller
        .apply_reminder_action(t.id, ReminderAction::Postpone)
        .await
        .unwrap();
    assert_eq!(moved.due, Some(now() + Duration::minutes(180)));
    assert_eq!(triggers(&w, t.id).await, vec![(60, now() + Duration::minutes(120))]);
}

#[tokio::test]
async fn postponing_undated_task_makes_it_due_in_an_hour() {
    let w = world();
    let t = w.controller.add(TaskDraft::new("someday")).await.unwrap();

    let moved = w
        .controller
        .apply_reminder_action(t.id, ReminderAction::Postpone)
        .await
        .unwrap();
    assert_eq!(moved.due, Some(now() + Duration::minutes(60)));
    // The default slot would fire now, which is not in the future.
    assert!(pending(&w, t.id).await.is_empty());
}

#[tokio::test]
async fn reminder_action_on_missing_task_is_not_found() {
    let w = world();
    let id = TaskId::new_v4();
    assert_eq!(
        w.controller
            .apply_reminder_action(id, ReminderAction::Postpone)
            .await
            .unwrap_err(),
        taskflow_core::LifecycleError::NotFound(id)
    );
}

#[tokio::test]
async fn settings_changed_between_runs_are_swept() {
    let w = world();
    let t = w.controller.add(draft("a", 600, None)).await.unwrap();
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60]));

    // Reminders on record were planned with a 15 minute lead.
    let previous = Settings {
        default_lead_minutes: 15,
        ..w.settings.snapshot()
    };
    assert!(w.controller.sweep_if_stale(previous).await);
    assert_eq!(pending(&w, t.id).await, BTreeSet::from([60]));

    w.dispatcher.clear_calls();
    assert!(!w.controller.sweep_if_stale(w.settings.snapshot()).await);
    w.controller.settled().await;
    assert!(w.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn stale_sweep_cancels_when_notifications_were_turned_off() {
    let w = world();
    let t = w.controller.add(draft("a", 600, None)).await.unwrap();
    assert_eq!(pending(&w, t.id).await.len(), 1);

    // A second run starts from settings edited on disk; its watcher never
    // sees a change, only the recorded settings reveal it.
    let previous = w.settings.snapshot();
    let store = w.store.clone();
    let dispatcher = w.dispatcher.clone();
    let edited = SettingsHandle::new(Settings {
        notifications_enabled: false,
        ..previous
    });
    let controller = TaskLifecycleController::new(
        store,
        dispatcher.clone(),
        Arc::new(edited),
        Arc::new(FixedClock::new(now())),
    );

    assert!(controller.sweep_if_stale(previous).await);
    controller.settled().await;
    assert!(dispatcher.pending_for(t.id).is_empty());
}
