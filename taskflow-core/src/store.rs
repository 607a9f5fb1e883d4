//! Task Store contract, sort orders, and an in-memory store.
//!
//! The store is the durable record of tasks. Layout on disk (if any) belongs
//! to the implementation; the core only sees this trait.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::settings::SortOption;
use crate::task::{Task, TaskId};

pub trait TaskStore: Send + Sync {
    fn create(&self, task: &Task) -> Result<(), StoreError>;

    fn fetch_all(&self, sort: SortOption) -> Result<Vec<Task>, StoreError>;

    fn fetch_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Replace the stored snapshot. `StoreError::NotFound` if absent.
    fn update(&self, task: &Task) -> Result<(), StoreError>;

    /// Remove a task. `StoreError::NotFound` if absent.
    fn delete(&self, id: TaskId) -> Result<(), StoreError>;
}

/// Sort in place by the given option. Ties fall back to creation time, then id,
/// so the order is total and stable across loads.
pub fn sort_tasks(tasks: &mut [Task], sort: SortOption) {
    tasks.sort_by(|a, b| compare(a, b, sort));
}

fn compare(a: &Task, b: &Task, sort: SortOption) -> Ordering {
    let primary = match sort {
        SortOption::Priority => b
            .priority
            .cmp(&a.priority)
            .then_with(|| due_nulls_last(a, b)),
        SortOption::DueDate => due_nulls_last(a, b).then_with(|| b.priority.cmp(&a.priority)),
        SortOption::Created => Ordering::Equal,
    };
    primary
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn due_nulls_last(a: &Task, b: &Task) -> Ordering {
    match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: HashMap<TaskId, Task>,
    fail_reads: Option<String>,
    fail_writes: Option<String>,
}

/// Map-backed store. Failures can be injected to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: Mutex<MemoryState>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let store = Self::new();
        {
            let mut st = store.lock();
            for t in tasks {
                st.tasks.insert(t.id, t);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Make every read fail with `StoreError::Engine(message)`; `None` clears it.
    pub fn fail_reads(&self, message: Option<&str>) {
        self.lock().fail_reads = message.map(str::to_string);
    }

    /// Make every write fail with `StoreError::Io(message)`; `None` clears it.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.lock().fail_writes = message.map(str::to_string);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let st = self.lock();
        if let Some(msg) = st.fail_writes.clone() {
            return Err(StoreError::Io(msg));
        }
        Ok(st)
    }

    fn readable(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let st = self.lock();
        if let Some(msg) = st.fail_reads.clone() {
            return Err(StoreError::Engine(msg));
        }
        Ok(st)
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut st = self.writable()?;
        if st.tasks.contains_key(&task.id) {
            return Err(StoreError::Engine(format!("duplicate task id {}", task.id)));
        }
        st.tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn fetch_all(&self, sort: SortOption) -> Result<Vec<Task>, StoreError> {
        let st = self.readable()?;
        let mut out: Vec<Task> = st.tasks.values().cloned().collect();
        sort_tasks(&mut out, sort);
        Ok(out)
    }

    fn fetch_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.readable()?.tasks.get(&id).cloned())
    }

    fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut st = self.writable()?;
        match st.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(task.id)),
        }
    }

    fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        let mut st = self.writable()?;
        st.tasks.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use chrono::{Duration, TimeZone, Utc};

    fn at(h: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn fixture() -> Vec<Task> {
        let mut a = Task::new("low-soon").with_priority(Priority::Low).with_due(at(1));
        a.created_at = at(-3);
        let mut b = Task::new("high-late").with_priority(Priority::High).with_due(at(10));
        b.created_at = at(-1);
        let mut c = Task::new("high-none").with_priority(Priority::High);
        c.created_at = at(-2);
        let mut d = Task::new("high-early").with_priority(Priority::High).with_due(at(2));
        d.created_at = at(0);
        vec![a, b, c, d]
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn priority_sort_puts_missing_due_last() {
        let mut tasks = fixture();
        sort_tasks(&mut tasks, SortOption::Priority);
        assert_eq!(titles(&tasks), vec!["high-early", "high-late", "high-none", "low-soon"]);
    }

    #[test]
    fn due_date_sort() {
        let mut tasks = fixture();
        sort_tasks(&mut tasks, SortOption::DueDate);
        assert_eq!(titles(&tasks), vec!["low-soon", "high-early", "high-late", "high-none"]);
    }

    #[test]
    fn created_sort() {
        let mut tasks = fixture();
        sort_tasks(&mut tasks, SortOption::Created);
        assert_eq!(titles(&tasks), vec!["low-soon", "high-none", "high-late", "high-early"]);
    }

    #[test]
    fn crud_round_trip() {
        let store = MemoryTaskStore::new();
        let mut t = Task::new("a");
        store.create(&t).unwrap();
        assert!(store.create(&t).is_err());

        t.title = "renamed".to_string();
        store.update(&t).unwrap();
        assert_eq!(store.fetch_by_id(t.id).unwrap().unwrap().title, "renamed");

        store.delete(t.id).unwrap();
        assert_eq!(store.delete(t.id), Err(StoreError::NotFound(t.id)));
        assert_eq!(store.update(&t), Err(StoreError::NotFound(t.id)));
        assert!(store.is_empty());
    }

    #[test]
    fn injected_failures() {
        let store = MemoryTaskStore::with_tasks(fixture());
        store.fail_reads(Some("engine offline"));
        assert!(matches!(store.fetch_all(SortOption::Priority), Err(StoreError::Engine(_))));

        store.fail_reads(None);
        store.fail_writes(Some("disk full"));
        assert!(matches!(store.create(&Task::new("x")), Err(StoreError::Io(_))));
        assert_eq!(store.len(), 4);
    }
}
