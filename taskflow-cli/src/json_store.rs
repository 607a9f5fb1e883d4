//! JSON-file task store: the whole task list lives in one `tasks.json`.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use taskflow_core::{SortOption, StoreError, Task, TaskId, TaskStore, sort_tasks};

use crate::state::write_atomic;

#[derive(Debug)]
pub struct JsonTaskStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonTaskStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<Task>, StoreError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let s = fs::read_to_string(&self.path)?;
        if s.trim().is_empty() {
            return Ok(vec![]);
        }
        serde_json::from_str(&s)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn write(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(tasks).map_err(|e| StoreError::Engine(e.to_string()))?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Vec<Task>) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tasks = self.read()?;
        let out = f(&mut tasks)?;
        self.write(&tasks)?;
        Ok(out)
    }
}

impl TaskStore for JsonTaskStore {
    fn create(&self, task: &Task) -> Result<(), StoreError> {
        self.modify(|tasks| {
            if tasks.iter().any(|t| t.id == task.id) {
                return Err(StoreError::Engine(format!("duplicate task id {}", task.id)));
            }
            tasks.push(task.clone());
            Ok(())
        })
    }

    fn fetch_all(&self, sort: SortOption) -> Result<Vec<Task>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tasks = self.read()?;
        sort_tasks(&mut tasks, sort);
        Ok(tasks)
    }

    fn fetch_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.into_iter().find(|t| t.id == id))
    }

    fn update(&self, task: &Task) -> Result<(), StoreError> {
        self.modify(|tasks| {
            let slot = tasks
                .iter_mut()
                .find(|t| t.id == task.id)
                .ok_or(StoreError::NotFound(task.id))?;
            *slot = task.clone();
            Ok(())
        })
    }

    fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.modify(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            if tasks.len() == before {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }
}
