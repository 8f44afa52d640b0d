//! Process-wide task state store.
//!
//! Keyed by task id; mutated only through [`StateStore::update`], which merges
//! the supplied fields atomically under one write lock. Concurrent tasks do
//! not interfere; per-id updates are last-writer-wins.

use crate::models::{ArtifactValue, PipelineStage, Task, TaskState};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    /// Shared default store, for callers that do not inject their own.
    pub static ref GLOBAL_STATE: Arc<StateStore> = Arc::new(StateStore::new());
}

/// Partial task update applied atomically by [`StateStore::update`].
#[derive(Debug, Default)]
pub struct TaskUpdate {
    pub stage: Option<PipelineStage>,
    pub state: Option<TaskState>,
    pub progress: Option<u8>,
    pub artifacts: Vec<(String, ArtifactValue)>,
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn state(state: TaskState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn artifact(mut self, name: impl Into<String>, value: ArtifactValue) -> Self {
        self.artifacts.push((name.into(), value));
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// Key-value record of task status/progress/artifacts.
pub struct StateStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a task in the queued state. Re-registering the same id
    /// resets it, matching the idempotent re-invocation contract.
    pub fn create_task(&self, task_id: &str) -> Task {
        let task = Task::new(task_id);
        self.tasks.write().insert(task_id.to_string(), task.clone());
        task
    }

    /// Merge the given fields into the task record under one write lock.
    /// Creates the record if the id is unknown.
    pub fn update(&self, task_id: &str, update: TaskUpdate) {
        let mut tasks = self.tasks.write();
        let task = tasks
            .entry(task_id.to_string())
            .or_insert_with(|| Task::new(task_id));
        if let Some(stage) = update.stage {
            task.stage = stage;
        }
        if let Some(state) = update.state {
            task.state = state;
        }
        if let Some(progress) = update.progress {
            task.progress = progress;
        }
        for (name, value) in update.artifacts {
            task.artifacts.insert(name, value);
        }
        if let Some(error) = update.error {
            task.error = Some(error);
        }
        task.updated_at = chrono::Utc::now();
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    /// Remove a task record. Terminal states persist until an external API
    /// layer calls this.
    pub fn delete(&self, task_id: &str) -> Option<Task> {
        self.tasks.write().remove(task_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
