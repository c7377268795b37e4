//! In-memory task record set.
//!
//! The [`TaskStore`] assigns identifiers and timestamps on create and
//! refreshes `updated_at` on every mutation. Records are lost on restart.
//!
//! Concurrent mutations of the same task are serialized by the store lock and
//! resolved last-write-wins; `updated_at` still never moves backwards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use taskboard_proto::task::{MAX_TASK_TITLE_LENGTH, Task, TaskId, TaskPriority, TaskStatus};
use tokio::sync::RwLock;

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No task has the given identifier.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The request describes a task that cannot be stored.
    #[error("invalid task: {0}")]
    Invalid(String),
}

/// Fields a client supplies when creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    /// Short summary; must not be blank.
    pub title: String,
    /// Free-form details.
    #[serde(default)]
    pub description: String,
    /// Initial status, `todo` when omitted.
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority, `medium` when omitted.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Optional deadline.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Owning user; must not be blank.
    pub user_id: String,
}

impl NewTask {
    fn validate(&self) -> Result<(), StoreError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(StoreError::Invalid("title is required".into()));
        }
        if title.chars().count() > MAX_TASK_TITLE_LENGTH {
            return Err(StoreError::Invalid(format!(
                "title exceeds {MAX_TASK_TITLE_LENGTH} characters"
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(StoreError::Invalid("user_id is required".into()));
        }
        Ok(())
    }
}

/// Thread-safe in-memory task store.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new task, assigning its identifier and timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank or oversized title, or a
    /// blank `user_id`.
    pub async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        new.validate()?;
        let now = Utc::now();

        let mut tasks = self.tasks.write().await;
        let id = loop {
            let candidate = TaskId::generate();
            if !tasks.contains_key(&candidate) {
                break candidate;
            }
        };
        let task = Task {
            id: id.clone(),
            title: new.title.trim().to_string(),
            description: new.description,
            status: new.status,
            priority: new.priority,
            due_date: new.due_date,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
            deleted: false,
        };
        tasks.insert(id, task.clone());
        drop(tasks);
        Ok(task)
    }

    /// Returns a copy of the task with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such task.
    pub async fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        let tasks = self.tasks.read().await;
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Returns the user's tasks, oldest first.
    pub async fn list_for_user(&self, user_id: &str) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut owned: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        drop(tasks);
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        owned
    }

    /// Sets a task's status and refreshes `updated_at`. Returns the updated
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such task.
    pub async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        task.status = status;
        task.touch(Utc::now());
        Ok(task.clone())
    }

    /// Removes a task, returning its final value marked as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such task.
    pub async fn delete(&self, id: &TaskId) -> Result<Task, StoreError> {
        let removed = self.tasks.write().await.remove(id);
        removed
            .map(|task| task.tombstone(Utc::now()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Returns `true` if the store holds no tasks.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
