//! Task persistence: where [`crate::model::Task`] records live between being created, run, and
//! inspected.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::model::{Task, TaskStatus};

/// Loads, saves, and updates [`Task`] records.
///
/// Kept as a trait (rather than a concrete database client) so the executor can run against an
/// in-memory store in tests and a real database-backed store in production, mirroring how the
/// original system separated `models.Task` persistence from the generation/export logic.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Loads a task by id.
    async fn load_task(&self, task_id: u64) -> Result<Task, Error>;

    /// Persists a (possibly new) task.
    async fn save_task(&self, task: Task) -> Result<(), Error>;

    /// Updates a task's lifecycle status and, for `Failed`, its error message.
    async fn update_status(&self, task_id: u64, status: TaskStatus, error_msg: &str) -> Result<(), Error>;

    /// Updates a task's completion percentage.
    async fn update_progress(&self, task_id: u64, progress: f64) -> Result<(), Error>;

    /// Marks a task as completed.
    async fn mark_completed(&self, task_id: u64) -> Result<(), Error> {
        self.update_status(task_id, TaskStatus::Completed, "").await
    }
}

/// A [`MetadataStore`] backed by an in-process map, for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryMetadataStore {
    tasks: Arc<Mutex<HashMap<u64, Task>>>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn load_task(&self, task_id: u64) -> Result<Task, Error> {
        self.tasks
            .lock()
            .await
            .get(&task_id)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("task {task_id} not found")))
    }

    async fn save_task(&self, task: Task) -> Result<(), Error> {
        self.tasks.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn update_status(&self, task_id: u64, status: TaskStatus, error_msg: &str) -> Result<(), Error> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&task_id).ok_or_else(|| Error::Validation(format!("task {task_id} not found")))?;
        task.status = status;
        task.error_msg = error_msg.to_owned();
        Ok(())
    }

    async fn update_progress(&self, task_id: u64, progress: f64) -> Result<(), Error> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&task_id).ok_or_else(|| Error::Validation(format!("task {task_id} not found")))?;
        task.progress = progress;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputType, TaskType};

    fn sample_task(id: u64) -> Task {
        Task {
            id,
            name: "sample".to_owned(),
            r#type: TaskType::Json,
            data_source: None,
            table_name: String::new(),
            json_schema: "{}".to_owned(),
            csv_columns: Vec::new(),
            field_rules: Default::default(),
            count: 10,
            output_type: OutputType::Json,
            output_path: "out".to_owned(),
            configuration: None,
            unique_fields: Vec::new(),
            status: TaskStatus::Pending,
            progress: 0.0,
            error_msg: String::new(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryMetadataStore::new();
        store.save_task(sample_task(1)).await.unwrap();
        let loaded = store.load_task(1).await.unwrap();
        assert_eq!(loaded.id, 1);
    }

    #[tokio::test]
    async fn loading_missing_task_errors() {
        let store = InMemoryMetadataStore::new();
        assert!(store.load_task(99).await.is_err());
    }

    #[tokio::test]
    async fn update_status_and_progress_mutate_stored_task() {
        let store = InMemoryMetadataStore::new();
        store.save_task(sample_task(2)).await.unwrap();
        store.update_progress(2, 42.5).await.unwrap();
        store.update_status(2, TaskStatus::Failed, "boom").await.unwrap();
        let loaded = store.load_task(2).await.unwrap();
        assert_eq!(loaded.progress, 42.5);
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.error_msg, "boom");
    }

    #[tokio::test]
    async fn mark_completed_sets_status_and_clears_error() {
        let store = InMemoryMetadataStore::new();
        store.save_task(sample_task(3)).await.unwrap();
        store.update_status(3, TaskStatus::Failed, "boom").await.unwrap();
        store.mark_completed(3).await.unwrap();
        let loaded = store.load_task(3).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.error_msg, "");
    }
}
