//! Unit of work contract for long running tasks
//!
//! A `TaskExecutor` performs the work; the `TaskContext` it receives gives it
//! access to the persisted progress and to cooperative cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use czechidm_common::error::LONG_RUNNING_TASK_NOT_FOUND;
use czechidm_common::{IdmResult, OperationResult};
use czechidm_persistence::{LongRunningTaskInfo, TaskPersistence};


/// Work executed as a long running task
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Task type, unique per executor implementation
    fn name(&self) -> &str;

    fn description(&self) -> Option<String> {
        None
    }

    /// `false` allows at most one running instance of this task type
    fn is_concurrent(&self) -> bool {
        true
    }

    fn supports_dry_run(&self) -> bool {
        false
    }

    /// Processed items are remembered across runs
    fn is_stateful(&self) -> bool {
        false
    }

    /// Do the work
    ///
    /// Long loops call `ctx.update_state()` at iteration boundaries and stop
    /// when it returns `false`.
    async fn process(&self, ctx: &TaskContext) -> IdmResult<Option<OperationResult>>;
}

#[derive(Clone, Copy, Debug, Default)]
struct Progress {
    count: Option<i64>,
    counter: Option<i64>,
}

/// Runtime view of one started task
pub struct TaskContext {
    task_id: Uuid,
    task_type: String,
    dry_run: bool,
    scheduled_task_id: Option<Uuid>,
    properties: BTreeMap<String, serde_json::Value>,
    progress: Mutex<Progress>,
    store: Arc<dyn TaskPersistence>,
    token: CancellationToken,
}

impl TaskContext {
    pub fn new(
        task: &LongRunningTaskInfo,
        store: Arc<dyn TaskPersistence>,
        token: CancellationToken,
    ) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type.clone(),
            dry_run: task.dry_run,
            scheduled_task_id: task.scheduled_task_id,
            properties: task.task_properties.clone(),
            progress: Mutex::new(Progress {
                count: task.count,
                counter: task.counter,
            }),
            store,
            token,
        }
    }

    pub fn long_running_task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn scheduled_task_id(&self) -> Option<Uuid> {
        self.scheduled_task_id
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn count(&self) -> Option<i64> {
        self.progress.lock().count
    }

    pub fn counter(&self) -> Option<i64> {
        self.progress.lock().counter
    }

    pub fn set_count(&self, count: Option<i64>) {
        self.progress.lock().count = count;
    }

    pub fn set_counter(&self, counter: Option<i64>) {
        self.progress.lock().counter = counter;
    }

    pub fn increment_counter(&self) -> i64 {
        let mut progress = self.progress.lock();
        let counter = progress.counter.unwrap_or(0) + 1;
        progress.counter = Some(counter);
        counter
    }

    pub fn decrement_count(&self) {
        let mut progress = self.progress.lock();
        if let Some(count) = progress.count {
            progress.count = Some((count - 1).max(0));
        }
    }

    /// Persist progress and report whether the task may continue
    ///
    /// Returns `false` when the task was canceled, either through the local
    /// token or by another process changing the persisted result state.
    pub async fn update_state(&self) -> IdmResult<bool> {
        let progress = *self.progress.lock();
        let task = self
            .store
            .task_update_progress(self.task_id, progress.count, progress.counter)
            .await?
            .ok_or_else(|| LONG_RUNNING_TASK_NOT_FOUND.error([("taskId", self.task_id)]))?;

        if !task.state().is_runnable() {
            self.token.cancel();
        }
        Ok(!self.token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use czechidm_common::OperationState;
    use czechidm_persistence::MemoryPersistService;

    async fn running_task(store: &Arc<dyn TaskPersistence>) -> LongRunningTaskInfo {
        let mut task = LongRunningTaskInfo::new("test", "node");
        task.running = true;
        task.result = OperationResult::new(OperationState::Running);
        store.task_save(&task).await.unwrap()
    }

    #[tokio::test]
    async fn test_update_state_persists_progress() {
        let store: Arc<dyn TaskPersistence> = Arc::new(MemoryPersistService::new());
        let task = running_task(&store).await;
        let ctx = TaskContext::new(&task, store.clone(), CancellationToken::new());

        ctx.set_count(Some(10));
        ctx.increment_counter();
        ctx.increment_counter();
        assert!(ctx.update_state().await.unwrap());

        let saved = store.task_get(task.id).await.unwrap().unwrap();
        assert_eq!(saved.count, Some(10));
        assert_eq!(saved.counter, Some(2));
    }

    #[tokio::test]
    async fn test_update_state_observes_persisted_cancel() {
        let store: Arc<dyn TaskPersistence> = Arc::new(MemoryPersistService::new());
        let mut task = running_task(&store).await;
        let ctx = TaskContext::new(&task, store.clone(), CancellationToken::new());

        task.result = OperationResult::new(OperationState::Canceled);
        store.task_save(&task).await.unwrap();

        assert!(!ctx.update_state().await.unwrap());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_update_state_observes_token() {
        let store: Arc<dyn TaskPersistence> = Arc::new(MemoryPersistService::new());
        let task = running_task(&store).await;
        let token = CancellationToken::new();
        let ctx = TaskContext::new(&task, store.clone(), token.clone());

        token.cancel();
        assert!(!ctx.update_state().await.unwrap());
    }

    #[test]
    fn test_decrement_count_never_negative() {
        let store: Arc<dyn TaskPersistence> = Arc::new(MemoryPersistService::new());
        let task = LongRunningTaskInfo::new("test", "node");
        let ctx = TaskContext::new(&task, store, CancellationToken::new());
        ctx.decrement_count();
        assert_eq!(ctx.count(), None);
        ctx.set_count(Some(1));
        ctx.decrement_count();
        ctx.decrement_count();
        assert_eq!(ctx.count(), Some(0));
    }
}
