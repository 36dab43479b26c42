//! Long running task manager
//!
//! Creates task records, runs them on the tokio runtime and handles the
//! administrative actions: cancel, interrupt and restart recovery.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use czechidm_common::error::{
    LONG_RUNNING_TASK_CANCELED_BY_RESTART, LONG_RUNNING_TASK_INTERRUPT,
    LONG_RUNNING_TASK_IS_PROCESSED, LONG_RUNNING_TASK_NOT_FOUND,
};
use czechidm_common::{IdmResult, OperationResult, OperationState};
use czechidm_persistence::{LongRunningTaskFilter, LongRunningTaskInfo, TaskPersistence};

use crate::event::TaskEventType;
use crate::executor::TaskExecutor;
use crate::registry::{TaskProperties, TaskRegistry};
use crate::runner::TaskRunner;

#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    pub dry_run: bool,
    pub scheduled_task_id: Option<Uuid>,
    pub properties: TaskProperties,
    pub description: Option<String>,
}

impl ExecuteOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }
}

struct RunningTask {
    token: CancellationToken,
    handle: Option<AbortHandle>,
}

pub struct LongRunningTaskManager {
    instance_id: String,
    runner: Arc<TaskRunner>,
    registry: Arc<TaskRegistry>,
    running: Arc<DashMap<Uuid, RunningTask>>,
}

impl LongRunningTaskManager {
    pub fn new(instance_id: &str, runner: Arc<TaskRunner>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            runner,
            registry,
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    fn store(&self) -> &Arc<dyn TaskPersistence> {
        self.runner.store()
    }

    pub async fn get_task(&self, task_id: Uuid) -> IdmResult<Option<LongRunningTaskInfo>> {
        Ok(self.store().task_get(task_id).await?)
    }

    /// Task is executed by this manager right now
    pub fn is_running_locally(&self, task_id: Uuid) -> bool {
        self.running.contains_key(&task_id)
    }

    async fn create(
        &self,
        executor: &dyn TaskExecutor,
        options: ExecuteOptions,
    ) -> IdmResult<LongRunningTaskInfo> {
        let mut task = LongRunningTaskInfo::new(executor.name(), &self.instance_id);
        task.task_description = options.description.or_else(|| executor.description());
        task.task_properties = options.properties;
        task.dry_run = options.dry_run;
        task.stateful = executor.is_stateful();
        task.scheduled_task_id = options.scheduled_task_id;
        Ok(self.store().task_save(&task).await?)
    }

    /// Mark a task that never started as not executed
    async fn reject(&self, task_id: Uuid, error: &czechidm_common::IdmError) -> IdmResult<()> {
        if let Some(mut task) = self.store().task_get(task_id).await? {
            task.running = false;
            task.result = OperationResult::with_model(OperationState::NotExecuted, error.result_model());
            self.store().task_save(&task).await?;
        }
        Ok(())
    }

    /// Start the task and process it on a spawned tokio task
    async fn spawn(
        &self,
        task_id: Uuid,
        executor: Arc<dyn TaskExecutor>,
    ) -> IdmResult<LongRunningTaskInfo> {
        let started = self.runner.start(task_id, executor.as_ref()).await?;

        let token = CancellationToken::new();
        self.running.insert(
            task_id,
            RunningTask {
                token: token.clone(),
                handle: None,
            },
        );

        let runner = self.runner.clone();
        let running = self.running.clone();
        let task = started.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = runner
                .process_started(&task, executor.as_ref(), token)
                .await
            {
                warn!(task_id = %task.id, error = %e, "Long running task ended with error");
            }
            running.remove(&task.id);
        });
        if let Some(mut entry) = self.running.get_mut(&task_id) {
            entry.handle = Some(handle.abort_handle());
        }
        Ok(started)
    }

    /// Create a task record and run it asynchronously
    ///
    /// Returns the started task. When the task cannot be started, the record
    /// is kept as `NOT_EXECUTED` and the error is returned.
    pub async fn execute(
        &self,
        executor: Arc<dyn TaskExecutor>,
        options: ExecuteOptions,
    ) -> IdmResult<LongRunningTaskInfo> {
        let task = self.create(executor.as_ref(), options).await?;
        match self.spawn(task.id, executor).await {
            Ok(started) => Ok(started),
            Err(e) => {
                warn!(task_id = %task.id, task_type = %task.task_type, error = %e, "Long running task not started");
                self.reject(task.id, &e).await?;
                Err(e)
            }
        }
    }

    /// Create a task record and run it on the current task
    ///
    /// Returns the ended task record, or the processing error after the
    /// failure was persisted on the record.
    pub async fn execute_sync(
        &self,
        executor: Arc<dyn TaskExecutor>,
        options: ExecuteOptions,
    ) -> IdmResult<LongRunningTaskInfo> {
        let task = self.create(executor.as_ref(), options).await?;
        let started = match self.runner.start(task.id, executor.as_ref()).await {
            Ok(started) => started,
            Err(e) => {
                self.reject(task.id, &e).await?;
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        self.running.insert(
            task.id,
            RunningTask {
                token: token.clone(),
                handle: None,
            },
        );
        let outcome = self
            .runner
            .process_started(&started, executor.as_ref(), token)
            .await;
        self.running.remove(&task.id);
        outcome?;

        self.store()
            .task_get(task.id)
            .await?
            .ok_or_else(|| LONG_RUNNING_TASK_NOT_FOUND.error([("taskId", task.id)]))
    }

    /// Request cooperative cancellation
    ///
    /// The executor observes it on its next `update_state` call.
    pub async fn cancel(&self, task_id: Uuid) -> IdmResult<LongRunningTaskInfo> {
        let mut task = self
            .store()
            .task_get(task_id)
            .await?
            .ok_or_else(|| LONG_RUNNING_TASK_NOT_FOUND.error([("taskId", task_id)]))?;
        if !task.state().is_runnable() {
            return Err(LONG_RUNNING_TASK_IS_PROCESSED.error([("taskId", task_id)]));
        }

        let local = match self.running.get(&task_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        };
        // A task owned by another instance keeps its flag until that instance ends it
        if !local && task.instance_id == self.instance_id {
            task.running = false;
        }
        task.result = OperationResult::new(OperationState::Canceled);
        let task = self.store().task_save(&task).await?;
        info!(task_id = %task_id, local, "Long running task canceled");
        Ok(task)
    }

    /// Abort the running future of the task
    ///
    /// Returns `false` when the task is not running on this instance.
    pub async fn interrupt(&self, task_id: Uuid) -> IdmResult<bool> {
        let Some((_, running)) = self.running.remove(&task_id) else {
            return Ok(false);
        };
        running.token.cancel();
        if let Some(handle) = running.handle {
            handle.abort();
        }

        if let Some(mut task) = self.store().task_get(task_id).await? {
            task.running = false;
            task.result = OperationResult::with_code(
                OperationState::Canceled,
                &LONG_RUNNING_TASK_INTERRUPT,
                [("taskId", task_id)],
            );
            let task = self.store().task_save(&task).await?;
            self.runner.events().publish(TaskEventType::End, &task);
        }
        warn!(task_id = %task_id, "Long running task interrupted");
        Ok(true)
    }

    /// Cancel tasks left running by a previous run of this instance
    pub async fn init(&self) -> IdmResult<usize> {
        let filter = LongRunningTaskFilter {
            instance_id: Some(self.instance_id.clone()),
            ..Default::default()
        };
        let mut canceled = 0;
        for mut task in self.store().task_find(&filter).await? {
            if !(task.running || task.state() == OperationState::Running) {
                continue;
            }
            if self.running.contains_key(&task.id) {
                continue;
            }
            task.running = false;
            task.result = OperationResult::with_code(
                OperationState::Canceled,
                &LONG_RUNNING_TASK_CANCELED_BY_RESTART,
                [
                    ("taskId", task.id.to_string()),
                    ("instanceId", self.instance_id.clone()),
                ],
            );
            self.store().task_save(&task).await?;
            warn!(task_id = %task.id, task_type = %task.task_type, "Long running task canceled by restart");
            canceled += 1;
        }
        Ok(canceled)
    }

    /// Run persisted tasks of this instance that were created but never started
    pub async fn process_created(&self) -> IdmResult<usize> {
        let filter = LongRunningTaskFilter {
            running: Some(false),
            state: Some(OperationState::Created),
            instance_id: Some(self.instance_id.clone()),
            ..Default::default()
        };
        let mut started = 0;
        for task in self.store().task_find(&filter).await? {
            let spawned = match self.registry.create(&task.task_type, &task.task_properties) {
                Ok(executor) => self.spawn(task.id, executor).await,
                Err(e) => Err(e),
            };
            match spawned {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(task_id = %task.id, task_type = %task.task_type, error = %e, "Created task not started");
                    self.reject(task.id, &e).await?;
                }
            }
        }
        Ok(started)
    }

    /// Flip the cancellation token of every locally running task
    pub fn cancel_all(&self) -> usize {
        for entry in self.running.iter() {
            entry.token.cancel();
        }
        self.running.len()
    }
}
