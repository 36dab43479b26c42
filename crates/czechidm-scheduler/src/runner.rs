//! Task lifecycle: validate, start, process, end
//!
//! The runner owns the persisted state transitions of a long running task.
//! The executor only does the work; everything around it (running flag,
//! result state, progress, lifecycle events) happens here.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use czechidm_common::error::{
    LONG_RUNNING_TASK_IS_PROCESSED, LONG_RUNNING_TASK_IS_RUNNING, LONG_RUNNING_TASK_NOT_FOUND,
};
use czechidm_common::{IdmError, IdmResult, OperationResult, OperationState};
use czechidm_persistence::{LongRunningTaskFilter, LongRunningTaskInfo, TaskPersistence};

use crate::event::{TaskEventPublisher, TaskEventType};
use crate::executor::{TaskContext, TaskExecutor};

pub struct TaskRunner {
    store: Arc<dyn TaskPersistence>,
    events: TaskEventPublisher,
    /// Serialises validate-and-start of non concurrent task types
    type_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn TaskPersistence>, events: TaskEventPublisher) -> Self {
        Self {
            store,
            events,
            type_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskPersistence> {
        &self.store
    }

    pub fn events(&self) -> &TaskEventPublisher {
        &self.events
    }

    fn type_lock(&self, task_type: &str) -> Arc<Mutex<()>> {
        self.type_locks
            .entry(task_type.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, task_id: Uuid) -> IdmResult<LongRunningTaskInfo> {
        self.store
            .task_get(task_id)
            .await?
            .ok_or_else(|| LONG_RUNNING_TASK_NOT_FOUND.error([("taskId", task_id)]))
    }

    /// Check the task can be started by the executor
    pub async fn validate(
        &self,
        task: &LongRunningTaskInfo,
        executor: &dyn TaskExecutor,
    ) -> IdmResult<()> {
        if task.running {
            return Err(LONG_RUNNING_TASK_IS_RUNNING.error([("taskId", task.id)]));
        }
        if !task.state().is_runnable() {
            return Err(LONG_RUNNING_TASK_IS_PROCESSED.error([("taskId", task.id)]));
        }
        if task.dry_run && !executor.supports_dry_run() {
            return Err(IdmError::DryRunNotSupported(task.task_type.clone()));
        }
        if !executor.is_concurrent() {
            let filter = LongRunningTaskFilter {
                task_type: Some(task.task_type.clone()),
                running: Some(true),
                ..Default::default()
            };
            let running = self.store.task_find(&filter).await?;
            if let Some(other) = running.iter().find(|other| other.id != task.id) {
                return Err(IdmError::ConcurrentExecution {
                    task_type: task.task_type.clone(),
                    running_task_id: other.id,
                });
            }
        }
        Ok(())
    }

    /// Validate the task and mark it running
    pub async fn start(
        &self,
        task_id: Uuid,
        executor: &dyn TaskExecutor,
    ) -> IdmResult<LongRunningTaskInfo> {
        let lock = (!executor.is_concurrent()).then(|| self.type_lock(executor.name()));
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut task = self.load(task_id).await?;
        self.validate(&task, executor).await?;

        let thread = std::thread::current();
        task.running = true;
        task.stateful = executor.is_stateful();
        task.result = OperationResult::new(OperationState::Running);
        task.thread_id = Some(format!("{:?}", thread.id()));
        task.thread_name = thread.name().map(str::to_string);
        task.task_started = Some(Utc::now());
        let task = self.store.task_save(&task).await?;

        info!(task_id = %task.id, task_type = %task.task_type, "Long running task started");
        self.events.publish(TaskEventType::Start, &task);
        Ok(task)
    }

    /// Run the executor on an already started task and end it
    ///
    /// The returned outcome is the executor's own; its persisted form is
    /// stored on the task record before this returns.
    pub async fn process_started(
        &self,
        task: &LongRunningTaskInfo,
        executor: &dyn TaskExecutor,
        token: CancellationToken,
    ) -> IdmResult<Option<OperationResult>> {
        let ctx = TaskContext::new(task, self.store.clone(), token);
        let outcome = executor.process(&ctx).await;
        self.end(&ctx, &outcome).await?;
        outcome
    }

    /// Start and process in one call
    pub async fn run(
        &self,
        task_id: Uuid,
        executor: &dyn TaskExecutor,
        token: CancellationToken,
    ) -> IdmResult<Option<OperationResult>> {
        let task = self.start(task_id, executor).await?;
        self.process_started(&task, executor, token).await
    }

    /// Persist the final state of the task and publish the end event
    ///
    /// A result state stored by someone else while the task ran (a cancel)
    /// is kept.
    pub async fn end(
        &self,
        ctx: &TaskContext,
        outcome: &IdmResult<Option<OperationResult>>,
    ) -> IdmResult<LongRunningTaskInfo> {
        let task_id = ctx.long_running_task_id();
        let result = match outcome {
            Err(e) => {
                error!(task_id = %task_id, task_type = %ctx.task_type(), error = %e, "Long running task failed");
                OperationResult::from_error(e)
            }
            Ok(_) if ctx.is_cancelled() => OperationResult::new(OperationState::Canceled),
            Ok(result) => {
                let mut executed = OperationResult::new(OperationState::Executed);
                if let Some(result) = result {
                    executed.code = result.code.clone();
                    executed.model = result.model.clone();
                }
                executed
            }
        };

        let task = self
            .store
            .task_finish(task_id, ctx.count(), ctx.counter(), result)
            .await?
            .ok_or_else(|| LONG_RUNNING_TASK_NOT_FOUND.error([("taskId", task_id)]))?;
        debug!(task_id = %task.id, state = %task.state(), counter = ?task.counter, "Long running task ended");
        metrics::counter!("idm_long_running_task_total", "result" => task.state().as_str())
            .increment(1);
        self.events.publish(TaskEventType::End, &task);
        Ok(task)
    }
}
