//! Scheduled tasks and the trigger loop
//!
//! A scheduled task names a task type, its properties and a trigger. Due
//! triggers are turned into long running tasks through the manager.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use czechidm_common::error::{NOT_FOUND, SCHEDULER_TASK_TYPE_NOT_FOUND};
use czechidm_common::{Clock, IdmResult};
use czechidm_persistence::{LongRunningTaskInfo, ScheduledTaskInfo, TaskPersistence, TaskTrigger};

use crate::manager::{ExecuteOptions, LongRunningTaskManager};
use crate::processed_items::ProcessedItemsService;

pub struct Scheduler {
    store: Arc<dyn TaskPersistence>,
    manager: Arc<LongRunningTaskManager>,
    items: ProcessedItemsService,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskPersistence>,
        manager: Arc<LongRunningTaskManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items: ProcessedItemsService::new(store.clone()),
            store,
            manager,
            clock,
        }
    }

    pub fn manager(&self) -> &Arc<LongRunningTaskManager> {
        &self.manager
    }

    /// Persist a scheduled task of a registered task type
    pub async fn create_task(&self, task: ScheduledTaskInfo) -> IdmResult<ScheduledTaskInfo> {
        if !self.manager.registry().contains(&task.task_type) {
            return Err(SCHEDULER_TASK_TYPE_NOT_FOUND.error([("taskType", &task.task_type)]));
        }
        let task = self.store.scheduled_task_save(&task).await?;
        info!(scheduled_task_id = %task.id, task_type = %task.task_type, "Scheduled task created");
        Ok(task)
    }

    /// Delete the scheduled task with its processed items queue
    pub async fn delete_task(&self, scheduled_task_id: Uuid) -> IdmResult<bool> {
        let removed = self.items.delete_by_scheduled_task(scheduled_task_id).await?;
        let deleted = self.store.scheduled_task_delete(scheduled_task_id).await?;
        debug!(scheduled_task_id = %scheduled_task_id, removed, deleted, "Scheduled task deleted");
        Ok(deleted)
    }

    pub async fn find_tasks(&self) -> IdmResult<Vec<ScheduledTaskInfo>> {
        Ok(self.store.scheduled_task_find_all().await?)
    }

    /// Run the scheduled task immediately, regardless of its trigger
    pub async fn run_task_now(&self, scheduled_task_id: Uuid) -> IdmResult<LongRunningTaskInfo> {
        let task = self
            .store
            .scheduled_task_get(scheduled_task_id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", scheduled_task_id)]))?;
        self.launch(&task).await
    }

    async fn launch(&self, task: &ScheduledTaskInfo) -> IdmResult<LongRunningTaskInfo> {
        let executor = self
            .manager
            .registry()
            .create(&task.task_type, &task.properties)?;
        let options = ExecuteOptions {
            dry_run: task.dry_run,
            scheduled_task_id: Some(task.id),
            properties: task.properties.clone(),
            description: task.description.clone(),
        };
        self.manager.execute(executor, options).await
    }

    /// Launch every scheduled task of this instance whose trigger is due
    ///
    /// Returns the ids of the started long running tasks. A task that fails
    /// to start is logged and skipped; its trigger still advances.
    pub async fn run_due(&self) -> IdmResult<Vec<Uuid>> {
        let now = self.clock.now();
        let mut launched = Vec::new();

        for mut task in self.store.scheduled_task_find_all().await? {
            if task.instance_id != self.manager.instance_id() {
                continue;
            }
            let Some(trigger) = task.trigger.clone() else {
                continue;
            };
            if trigger.next_fire_at() > now {
                continue;
            }

            task.trigger = match trigger {
                TaskTrigger::Simple { .. } => None,
                TaskTrigger::Repeat {
                    interval_ms,
                    next_fire_at,
                } => {
                    let interval = TimeDelta::milliseconds(interval_ms.max(1));
                    let mut next = next_fire_at + interval;
                    if next <= now {
                        next = now + interval;
                    }
                    Some(TaskTrigger::Repeat {
                        interval_ms,
                        next_fire_at: next,
                    })
                }
            };
            let task = self.store.scheduled_task_save(&task).await?;

            match self.launch(&task).await {
                Ok(started) => launched.push(started.id),
                Err(e) => {
                    warn!(scheduled_task_id = %task.id, task_type = %task.task_type, error = %e, "Scheduled task not started");
                }
            }
        }
        Ok(launched)
    }

    /// Poll triggers every `interval` until shutdown is signalled
    pub fn start(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!(interval = ?interval, "Scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_due().await {
                            warn!(error = %e, "Scheduler run failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Scheduler stopped");
                        break;
                    }
                }
            }
        })
    }
}
