//! Application wiring
//!
//! Builds the persistence backend and the services on top of it, and
//! registers the task types the scheduler can run.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::info;

use czechidm_acc::{
    Connector, NotificationLogService, OperationCounterCache, ProvisioningBreakConfigService,
    ProvisioningBreakEvaluator, ProvisioningExecutor, RETRY_PROVISIONING_TASK_TYPE,
    ReferentialIntegrity, RetryProvisioningTaskExecutor, SystemService,
};
use czechidm_common::{Clock, IdmConfiguration, IdmResult, SystemClock};
use czechidm_persistence::{MemoryPersistService, PersistenceService, ScheduledTaskInfo, TaskTrigger};
use czechidm_scheduler::{
    LongRunningTaskManager, Scheduler, TaskEventPublisher, TaskExecutor, TaskRegistry, TaskRunner,
};

use crate::config::Settings;

pub struct Application {
    pub settings: Settings,
    pub instance_id: String,
    pub store: Arc<dyn PersistenceService>,
    pub configuration: Arc<IdmConfiguration>,
    pub clock: Arc<dyn Clock>,
    pub notifications: Arc<NotificationLogService>,
    pub break_configs: Arc<ProvisioningBreakConfigService>,
    pub systems: Arc<SystemService>,
    pub provisioning: Arc<ProvisioningExecutor>,
    pub integrity: Arc<ReferentialIntegrity>,
    pub events: TaskEventPublisher,
    pub task_manager: Arc<LongRunningTaskManager>,
    pub scheduler: Arc<Scheduler>,
}

impl Application {
    pub fn new(settings: Settings, connector: Arc<dyn Connector>) -> Self {
        Self::with_clock(settings, connector, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, connector: Arc<dyn Connector>, clock: Arc<dyn Clock>) -> Self {
        let instance_id = settings.instance_id();
        let backend = Arc::new(MemoryPersistService::new());
        let store: Arc<dyn PersistenceService> = backend.clone();
        info!(backend = store.backend_name(), instance_id = %instance_id, "Persistence initialized");

        let configuration = Arc::new(IdmConfiguration::new(settings.config.clone()));
        let counter = Arc::new(OperationCounterCache::new(clock.clone()));
        let break_configs = Arc::new(ProvisioningBreakConfigService::new(
            store.clone(),
            configuration.clone(),
            counter,
        ));
        let notifications = Arc::new(NotificationLogService::default());
        let evaluator = Arc::new(ProvisioningBreakEvaluator::new(
            store.clone(),
            break_configs.clone(),
            notifications.clone(),
        ));
        let systems = Arc::new(SystemService::new(store.clone(), break_configs.clone()));
        let provisioning = Arc::new(ProvisioningExecutor::new(
            store.clone(),
            evaluator,
            connector,
            clock.clone(),
        ));
        let integrity = Arc::new(ReferentialIntegrity::new(store.clone()));

        let events = TaskEventPublisher::default();
        let runner = Arc::new(TaskRunner::new(backend.clone(), events.clone()));
        let registry = Arc::new(TaskRegistry::new());
        {
            let store = store.clone();
            let provisioning = provisioning.clone();
            let clock = clock.clone();
            registry.register(RETRY_PROVISIONING_TASK_TYPE, move |_properties| {
                let executor: Arc<dyn TaskExecutor> = Arc::new(RetryProvisioningTaskExecutor::new(
                    store.clone(),
                    provisioning.clone(),
                    clock.clone(),
                ));
                Ok(executor)
            });
        }
        let task_manager = Arc::new(LongRunningTaskManager::new(&instance_id, runner, registry));
        let scheduler = Arc::new(Scheduler::new(backend, task_manager.clone(), clock.clone()));

        Self {
            settings,
            instance_id,
            store,
            configuration,
            clock,
            notifications,
            break_configs,
            systems,
            provisioning,
            integrity,
            events,
            task_manager,
            scheduler,
        }
    }

    /// Recover tasks left by a previous run and schedule the built-in tasks
    pub async fn init(&self) -> IdmResult<()> {
        self.store.health_check().await?;

        let canceled = self.task_manager.init().await?;
        if canceled > 0 {
            info!(canceled, "Tasks left running by previous run canceled");
        }
        let processed = self.task_manager.process_created().await?;
        if processed > 0 {
            info!(processed, "Created tasks processed");
        }
        self.ensure_retry_task().await?;
        Ok(())
    }

    /// Repeating retry task of this instance, created when missing
    pub async fn ensure_retry_task(&self) -> IdmResult<ScheduledTaskInfo> {
        if let Some(existing) = self.scheduler.find_tasks().await?.into_iter().find(|task| {
            task.task_type == RETRY_PROVISIONING_TASK_TYPE && task.instance_id == self.instance_id
        }) {
            return Ok(existing);
        }

        let interval = self.settings.retry_interval();
        let interval_ms = interval.as_millis() as i64;
        let trigger = TaskTrigger::Repeat {
            interval_ms,
            next_fire_at: self.clock.now() + TimeDelta::milliseconds(interval_ms),
        };
        let mut task = ScheduledTaskInfo::new(RETRY_PROVISIONING_TASK_TYPE, &self.instance_id, Some(trigger));
        task.description = Some("Retry failed provisioning operations".to_string());
        let task = self.scheduler.create_task(task).await?;
        info!(scheduled_task_id = %task.id, interval = ?interval, "Provisioning retry scheduled");
        Ok(task)
    }
}
