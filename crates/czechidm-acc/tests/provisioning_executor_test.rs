// Integration tests for provisioning dispatch and retry
// Tests queue ordering, blocked systems, retry back-off and the retry task

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::json;
use uuid::Uuid;

use czechidm_acc::result_code::{
    PROVISIONING_FAILED, PROVISIONING_IS_IN_QUEUE, PROVISIONING_SUCCEED,
    PROVISIONING_SYSTEM_BLOCKED, PROVISIONING_SYSTEM_DISABLED,
};
use czechidm_acc::{
    Connector, ConnectorError, NotificationLogService, OperationCounterCache,
    ProvisioningBreakConfigService, ProvisioningBreakEvaluator, ProvisioningExecutor,
    RetryProvisioningTaskExecutor, DEFAULT_MAX_ATTEMPTS,
};
use czechidm_common::{
    Clock, IdmConfiguration, ManualClock, OperationState, ProvisioningEventType,
};
use czechidm_persistence::{
    BreakConfigInfo, MemoryPersistService, ProvisioningOperationInfo, ProvisioningPersistence,
    SystemInfo, SystemPersistence,
};
use czechidm_scheduler::{
    ExecuteOptions, LongRunningTaskManager, TaskEventPublisher, TaskRegistry, TaskRunner,
};

/// Target system which can be switched offline
#[derive(Default)]
struct SwitchableConnector {
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchableConnector {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SwitchableConnector {
    async fn execute(
        &self,
        system: &SystemInfo,
        _operation: &ProvisioningOperationInfo,
    ) -> Result<(), ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable(system.code.clone()));
        }
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryPersistService>,
    clock: Arc<ManualClock>,
    connector: Arc<SwitchableConnector>,
    configs: Arc<ProvisioningBreakConfigService>,
    executor: Arc<ProvisioningExecutor>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryPersistService::new());
    let clock = Arc::new(ManualClock::starting_now());
    let counter = Arc::new(OperationCounterCache::new(clock.clone()));
    let configs = Arc::new(ProvisioningBreakConfigService::new(
        store.clone(),
        Arc::new(IdmConfiguration::default()),
        counter,
    ));
    let evaluator = Arc::new(ProvisioningBreakEvaluator::new(
        store.clone(),
        configs.clone(),
        Arc::new(NotificationLogService::default()),
    ));
    let connector = Arc::new(SwitchableConnector::default());
    let executor = Arc::new(ProvisioningExecutor::new(
        store.clone(),
        evaluator,
        connector.clone(),
        clock.clone(),
    ));
    Fixture {
        store,
        clock,
        connector,
        configs,
        executor,
    }
}

impl Fixture {
    async fn system(&self, code: &str) -> SystemInfo {
        self.store.system_save(&SystemInfo::new(code)).await.unwrap()
    }

    /// Operation created `offset_ms` after the first one, keeps queue order stable
    fn operation(&self, system: &SystemInfo, entity: Uuid, offset_ms: i64) -> ProvisioningOperationInfo {
        let mut operation = ProvisioningOperationInfo::new(
            system.id,
            entity,
            ProvisioningEventType::Update,
            json!({ "mail": "john@example.com" }),
        );
        operation.created = self.clock.now() + TimeDelta::milliseconds(offset_ms);
        operation
    }
}

#[tokio::test]
async fn test_executed_operation_is_archived() {
    let fx = fixture();
    let system = fx.system("archive-system").await;

    let result = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 0))
        .await
        .unwrap();

    assert_eq!(result.state(), OperationState::Executed);
    assert!(result.result.is_code(&PROVISIONING_SUCCEED));
    assert_eq!(result.current_attempt, 1);
    assert!(fx.store.operation_get(result.id).await.unwrap().is_none());

    let archive = fx.store.archive_find_by_system(system.id).await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].id, result.id);
    assert_eq!(archive[0].result.state, OperationState::Executed);
}

#[tokio::test]
async fn test_disabled_system_keeps_operation_queued() {
    let fx = fixture();
    let mut system = SystemInfo::new("disabled-system");
    system.disabled = true;
    let system = fx.store.system_save(&system).await.unwrap();

    let result = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 0))
        .await
        .unwrap();

    assert_eq!(result.state(), OperationState::NotExecuted);
    assert!(result.result.is_code(&PROVISIONING_SYSTEM_DISABLED));
    assert!(fx.store.operation_get(result.id).await.unwrap().is_some());
    assert_eq!(fx.connector.calls(), 0);
}

#[tokio::test]
async fn test_blocked_operation_is_not_dispatched() {
    let fx = fixture();
    let system = fx.system("blocked-system").await;
    let mut config = BreakConfigInfo::new(system.id, ProvisioningEventType::Update);
    config.period = Some(60_000);
    config.disable_limit = Some(2);
    fx.configs.save(&config).await.unwrap();

    let first = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 0))
        .await
        .unwrap();
    assert_eq!(first.state(), OperationState::Executed);

    let second = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 1))
        .await
        .unwrap();
    assert_eq!(second.state(), OperationState::Blocked);
    assert!(second.result.is_code(&PROVISIONING_SYSTEM_BLOCKED));

    let third = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 2))
        .await
        .unwrap();
    assert_eq!(third.state(), OperationState::Blocked);
    assert_eq!(fx.connector.calls(), 1);
}

#[tokio::test]
async fn test_failed_operation_is_retried_later() {
    let fx = fixture();
    let system = fx.system("failing-system").await;
    let entity = Uuid::new_v4();
    fx.connector.set_offline(true);

    let failed = fx
        .executor
        .execute(fx.operation(&system, entity, 0))
        .await
        .unwrap();
    assert_eq!(failed.state(), OperationState::Exception);
    assert!(failed.result.is_code(&PROVISIONING_FAILED));
    assert!(failed.result.cause.is_some());
    assert_eq!(failed.max_attempts, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(
        failed.next_attempt,
        Some(fx.clock.now() + TimeDelta::minutes(2))
    );

    // newer operation waits for the failed one
    let queued = fx
        .executor
        .execute(fx.operation(&system, entity, 1))
        .await
        .unwrap();
    assert_eq!(queued.state(), OperationState::NotExecuted);
    assert!(queued.result.is_code(&PROVISIONING_IS_IN_QUEUE));
    assert_eq!(queued.result.model.as_ref().unwrap().parameters["count"], "1");
    assert_eq!(fx.connector.calls(), 1);

    let batch_id = failed.batch_id.unwrap();
    let batch = fx.executor.batches().get(batch_id).await.unwrap().unwrap();
    assert_eq!(batch.next_attempt, failed.next_attempt);

    fx.connector.set_offline(false);
    let processed = fx.executor.execute_batch(batch_id).await.unwrap();
    assert_eq!(processed.len(), 2);
    assert!(processed.iter().all(|o| o.state() == OperationState::Executed));
    assert!(fx.executor.batches().operations(batch_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_back_off_and_exhausted_attempts() {
    let fx = fixture();
    let system = fx.system("exhausted-system").await;
    fx.connector.set_offline(true);

    let mut operation = fx.operation(&system, Uuid::new_v4(), 0);
    operation.max_attempts = 3;
    let first = fx.executor.execute(operation).await.unwrap();
    assert_eq!(first.next_attempt, Some(fx.clock.now() + TimeDelta::minutes(2)));

    let second = fx.executor.retry(first.id).await.unwrap();
    assert_eq!(second.current_attempt, 2);
    assert_eq!(second.next_attempt, Some(fx.clock.now() + TimeDelta::minutes(5)));

    let third = fx.executor.retry(first.id).await.unwrap();
    assert_eq!(third.state(), OperationState::Exception);
    assert_eq!(third.next_attempt, None);
    assert!(fx.store.operation_get(first.id).await.unwrap().is_none());

    let archive = fx.store.archive_find_by_system(system.id).await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].attempts, 3);
}

#[tokio::test]
async fn test_cancel_moves_operation_to_archive() {
    let fx = fixture();
    let system = fx.system("cancel-system").await;
    fx.connector.set_offline(true);

    let failed = fx
        .executor
        .execute(fx.operation(&system, Uuid::new_v4(), 0))
        .await
        .unwrap();
    let canceled = fx.executor.cancel(failed.id).await.unwrap();

    assert_eq!(canceled.state(), OperationState::Canceled);
    assert!(fx.store.operation_get(failed.id).await.unwrap().is_none());
    let batch = fx
        .executor
        .batches()
        .get(failed.batch_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.next_attempt, None);
}

#[tokio::test]
async fn test_retry_task_processes_due_batches() {
    let fx = fixture();
    let system = fx.system("retry-task-system").await;
    fx.connector.set_offline(true);

    let mut failed = Vec::new();
    for i in 0..3 {
        failed.push(
            fx.executor
                .execute(fx.operation(&system, Uuid::new_v4(), i))
                .await
                .unwrap(),
        );
    }
    assert!(failed.iter().all(|o| o.state() == OperationState::Exception));

    let runner = Arc::new(TaskRunner::new(fx.store.clone(), TaskEventPublisher::default()));
    let manager = LongRunningTaskManager::new("idm-test", runner, Arc::new(TaskRegistry::new()));
    let task = Arc::new(RetryProvisioningTaskExecutor::new(
        fx.store.clone(),
        fx.executor.clone(),
        fx.clock.clone(),
    ));

    // nothing is due yet
    let ended = manager
        .execute_sync(task.clone(), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(ended.state(), OperationState::Executed);
    assert_eq!(ended.count, Some(0));

    fx.connector.set_offline(false);
    fx.clock.advance(Duration::from_secs(3 * 60));
    let ended = manager
        .execute_sync(task, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(ended.count, Some(3));
    assert_eq!(ended.counter, Some(3));

    for operation in failed {
        assert!(fx.store.operation_get(operation.id).await.unwrap().is_none());
    }
    assert_eq!(fx.store.archive_find_by_system(system.id).await.unwrap().len(), 3);
}
