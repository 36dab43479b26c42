//! Provisioning dispatch
//!
//! `ProvisioningExecutor` decides for each operation whether it reaches the
//! target system. The operation is always persisted in the batch of its
//! system entity first, so a blocked or queued operation stays visible and
//! can be retried later.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use tracing::{debug, info, warn};
use uuid::Uuid;

use czechidm_common::error::NOT_FOUND;
use czechidm_common::{Clock, IdmResult, OperationResult, OperationState};
use czechidm_persistence::{
    PersistenceService, ProvisioningArchiveInfo, ProvisioningOperationInfo, SystemInfo,
};

use crate::batch::ProvisioningBatchService;
use crate::evaluator::{BreakDecision, ProvisioningBreakEvaluator};
use crate::result_code::{
    PROVISIONING_FAILED, PROVISIONING_IS_IN_QUEUE, PROVISIONING_SUCCEED,
    PROVISIONING_SYSTEM_BLOCKED, PROVISIONING_SYSTEM_DISABLED,
};

/// Delays between attempts of a failed operation, in minutes
pub const RETRY_DELAYS_MINUTES: [i64; 5] = [2, 5, 20, 60, 180];

/// First attempt plus one attempt per retry delay
pub const DEFAULT_MAX_ATTEMPTS: u32 = RETRY_DELAYS_MINUTES.len() as u32 + 1;

#[derive(thiserror::Error, Debug)]
pub enum ConnectorError {
    #[error("target system [{0}] is unavailable")]
    Unavailable(String),

    #[error("operation rejected by target system: {0}")]
    Rejected(String),
}

/// Access to the target system
#[async_trait]
pub trait Connector: Send + Sync {
    async fn execute(
        &self,
        system: &SystemInfo,
        operation: &ProvisioningOperationInfo,
    ) -> Result<(), ConnectorError>;
}

/// Delay before the next attempt after `attempt` failed attempts
pub fn retry_delay(attempt: u32) -> TimeDelta {
    let index = (attempt.max(1) as usize - 1).min(RETRY_DELAYS_MINUTES.len() - 1);
    TimeDelta::minutes(RETRY_DELAYS_MINUTES[index])
}

pub struct ProvisioningExecutor {
    store: Arc<dyn PersistenceService>,
    batches: ProvisioningBatchService,
    evaluator: Arc<ProvisioningBreakEvaluator>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
}

impl ProvisioningExecutor {
    pub fn new(
        store: Arc<dyn PersistenceService>,
        evaluator: Arc<ProvisioningBreakEvaluator>,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            batches: ProvisioningBatchService::new(store.clone()),
            store,
            evaluator,
            connector,
            clock,
        }
    }

    pub fn batches(&self) -> &ProvisioningBatchService {
        &self.batches
    }

    /// Queue the operation and dispatch it when allowed
    pub async fn execute(
        &self,
        mut operation: ProvisioningOperationInfo,
    ) -> IdmResult<ProvisioningOperationInfo> {
        let system = self.system(operation.system_id).await?;
        let batch = self
            .batches
            .find_or_create(operation.system_id, operation.system_entity_id)
            .await?;
        operation.batch_id = Some(batch.id);
        if operation.max_attempts == 0 {
            operation.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        let operation = self.store.operation_save(&operation).await?;
        self.process(&system, operation).await
    }

    /// Dispatch an already queued operation again
    pub async fn retry(&self, operation_id: Uuid) -> IdmResult<ProvisioningOperationInfo> {
        let operation = self
            .store
            .operation_get(operation_id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", operation_id)]))?;
        let system = self.system(operation.system_id).await?;
        self.process(&system, operation).await
    }

    /// Dispatch operations of the batch from the oldest until one is not executed
    pub async fn execute_batch(&self, batch_id: Uuid) -> IdmResult<Vec<ProvisioningOperationInfo>> {
        let mut processed = Vec::new();
        loop {
            let Some(head) = self.batches.operations(batch_id).await?.into_iter().next() else {
                break;
            };
            if processed
                .iter()
                .any(|done: &ProvisioningOperationInfo| done.id == head.id)
            {
                break;
            }
            let system = self.system(head.system_id).await?;
            let result = self.process(&system, head).await?;
            let executed = result.state() == OperationState::Executed;
            processed.push(result);
            if !executed {
                break;
            }
        }
        Ok(processed)
    }

    /// Cancel a queued operation and move it to the archive
    pub async fn cancel(&self, operation_id: Uuid) -> IdmResult<ProvisioningOperationInfo> {
        let mut operation = self
            .store
            .operation_get(operation_id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", operation_id)]))?;
        operation.result = OperationResult::new(OperationState::Canceled);
        operation.next_attempt = None;
        self.archive(&operation).await?;
        info!(operation_id = %operation_id, "Provisioning operation canceled");
        Ok(operation)
    }

    async fn system(&self, system_id: Uuid) -> IdmResult<SystemInfo> {
        self.store
            .system_get(system_id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", system_id)]))
    }

    async fn process(
        &self,
        system: &SystemInfo,
        operation: ProvisioningOperationInfo,
    ) -> IdmResult<ProvisioningOperationInfo> {
        let operation = self.dispatch(system, operation).await?;
        metrics::counter!("idm_provisioning_operation_total", "state" => operation.state().as_str())
            .increment(1);
        Ok(operation)
    }

    async fn dispatch(
        &self,
        system: &SystemInfo,
        mut operation: ProvisioningOperationInfo,
    ) -> IdmResult<ProvisioningOperationInfo> {
        let operation_type = operation.operation_type;
        let entity = operation.system_entity_id.to_string();

        if system.disabled {
            operation.result = OperationResult::with_code(
                OperationState::NotExecuted,
                &PROVISIONING_SYSTEM_DISABLED,
                [("entity", entity.as_str()), ("system", system.code.as_str())],
            );
            return self.finish_queued(operation).await;
        }

        let decision = self.evaluator.evaluate(system, operation_type).await?;
        if decision == BreakDecision::Block {
            operation.result = OperationResult::with_code(
                OperationState::Blocked,
                &PROVISIONING_SYSTEM_BLOCKED,
                [
                    ("operationType", operation_type.to_string()),
                    ("entity", entity.clone()),
                    ("system", system.code.clone()),
                ],
            );
            return self.finish_queued(operation).await;
        }

        if let Some(batch_id) = operation.batch_id {
            let queued = self.batches.operations(batch_id).await?;
            let older = queued.iter().position(|o| o.id == operation.id).unwrap_or(0);
            if older > 0 {
                operation.result = OperationResult::with_code(
                    OperationState::NotExecuted,
                    &PROVISIONING_IS_IN_QUEUE,
                    [
                        ("entity", entity.clone()),
                        ("system", system.code.clone()),
                        ("count", older.to_string()),
                    ],
                );
                return self.finish_queued(operation).await;
            }
        }

        operation.current_attempt += 1;
        match self.connector.execute(system, &operation).await {
            Ok(()) => {
                operation.result = OperationResult::with_code(
                    OperationState::Executed,
                    &PROVISIONING_SUCCEED,
                    [
                        ("operationType", operation_type.to_string()),
                        ("entity", entity),
                        ("system", system.code.clone()),
                    ],
                );
                operation.next_attempt = None;
                debug!(operation_id = %operation.id, system = %system.code, operation = %operation_type, "Provisioning operation executed");
                self.archive(&operation).await?;
            }
            Err(e) => {
                let mut result = OperationResult::with_code(
                    OperationState::Exception,
                    &PROVISIONING_FAILED,
                    [
                        ("operationType", operation_type.to_string()),
                        ("entity", entity),
                        ("system", system.code.clone()),
                        ("cause", e.to_string()),
                    ],
                );
                result.cause = Some(e.to_string());
                operation.result = result;

                if operation.current_attempt < operation.max_attempts {
                    let next = self.clock.now() + retry_delay(operation.current_attempt);
                    operation.next_attempt = Some(next);
                    warn!(operation_id = %operation.id, system = %system.code, attempt = operation.current_attempt, next_attempt = %next, error = %e, "Provisioning operation failed, retry scheduled");
                    return self.finish_queued(operation).await;
                } else {
                    operation.next_attempt = None;
                    warn!(operation_id = %operation.id, system = %system.code, attempt = operation.current_attempt, error = %e, "Provisioning operation failed, no attempts left");
                    self.archive(&operation).await?;
                }
            }
        }
        Ok(operation)
    }

    /// Keep the operation in the queue with its new result
    async fn finish_queued(
        &self,
        operation: ProvisioningOperationInfo,
    ) -> IdmResult<ProvisioningOperationInfo> {
        let operation = self.store.operation_save(&operation).await?;
        if let Some(batch_id) = operation.batch_id {
            self.batches.refresh_next_attempt(batch_id).await?;
        }
        Ok(operation)
    }

    /// Move the operation from the queue to the archive
    async fn archive(&self, operation: &ProvisioningOperationInfo) -> IdmResult<()> {
        self.store
            .archive_save(&ProvisioningArchiveInfo::from_operation(operation, self.clock.now()))
            .await?;
        self.store.operation_delete(operation.id).await?;
        if let Some(batch_id) = operation.batch_id {
            self.batches.refresh_next_attempt(batch_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(1), TimeDelta::minutes(2));
        assert_eq!(retry_delay(2), TimeDelta::minutes(5));
        assert_eq!(retry_delay(5), TimeDelta::minutes(180));
        assert_eq!(retry_delay(9), TimeDelta::minutes(180));
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 6);
    }
}
