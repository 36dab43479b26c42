// Long running task retrying failed provisioning batches

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use czechidm_common::{Clock, IdmResult, OperationResult, OperationState};
use czechidm_persistence::{PageRequest, PersistenceService};
use czechidm_scheduler::{TaskContext, TaskExecutor};

use crate::dispatch::ProvisioningExecutor;

pub const RETRY_PROVISIONING_TASK_TYPE: &str = "retry-provisioning";

const RETRY_PAGE_SIZE: u64 = 100;

pub struct RetryProvisioningTaskExecutor {
    store: Arc<dyn PersistenceService>,
    provisioning: Arc<ProvisioningExecutor>,
    clock: Arc<dyn Clock>,
}

impl RetryProvisioningTaskExecutor {
    pub fn new(
        store: Arc<dyn PersistenceService>,
        provisioning: Arc<ProvisioningExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provisioning,
            clock,
        }
    }

    /// Batches due at this moment
    ///
    /// Collected up front, retried batches change their next attempt and would
    /// shift later pages.
    async fn due_batches(&self) -> IdmResult<Vec<Uuid>> {
        let now = self.clock.now();
        let mut page = PageRequest::first(RETRY_PAGE_SIZE);
        let mut batch_ids = Vec::new();
        loop {
            let result = self.store.batch_find_for_retry(now, page).await?;
            batch_ids.extend(result.page_items.iter().map(|batch| batch.id));
            if !result.has_next() {
                break;
            }
            page = page.next();
        }
        Ok(batch_ids)
    }
}

#[async_trait]
impl TaskExecutor for RetryProvisioningTaskExecutor {
    fn name(&self) -> &str {
        RETRY_PROVISIONING_TASK_TYPE
    }

    fn description(&self) -> Option<String> {
        Some("Retry provisioning operations which failed on the target system".to_string())
    }

    fn is_concurrent(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &TaskContext) -> IdmResult<Option<OperationResult>> {
        let batch_ids = self.due_batches().await?;
        ctx.set_count(Some(batch_ids.len() as i64));
        ctx.set_counter(Some(0));
        info!(batches = batch_ids.len(), "Retrying provisioning batches");

        for batch_id in batch_ids {
            if let Err(e) = self.provisioning.execute_batch(batch_id).await {
                warn!(batch_id = %batch_id, error = %e, "Provisioning batch retry failed");
            }
            ctx.increment_counter();
            if !ctx.update_state().await? {
                break;
            }
        }

        Ok(Some(OperationResult::new(OperationState::Executed)))
    }
}
