// Provisioning batches: one active batch per system entity

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use czechidm_common::{IdmResult, OperationState};
use czechidm_persistence::{PersistenceService, ProvisioningBatchInfo, ProvisioningOperationInfo};

#[derive(Clone)]
pub struct ProvisioningBatchService {
    store: Arc<dyn PersistenceService>,
}

impl ProvisioningBatchService {
    pub fn new(store: Arc<dyn PersistenceService>) -> Self {
        Self { store }
    }

    /// Batch of the system entity, created when missing
    ///
    /// Duplicate batches are merged into the oldest one.
    pub async fn find_or_create(
        &self,
        system_id: Uuid,
        system_entity_id: Uuid,
    ) -> IdmResult<ProvisioningBatchInfo> {
        let mut batches = self.store.batch_find_by_system_entity(system_entity_id).await?;
        if batches.is_empty() {
            let batch = ProvisioningBatchInfo::new(system_id, system_entity_id);
            return Ok(self.store.batch_save(&batch).await?);
        }

        let batch = batches.remove(0);
        for duplicate in batches {
            self.merge(&batch, &duplicate).await?;
        }
        Ok(batch)
    }

    /// Move operations of `source` into `target` and delete `source`
    async fn merge(
        &self,
        target: &ProvisioningBatchInfo,
        source: &ProvisioningBatchInfo,
    ) -> IdmResult<()> {
        for mut operation in self.store.operation_find_by_batch(source.id).await? {
            operation.batch_id = Some(target.id);
            self.store.operation_save(&operation).await?;
        }
        self.store.batch_delete(source.id).await?;
        debug!(target = %target.id, source = %source.id, "Provisioning batches merged");
        Ok(())
    }

    pub async fn get(&self, batch_id: Uuid) -> IdmResult<Option<ProvisioningBatchInfo>> {
        Ok(self.store.batch_get(batch_id).await?)
    }

    /// Active operations of the batch, oldest first
    pub async fn operations(&self, batch_id: Uuid) -> IdmResult<Vec<ProvisioningOperationInfo>> {
        Ok(self.store.operation_find_by_batch(batch_id).await?)
    }

    /// Set the next attempt of the batch from its oldest operation
    ///
    /// Only a failed head of the batch is retried; queued operations follow
    /// once it succeeds.
    pub async fn refresh_next_attempt(&self, batch_id: Uuid) -> IdmResult<()> {
        let Some(mut batch) = self.store.batch_get(batch_id).await? else {
            return Ok(());
        };
        let operations = self.operations(batch_id).await?;
        batch.next_attempt = operations
            .first()
            .filter(|head| head.state() == OperationState::Exception)
            .and_then(|head| head.next_attempt);
        self.store.batch_save(&batch).await?;
        Ok(())
    }
}
