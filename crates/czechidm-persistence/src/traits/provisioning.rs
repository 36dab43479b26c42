//! Provisioning queue persistence trait
//!
//! Operations, their batches and the archive of finished operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{
    Page, PageRequest, ProvisioningArchiveInfo, ProvisioningBatchInfo, ProvisioningOperationInfo,
};

#[async_trait]
pub trait ProvisioningPersistence: Send + Sync {
    async fn operation_get(&self, id: Uuid) -> anyhow::Result<Option<ProvisioningOperationInfo>>;

    async fn operation_save(
        &self,
        operation: &ProvisioningOperationInfo,
    ) -> anyhow::Result<ProvisioningOperationInfo>;

    async fn operation_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Operations of the batch ordered by creation
    async fn operation_find_by_batch(
        &self,
        batch_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningOperationInfo>>;

    async fn operation_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningOperationInfo>>;

    async fn batch_get(&self, id: Uuid) -> anyhow::Result<Option<ProvisioningBatchInfo>>;

    /// Batches of the system entity ordered by creation
    async fn batch_find_by_system_entity(
        &self,
        system_entity_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningBatchInfo>>;

    async fn batch_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningBatchInfo>>;

    /// Batches with `next_attempt <= now`, ordered by `next_attempt`
    async fn batch_find_for_retry(
        &self,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> anyhow::Result<Page<ProvisioningBatchInfo>>;

    async fn batch_save(
        &self,
        batch: &ProvisioningBatchInfo,
    ) -> anyhow::Result<ProvisioningBatchInfo>;

    async fn batch_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn archive_save(
        &self,
        archive: &ProvisioningArchiveInfo,
    ) -> anyhow::Result<ProvisioningArchiveInfo>;

    async fn archive_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningArchiveInfo>>;
}
