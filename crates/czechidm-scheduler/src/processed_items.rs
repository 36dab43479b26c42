//! Processed item queue and log
//!
//! Queue entries belong to a scheduled task and let a stateful task skip
//! items that were already processed by a previous run. Log entries belong to
//! one task run and record each item's result.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use czechidm_common::{IdmResult, OperationResult};
use czechidm_persistence::{ProcessedItemKind, ProcessedTaskItemInfo, TaskPersistence};

#[derive(Clone)]
pub struct ProcessedItemsService {
    store: Arc<dyn TaskPersistence>,
}

impl ProcessedItemsService {
    pub fn new(store: Arc<dyn TaskPersistence>) -> Self {
        Self { store }
    }

    /// Add the item to the queue of the scheduled task, unless it is already there
    pub async fn enqueue(
        &self,
        scheduled_task_id: Uuid,
        entity_id: Uuid,
        dto_type: &str,
        result: &OperationResult,
    ) -> IdmResult<ProcessedTaskItemInfo> {
        if let Some(existing) = self
            .find_queue(scheduled_task_id)
            .await?
            .into_iter()
            .find(|item| item.referenced_entity_id == entity_id)
        {
            return Ok(existing);
        }

        let item = ProcessedTaskItemInfo {
            id: Uuid::new_v4(),
            kind: ProcessedItemKind::Queue,
            scheduled_task_id: Some(scheduled_task_id),
            long_running_task_id: None,
            referenced_entity_id: entity_id,
            referenced_dto_type: dto_type.to_string(),
            operation_result: result.clone(),
            created: Utc::now(),
        };
        Ok(self.store.processed_item_save(&item).await?)
    }

    pub async fn is_in_queue(&self, scheduled_task_id: Uuid, entity_id: Uuid) -> IdmResult<bool> {
        Ok(self
            .find_queue(scheduled_task_id)
            .await?
            .iter()
            .any(|item| item.referenced_entity_id == entity_id))
    }

    pub async fn find_queue(&self, scheduled_task_id: Uuid) -> IdmResult<Vec<ProcessedTaskItemInfo>> {
        Ok(self.store.processed_item_find_queue(scheduled_task_id).await?)
    }

    pub async fn remove_from_queue(&self, scheduled_task_id: Uuid, entity_id: Uuid) -> IdmResult<u64> {
        let removed = self
            .store
            .processed_item_delete_by_reference(ProcessedItemKind::Queue, scheduled_task_id, entity_id)
            .await?;
        debug!(scheduled_task_id = %scheduled_task_id, entity_id = %entity_id, removed, "Removed item from processed queue");
        Ok(removed)
    }

    /// Record the result of one item within a task run
    pub async fn log_item(
        &self,
        long_running_task_id: Uuid,
        entity_id: Uuid,
        dto_type: &str,
        result: &OperationResult,
    ) -> IdmResult<ProcessedTaskItemInfo> {
        let item = ProcessedTaskItemInfo {
            id: Uuid::new_v4(),
            kind: ProcessedItemKind::Log,
            scheduled_task_id: None,
            long_running_task_id: Some(long_running_task_id),
            referenced_entity_id: entity_id,
            referenced_dto_type: dto_type.to_string(),
            operation_result: result.clone(),
            created: Utc::now(),
        };
        Ok(self.store.processed_item_save(&item).await?)
    }

    pub async fn find_log(&self, long_running_task_id: Uuid) -> IdmResult<Vec<ProcessedTaskItemInfo>> {
        Ok(self.store.processed_item_find_log(long_running_task_id).await?)
    }

    pub async fn delete_by_scheduled_task(&self, scheduled_task_id: Uuid) -> IdmResult<u64> {
        Ok(self
            .store
            .processed_item_delete_by_scheduled_task(scheduled_task_id)
            .await?)
    }
}
