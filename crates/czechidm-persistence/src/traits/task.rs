//! Long running task persistence trait
//!
//! Task records, processed items and scheduled tasks.

use async_trait::async_trait;
use uuid::Uuid;

use czechidm_common::OperationResult;

use crate::model::{
    LongRunningTaskFilter, LongRunningTaskInfo, ProcessedItemKind, ProcessedTaskItemInfo,
    ScheduledTaskInfo,
};

#[async_trait]
pub trait TaskPersistence: Send + Sync {
    async fn task_get(&self, id: Uuid) -> anyhow::Result<Option<LongRunningTaskInfo>>;

    async fn task_save(&self, task: &LongRunningTaskInfo) -> anyhow::Result<LongRunningTaskInfo>;

    /// Store progress counters only, leaving the result state untouched
    ///
    /// Returns the record as stored after the update, `None` when missing.
    async fn task_update_progress(
        &self,
        id: Uuid,
        count: Option<i64>,
        counter: Option<i64>,
    ) -> anyhow::Result<Option<LongRunningTaskInfo>>;

    /// Clear the running flag and store the final progress
    ///
    /// `result` replaces the stored one only while the stored state is still
    /// runnable, so a cancel persisted meanwhile wins.
    async fn task_finish(
        &self,
        id: Uuid,
        count: Option<i64>,
        counter: Option<i64>,
        result: OperationResult,
    ) -> anyhow::Result<Option<LongRunningTaskInfo>>;

    /// Tasks matching the filter, oldest first
    async fn task_find(
        &self,
        filter: &LongRunningTaskFilter,
    ) -> anyhow::Result<Vec<LongRunningTaskInfo>>;

    async fn task_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn processed_item_save(
        &self,
        item: &ProcessedTaskItemInfo,
    ) -> anyhow::Result<ProcessedTaskItemInfo>;

    /// Queue entries of a scheduled task
    async fn processed_item_find_queue(
        &self,
        scheduled_task_id: Uuid,
    ) -> anyhow::Result<Vec<ProcessedTaskItemInfo>>;

    /// Log entries of one task run
    async fn processed_item_find_log(
        &self,
        long_running_task_id: Uuid,
    ) -> anyhow::Result<Vec<ProcessedTaskItemInfo>>;

    /// Delete entries of the given kind owned by the scheduled task and referencing the entity
    async fn processed_item_delete_by_reference(
        &self,
        kind: ProcessedItemKind,
        scheduled_task_id: Uuid,
        referenced_entity_id: Uuid,
    ) -> anyhow::Result<u64>;

    async fn processed_item_delete_by_scheduled_task(
        &self,
        scheduled_task_id: Uuid,
    ) -> anyhow::Result<u64>;

    async fn scheduled_task_get(&self, id: Uuid) -> anyhow::Result<Option<ScheduledTaskInfo>>;

    async fn scheduled_task_save(
        &self,
        task: &ScheduledTaskInfo,
    ) -> anyhow::Result<ScheduledTaskInfo>;

    async fn scheduled_task_find_all(&self) -> anyhow::Result<Vec<ScheduledTaskInfo>>;

    async fn scheduled_task_delete(&self, id: Uuid) -> anyhow::Result<bool>;
}
