// In-memory persistence backend using DashMap
// Provides single-process storage for tests, demos and embedded deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use czechidm_common::{OperationResult, ProvisioningEventType};

use crate::model::{
    BreakConfigInfo, BreakRecipientInfo, IdentityInfo, IdentityRoleInfo, LongRunningTaskFilter,
    LongRunningTaskInfo, Page, PageRequest, ProcessedItemKind, ProcessedTaskItemInfo,
    ProvisioningArchiveInfo, ProvisioningBatchInfo, ProvisioningOperationInfo, RoleInfo,
    ScheduledTaskInfo, SystemInfo,
};
use crate::traits::PersistenceService;
use crate::traits::break_config::BreakConfigPersistence;
use crate::traits::identity::IdentityPersistence;
use crate::traits::provisioning::ProvisioningPersistence;
use crate::traits::system::SystemPersistence;
use crate::traits::task::TaskPersistence;

/// In-memory persistence, one concurrent map per table
#[derive(Default)]
pub struct MemoryPersistService {
    systems: DashMap<Uuid, SystemInfo>,
    break_configs: DashMap<Uuid, BreakConfigInfo>,
    break_recipients: DashMap<Uuid, BreakRecipientInfo>,
    identities: DashMap<Uuid, IdentityInfo>,
    roles: DashMap<Uuid, RoleInfo>,
    identity_roles: DashMap<Uuid, IdentityRoleInfo>,
    operations: DashMap<Uuid, ProvisioningOperationInfo>,
    batches: DashMap<Uuid, ProvisioningBatchInfo>,
    archive: DashMap<Uuid, ProvisioningArchiveInfo>,
    tasks: DashMap<Uuid, LongRunningTaskInfo>,
    processed_items: DashMap<Uuid, ProcessedTaskItemInfo>,
    scheduled_tasks: DashMap<Uuid, ScheduledTaskInfo>,
}

impl MemoryPersistService {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Clone all values matching the predicate
fn collect<T: Clone>(map: &DashMap<Uuid, T>, predicate: impl Fn(&T) -> bool) -> Vec<T> {
    map.iter()
        .filter(|entry| predicate(entry.value()))
        .map(|entry| entry.value().clone())
        .collect()
}

#[async_trait]
impl SystemPersistence for MemoryPersistService {
    async fn system_get(&self, id: Uuid) -> anyhow::Result<Option<SystemInfo>> {
        Ok(self.systems.get(&id).map(|e| e.value().clone()))
    }

    async fn system_find_by_code(&self, code: &str) -> anyhow::Result<Option<SystemInfo>> {
        Ok(collect(&self.systems, |s| s.code == code).into_iter().next())
    }

    async fn system_find_all(&self) -> anyhow::Result<Vec<SystemInfo>> {
        let mut systems = collect(&self.systems, |_| true);
        systems.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(systems)
    }

    async fn system_save(&self, system: &SystemInfo) -> anyhow::Result<SystemInfo> {
        self.systems.insert(system.id, system.clone());
        Ok(system.clone())
    }

    async fn system_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.systems.remove(&id).is_some())
    }
}

#[async_trait]
impl BreakConfigPersistence for MemoryPersistService {
    async fn break_config_get(&self, id: Uuid) -> anyhow::Result<Option<BreakConfigInfo>> {
        Ok(self.break_configs.get(&id).map(|e| e.value().clone()))
    }

    async fn break_config_find(
        &self,
        system_id: Uuid,
        operation_type: ProvisioningEventType,
    ) -> anyhow::Result<Vec<BreakConfigInfo>> {
        Ok(collect(&self.break_configs, |c| {
            c.system_id == Some(system_id) && c.operation_type == operation_type
        }))
    }

    async fn break_config_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<BreakConfigInfo>> {
        Ok(collect(&self.break_configs, |c| c.system_id == Some(system_id)))
    }

    async fn break_config_save(&self, config: &BreakConfigInfo) -> anyhow::Result<BreakConfigInfo> {
        self.break_configs.insert(config.id, config.clone());
        Ok(config.clone())
    }

    async fn break_config_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.break_configs.remove(&id).is_some())
    }

    async fn break_recipient_get(&self, id: Uuid) -> anyhow::Result<Option<BreakRecipientInfo>> {
        Ok(self.break_recipients.get(&id).map(|e| e.value().clone()))
    }

    async fn break_recipient_find_by_config(
        &self,
        break_config_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>> {
        Ok(collect(&self.break_recipients, |r| {
            r.break_config_id == break_config_id
        }))
    }

    async fn break_recipient_find_by_identity(
        &self,
        identity_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>> {
        Ok(collect(&self.break_recipients, |r| {
            r.identity_id == Some(identity_id)
        }))
    }

    async fn break_recipient_find_by_role(
        &self,
        role_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>> {
        Ok(collect(&self.break_recipients, |r| r.role_id == Some(role_id)))
    }

    async fn break_recipient_save(
        &self,
        recipient: &BreakRecipientInfo,
    ) -> anyhow::Result<BreakRecipientInfo> {
        self.break_recipients.insert(recipient.id, recipient.clone());
        Ok(recipient.clone())
    }

    async fn break_recipient_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.break_recipients.remove(&id).is_some())
    }
}

#[async_trait]
impl IdentityPersistence for MemoryPersistService {
    async fn identity_get(&self, id: Uuid) -> anyhow::Result<Option<IdentityInfo>> {
        Ok(self.identities.get(&id).map(|e| e.value().clone()))
    }

    async fn identity_find_by_username(
        &self,
        username: &str,
    ) -> anyhow::Result<Option<IdentityInfo>> {
        Ok(collect(&self.identities, |i| i.username == username)
            .into_iter()
            .next())
    }

    async fn identity_save(&self, identity: &IdentityInfo) -> anyhow::Result<IdentityInfo> {
        self.identities.insert(identity.id, identity.clone());
        Ok(identity.clone())
    }

    async fn identity_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.identity_roles.retain(|_, ir| ir.identity_id != id);
        Ok(self.identities.remove(&id).is_some())
    }

    async fn role_get(&self, id: Uuid) -> anyhow::Result<Option<RoleInfo>> {
        Ok(self.roles.get(&id).map(|e| e.value().clone()))
    }

    async fn role_find_by_base_code(&self, base_code: &str) -> anyhow::Result<Option<RoleInfo>> {
        Ok(collect(&self.roles, |r| r.base_code == base_code)
            .into_iter()
            .next())
    }

    async fn role_save(&self, role: &RoleInfo) -> anyhow::Result<RoleInfo> {
        self.roles.insert(role.id, role.clone());
        Ok(role.clone())
    }

    async fn role_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.identity_roles.retain(|_, ir| ir.role_id != id);
        Ok(self.roles.remove(&id).is_some())
    }

    async fn identity_role_save(
        &self,
        identity_role: &IdentityRoleInfo,
    ) -> anyhow::Result<IdentityRoleInfo> {
        self.identity_roles
            .insert(identity_role.id, identity_role.clone());
        Ok(identity_role.clone())
    }

    async fn identity_find_by_role(&self, role_id: Uuid) -> anyhow::Result<Vec<IdentityInfo>> {
        let identity_ids: Vec<Uuid> = self
            .identity_roles
            .iter()
            .filter(|e| e.value().role_id == role_id)
            .map(|e| e.value().identity_id)
            .collect();

        let mut identities: Vec<IdentityInfo> = identity_ids
            .into_iter()
            .filter_map(|id| self.identities.get(&id).map(|e| e.value().clone()))
            .collect();
        identities.sort_by(|a, b| a.username.cmp(&b.username));
        identities.dedup_by(|a, b| a.id == b.id);
        Ok(identities)
    }
}

#[async_trait]
impl ProvisioningPersistence for MemoryPersistService {
    async fn operation_get(&self, id: Uuid) -> anyhow::Result<Option<ProvisioningOperationInfo>> {
        Ok(self.operations.get(&id).map(|e| e.value().clone()))
    }

    async fn operation_save(
        &self,
        operation: &ProvisioningOperationInfo,
    ) -> anyhow::Result<ProvisioningOperationInfo> {
        self.operations.insert(operation.id, operation.clone());
        Ok(operation.clone())
    }

    async fn operation_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.operations.remove(&id).is_some())
    }

    async fn operation_find_by_batch(
        &self,
        batch_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningOperationInfo>> {
        let mut operations = collect(&self.operations, |o| o.batch_id == Some(batch_id));
        operations.sort_by_key(|o| (o.created, o.id));
        Ok(operations)
    }

    async fn operation_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningOperationInfo>> {
        let mut operations = collect(&self.operations, |o| o.system_id == system_id);
        operations.sort_by_key(|o| o.created);
        Ok(operations)
    }

    async fn batch_get(&self, id: Uuid) -> anyhow::Result<Option<ProvisioningBatchInfo>> {
        Ok(self.batches.get(&id).map(|e| e.value().clone()))
    }

    async fn batch_find_by_system_entity(
        &self,
        system_entity_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningBatchInfo>> {
        let mut batches = collect(&self.batches, |b| b.system_entity_id == system_entity_id);
        batches.sort_by_key(|b| b.created);
        Ok(batches)
    }

    async fn batch_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningBatchInfo>> {
        let mut batches = collect(&self.batches, |b| b.system_id == system_id);
        batches.sort_by_key(|b| b.created);
        Ok(batches)
    }

    async fn batch_find_for_retry(
        &self,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> anyhow::Result<Page<ProvisioningBatchInfo>> {
        let mut batches = collect(&self.batches, |b| {
            b.next_attempt.is_some_and(|next| next <= now)
        });
        batches.sort_by_key(|b| (b.next_attempt, b.created));
        Ok(Page::of(batches, page))
    }

    async fn batch_save(
        &self,
        batch: &ProvisioningBatchInfo,
    ) -> anyhow::Result<ProvisioningBatchInfo> {
        self.batches.insert(batch.id, batch.clone());
        Ok(batch.clone())
    }

    async fn batch_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.batches.remove(&id).is_some())
    }

    async fn archive_save(
        &self,
        archive: &ProvisioningArchiveInfo,
    ) -> anyhow::Result<ProvisioningArchiveInfo> {
        self.archive.insert(archive.id, archive.clone());
        Ok(archive.clone())
    }

    async fn archive_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<ProvisioningArchiveInfo>> {
        let mut archived = collect(&self.archive, |a| a.system_id == system_id);
        archived.sort_by_key(|a| a.archived);
        Ok(archived)
    }
}

#[async_trait]
impl TaskPersistence for MemoryPersistService {
    async fn task_get(&self, id: Uuid) -> anyhow::Result<Option<LongRunningTaskInfo>> {
        Ok(self.tasks.get(&id).map(|e| e.value().clone()))
    }

    async fn task_save(&self, task: &LongRunningTaskInfo) -> anyhow::Result<LongRunningTaskInfo> {
        self.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn task_update_progress(
        &self,
        id: Uuid,
        count: Option<i64>,
        counter: Option<i64>,
    ) -> anyhow::Result<Option<LongRunningTaskInfo>> {
        Ok(self.tasks.get_mut(&id).map(|mut entry| {
            let task = entry.value_mut();
            task.count = count;
            task.counter = counter;
            task.clone()
        }))
    }

    async fn task_finish(
        &self,
        id: Uuid,
        count: Option<i64>,
        counter: Option<i64>,
        result: OperationResult,
    ) -> anyhow::Result<Option<LongRunningTaskInfo>> {
        Ok(self.tasks.get_mut(&id).map(|mut entry| {
            let task = entry.value_mut();
            task.count = count;
            task.counter = counter;
            task.running = false;
            if task.state().is_runnable() {
                task.result = result;
            }
            task.clone()
        }))
    }

    async fn task_find(
        &self,
        filter: &LongRunningTaskFilter,
    ) -> anyhow::Result<Vec<LongRunningTaskInfo>> {
        let mut tasks = collect(&self.tasks, |t| {
            filter
                .task_type
                .as_ref()
                .is_none_or(|task_type| &t.task_type == task_type)
                && filter.running.is_none_or(|running| t.running == running)
                && filter.state.is_none_or(|state| t.state() == state)
                && filter
                    .instance_id
                    .as_ref()
                    .is_none_or(|instance_id| &t.instance_id == instance_id)
        });
        tasks.sort_by_key(|t| t.created);
        Ok(tasks)
    }

    async fn task_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.tasks.remove(&id).is_some())
    }

    async fn processed_item_save(
        &self,
        item: &ProcessedTaskItemInfo,
    ) -> anyhow::Result<ProcessedTaskItemInfo> {
        self.processed_items.insert(item.id, item.clone());
        Ok(item.clone())
    }

    async fn processed_item_find_queue(
        &self,
        scheduled_task_id: Uuid,
    ) -> anyhow::Result<Vec<ProcessedTaskItemInfo>> {
        let mut items = collect(&self.processed_items, |i| {
            i.kind == ProcessedItemKind::Queue && i.scheduled_task_id == Some(scheduled_task_id)
        });
        items.sort_by_key(|i| i.created);
        Ok(items)
    }

    async fn processed_item_find_log(
        &self,
        long_running_task_id: Uuid,
    ) -> anyhow::Result<Vec<ProcessedTaskItemInfo>> {
        let mut items = collect(&self.processed_items, |i| {
            i.kind == ProcessedItemKind::Log && i.long_running_task_id == Some(long_running_task_id)
        });
        items.sort_by_key(|i| i.created);
        Ok(items)
    }

    async fn processed_item_delete_by_reference(
        &self,
        kind: ProcessedItemKind,
        scheduled_task_id: Uuid,
        referenced_entity_id: Uuid,
    ) -> anyhow::Result<u64> {
        let before = self.processed_items.len();
        self.processed_items.retain(|_, i| {
            !(i.kind == kind
                && i.scheduled_task_id == Some(scheduled_task_id)
                && i.referenced_entity_id == referenced_entity_id)
        });
        Ok(before.saturating_sub(self.processed_items.len()) as u64)
    }

    async fn processed_item_delete_by_scheduled_task(
        &self,
        scheduled_task_id: Uuid,
    ) -> anyhow::Result<u64> {
        let before = self.processed_items.len();
        self.processed_items
            .retain(|_, i| i.scheduled_task_id != Some(scheduled_task_id));
        Ok(before.saturating_sub(self.processed_items.len()) as u64)
    }

    async fn scheduled_task_get(&self, id: Uuid) -> anyhow::Result<Option<ScheduledTaskInfo>> {
        Ok(self.scheduled_tasks.get(&id).map(|e| e.value().clone()))
    }

    async fn scheduled_task_save(
        &self,
        task: &ScheduledTaskInfo,
    ) -> anyhow::Result<ScheduledTaskInfo> {
        self.scheduled_tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn scheduled_task_find_all(&self) -> anyhow::Result<Vec<ScheduledTaskInfo>> {
        let mut tasks = collect(&self.scheduled_tasks, |_| true);
        tasks.sort_by_key(|t| t.created);
        Ok(tasks)
    }

    async fn scheduled_task_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.scheduled_tasks.remove(&id).is_some())
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistService {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
