// Target system administration: blocked operation flags and cascading delete

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use czechidm_common::error::NOT_FOUND;
use czechidm_common::{IdmResult, ProvisioningEventType};
use czechidm_persistence::{PersistenceService, SystemInfo};

use crate::break_config::ProvisioningBreakConfigService;

pub struct SystemService {
    store: Arc<dyn PersistenceService>,
    configs: Arc<ProvisioningBreakConfigService>,
}

impl SystemService {
    pub fn new(store: Arc<dyn PersistenceService>, configs: Arc<ProvisioningBreakConfigService>) -> Self {
        Self { store, configs }
    }

    pub async fn get(&self, id: Uuid) -> IdmResult<Option<SystemInfo>> {
        Ok(self.store.system_get(id).await?)
    }

    pub async fn find_by_code(&self, code: &str) -> IdmResult<Option<SystemInfo>> {
        Ok(self.store.system_find_by_code(code).await?)
    }

    /// Save the system
    ///
    /// Unblocking an operation type starts its provisioning break window from
    /// zero.
    pub async fn save(&self, system: &SystemInfo) -> IdmResult<SystemInfo> {
        if let Some(previous) = self.store.system_get(system.id).await? {
            for operation_type in ProvisioningEventType::ALL {
                if previous.blocked_operation.is_blocked(operation_type)
                    && !system.blocked_operation.is_blocked(operation_type)
                {
                    info!(system = %system.code, operation = %operation_type, "Operation unblocked on system");
                    self.configs.clear_cache(system.id, operation_type);
                }
            }
        }
        Ok(self.store.system_save(system).await?)
    }

    pub async fn block(&self, system_id: Uuid, operation_type: ProvisioningEventType) -> IdmResult<SystemInfo> {
        self.set_blocked(system_id, operation_type, true).await
    }

    pub async fn unblock(&self, system_id: Uuid, operation_type: ProvisioningEventType) -> IdmResult<SystemInfo> {
        self.set_blocked(system_id, operation_type, false).await
    }

    async fn set_blocked(
        &self,
        system_id: Uuid,
        operation_type: ProvisioningEventType,
        blocked: bool,
    ) -> IdmResult<SystemInfo> {
        let mut system = self
            .store
            .system_get(system_id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", system_id)]))?;
        system.blocked_operation.set_blocked(operation_type, blocked);
        self.save(&system).await
    }

    /// Delete the system with its break configurations and queued operations
    pub async fn delete(&self, id: Uuid) -> IdmResult<bool> {
        for config in self.configs.find_by_system(id).await? {
            self.configs.delete(config.id).await?;
        }
        for operation in self.store.operation_find_by_system(id).await? {
            self.store.operation_delete(operation.id).await?;
        }
        for batch in self.store.batch_find_by_system(id).await? {
            self.store.batch_delete(batch.id).await?;
        }
        self.configs.counter().clear_system(id);

        let deleted = self.store.system_delete(id).await?;
        info!(system_id = %id, deleted, "System deleted");
        Ok(deleted)
    }
}
