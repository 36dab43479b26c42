// Referential integrity of provisioning break recipients

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use czechidm_common::IdmResult;
use czechidm_persistence::PersistenceService;

/// Deletes identities and roles together with the break recipients pointing to them
pub struct ReferentialIntegrity {
    store: Arc<dyn PersistenceService>,
}

impl ReferentialIntegrity {
    pub fn new(store: Arc<dyn PersistenceService>) -> Self {
        Self { store }
    }

    pub async fn delete_identity(&self, identity_id: Uuid) -> IdmResult<bool> {
        for recipient in self.store.break_recipient_find_by_identity(identity_id).await? {
            self.store.break_recipient_delete(recipient.id).await?;
            debug!(recipient_id = %recipient.id, identity_id = %identity_id, "Break recipient removed with identity");
        }
        Ok(self.store.identity_delete(identity_id).await?)
    }

    pub async fn delete_role(&self, role_id: Uuid) -> IdmResult<bool> {
        for recipient in self.store.break_recipient_find_by_role(role_id).await? {
            self.store.break_recipient_delete(recipient.id).await?;
            debug!(recipient_id = %recipient.id, role_id = %role_id, "Break recipient removed with role");
        }
        Ok(self.store.role_delete(role_id).await?)
    }
}
