//! Provisioning break configuration persistence trait
//!
//! Covers break configurations and their notification recipients.

use async_trait::async_trait;
use uuid::Uuid;

use czechidm_common::ProvisioningEventType;

use crate::model::{BreakConfigInfo, BreakRecipientInfo};

#[async_trait]
pub trait BreakConfigPersistence: Send + Sync {
    async fn break_config_get(&self, id: Uuid) -> anyhow::Result<Option<BreakConfigInfo>>;

    /// All configurations of the system and operation type
    ///
    /// Uniqueness is not enforced by storage, callers resolve duplicates.
    async fn break_config_find(
        &self,
        system_id: Uuid,
        operation_type: ProvisioningEventType,
    ) -> anyhow::Result<Vec<BreakConfigInfo>>;

    async fn break_config_find_by_system(
        &self,
        system_id: Uuid,
    ) -> anyhow::Result<Vec<BreakConfigInfo>>;

    async fn break_config_save(&self, config: &BreakConfigInfo) -> anyhow::Result<BreakConfigInfo>;

    async fn break_config_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn break_recipient_get(&self, id: Uuid) -> anyhow::Result<Option<BreakRecipientInfo>>;

    async fn break_recipient_find_by_config(
        &self,
        break_config_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>>;

    async fn break_recipient_find_by_identity(
        &self,
        identity_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>>;

    async fn break_recipient_find_by_role(
        &self,
        role_id: Uuid,
    ) -> anyhow::Result<Vec<BreakRecipientInfo>>;

    async fn break_recipient_save(
        &self,
        recipient: &BreakRecipientInfo,
    ) -> anyhow::Result<BreakRecipientInfo>;

    async fn break_recipient_delete(&self, id: Uuid) -> anyhow::Result<bool>;
}
