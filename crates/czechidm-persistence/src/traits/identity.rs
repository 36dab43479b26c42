//! Identity and role persistence trait
//!
//! Only the lookups needed by recipient resolution and referential integrity.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{IdentityInfo, IdentityRoleInfo, RoleInfo};

#[async_trait]
pub trait IdentityPersistence: Send + Sync {
    async fn identity_get(&self, id: Uuid) -> anyhow::Result<Option<IdentityInfo>>;

    async fn identity_find_by_username(&self, username: &str)
    -> anyhow::Result<Option<IdentityInfo>>;

    async fn identity_save(&self, identity: &IdentityInfo) -> anyhow::Result<IdentityInfo>;

    /// Delete the identity together with its role assignments
    async fn identity_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn role_get(&self, id: Uuid) -> anyhow::Result<Option<RoleInfo>>;

    async fn role_find_by_base_code(&self, base_code: &str) -> anyhow::Result<Option<RoleInfo>>;

    async fn role_save(&self, role: &RoleInfo) -> anyhow::Result<RoleInfo>;

    /// Delete the role together with its assignments
    async fn role_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn identity_role_save(
        &self,
        identity_role: &IdentityRoleInfo,
    ) -> anyhow::Result<IdentityRoleInfo>;

    /// Identities with the role assigned
    async fn identity_find_by_role(&self, role_id: Uuid) -> anyhow::Result<Vec<IdentityInfo>>;
}
