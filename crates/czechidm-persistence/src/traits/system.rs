//! Target system persistence trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::SystemInfo;

#[async_trait]
pub trait SystemPersistence: Send + Sync {
    async fn system_get(&self, id: Uuid) -> anyhow::Result<Option<SystemInfo>>;

    async fn system_find_by_code(&self, code: &str) -> anyhow::Result<Option<SystemInfo>>;

    async fn system_find_all(&self) -> anyhow::Result<Vec<SystemInfo>>;

    /// Insert or replace the system
    async fn system_save(&self, system: &SystemInfo) -> anyhow::Result<SystemInfo>;

    async fn system_delete(&self, id: Uuid) -> anyhow::Result<bool>;
}
