//! Persistence traits for the storage abstraction layer
//!
//! Each trait covers the entities of one area. Services depend on the
//! narrowest trait they need; `PersistenceService` bundles all of them.

pub mod break_config;
pub mod identity;
pub mod provisioning;
pub mod system;
pub mod task;

pub use break_config::BreakConfigPersistence;
pub use identity::IdentityPersistence;
pub use provisioning::ProvisioningPersistence;
pub use system::SystemPersistence;
pub use task::TaskPersistence;

use async_trait::async_trait;

/// Unified persistence service trait
#[async_trait]
pub trait PersistenceService:
    SystemPersistence
    + BreakConfigPersistence
    + IdentityPersistence
    + ProvisioningPersistence
    + TaskPersistence
    + Send
    + Sync
{
    /// Name of the storage backend
    fn backend_name(&self) -> &'static str;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
