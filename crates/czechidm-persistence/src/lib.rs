//! CzechIdM Persistence - Persistence layer
//!
//! This crate provides:
//! - Domain model types for persistence operations
//! - Persistence trait abstractions per entity area
//! - An in-memory backend

pub mod memory;
pub mod model;
pub mod traits;

// Re-export persistence traits
pub use traits::{
    BreakConfigPersistence, IdentityPersistence, PersistenceService, ProvisioningPersistence,
    SystemPersistence, TaskPersistence,
};

// Re-export in-memory backend
pub use memory::MemoryPersistService;

// Re-export model types
pub use model::{
    BlockedOperation, BreakConfigInfo, BreakRecipientInfo, IdentityInfo, IdentityRoleInfo,
    LongRunningTaskFilter, LongRunningTaskInfo, Page, PageRequest, ProcessedItemKind,
    ProcessedTaskItemInfo, ProvisioningArchiveInfo, ProvisioningBatchInfo,
    ProvisioningOperationInfo, RoleInfo, ScheduledTaskInfo, SystemInfo, TaskTrigger,
};
