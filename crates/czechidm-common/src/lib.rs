//! CzechIdM Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all CzechIdM components:
//! - Error types, result codes and result models
//! - Operation state and result
//! - Configuration store
//! - Clock abstraction

pub mod clock;
pub mod config;
pub mod error;
pub mod model;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigurationService, IdmConfiguration};
pub use error::{IdmError, IdmResult, ResultCode, ResultModel};
pub use model::{OperationResult, OperationState, ProvisioningEventType};

/// Configuration key holding the identifier of this server instance
pub const INSTANCE_ID_PROPERTY: &str = "idm.pub.app.instanceId";

/// Instance identifier used when none is configured
pub const DEFAULT_INSTANCE_ID: &str = "idm-primary";
