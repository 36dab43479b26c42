//! CzechIdM Acc - Provisioning to target systems
//!
//! This crate provides:
//! - Provisioning break: operation counter, configuration and evaluation
//! - System administration with blocked operation types
//! - Provisioning batches, dispatch and retry
//! - Break notifications and referential integrity of recipients

pub mod batch;
pub mod break_config;
pub mod counter;
pub mod dispatch;
pub mod evaluator;
pub mod integrity;
pub mod notification;
pub mod result_code;
pub mod retry;
pub mod system;

pub use batch::ProvisioningBatchService;
pub use break_config::{BreakPolicy, ProvisioningBreakConfigService, RecipientSource, global_property};
pub use counter::{OperationCounterCache, ProvisioningBreakItems};
pub use dispatch::{
    Connector, ConnectorError, DEFAULT_MAX_ATTEMPTS, ProvisioningExecutor, RETRY_DELAYS_MINUTES,
    retry_delay,
};
pub use evaluator::{BreakDecision, ProvisioningBreakEvaluator};
pub use integrity::ReferentialIntegrity;
pub use notification::{
    NotificationFilter, NotificationLevel, NotificationLog, NotificationLogService,
    NotificationManager, NotificationMessage,
};
pub use retry::{RETRY_PROVISIONING_TASK_TYPE, RetryProvisioningTaskExecutor};
pub use system::SystemService;
