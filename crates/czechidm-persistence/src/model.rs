//! Domain model types for the persistence abstraction layer
//!
//! These types are used as arguments and return values of the persistence
//! traits, decoupled from a specific storage backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use czechidm_common::{OperationResult, OperationState, ProvisioningEventType};

/// Generic paginated result
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total_count: u64,
    pub page_number: u64,
    pub pages_available: u64,
    pub page_items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total_count: u64, page_number: u64, page_size: u64, page_items: Vec<T>) -> Self {
        Self {
            total_count,
            page_number,
            pages_available: if page_size > 0 {
                total_count.div_ceil(page_size)
            } else {
                0
            },
            page_items,
        }
    }

    pub fn empty() -> Self {
        Self {
            total_count: 0,
            page_number: 0,
            pages_available: 0,
            page_items: Vec::new(),
        }
    }

    /// Slice an already ordered collection into the requested page
    pub fn of(items: Vec<T>, page: PageRequest) -> Self {
        let total = items.len() as u64;
        let page_items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();
        Self::new(total, page.page, page.size, page_items)
    }

    pub fn has_next(&self) -> bool {
        self.page_number + 1 < self.pages_available
    }
}

/// Zero based page request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
}

impl PageRequest {
    pub fn new(page: u64, size: u64) -> Self {
        Self { page, size }
    }

    pub fn first(size: u64) -> Self {
        Self { page: 0, size }
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            size: self.size,
        }
    }

    pub fn offset(&self) -> u64 {
        self.page * self.size
    }
}

/// Blocked operation flags of a target system
///
/// `None` means the flag was never set, which is treated as not blocked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedOperation {
    pub create_operation: Option<bool>,
    pub update_operation: Option<bool>,
    pub delete_operation: Option<bool>,
}

impl BlockedOperation {
    pub fn block_create(&mut self) {
        self.create_operation = Some(true);
    }

    pub fn block_update(&mut self) {
        self.update_operation = Some(true);
    }

    pub fn block_delete(&mut self) {
        self.delete_operation = Some(true);
    }

    pub fn set_blocked(&mut self, operation_type: ProvisioningEventType, blocked: bool) {
        let flag = match operation_type {
            ProvisioningEventType::Create => &mut self.create_operation,
            ProvisioningEventType::Update => &mut self.update_operation,
            ProvisioningEventType::Delete => &mut self.delete_operation,
        };
        *flag = Some(blocked);
    }

    pub fn is_blocked(&self, operation_type: ProvisioningEventType) -> bool {
        let flag = match operation_type {
            ProvisioningEventType::Create => self.create_operation,
            ProvisioningEventType::Update => self.update_operation,
            ProvisioningEventType::Delete => self.delete_operation,
        };
        flag.unwrap_or(false)
    }

    pub fn is_any_blocked(&self) -> bool {
        ProvisioningEventType::ALL
            .iter()
            .any(|operation_type| self.is_blocked(*operation_type))
    }
}

/// Connected target system
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub id: Uuid,
    pub code: String,
    pub disabled: bool,
    pub blocked_operation: BlockedOperation,
}

impl SystemInfo {
    pub fn new(code: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.to_string(),
            disabled: false,
            blocked_operation: BlockedOperation::default(),
        }
    }
}

/// Provisioning break configuration of one system and operation type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakConfigInfo {
    pub id: Uuid,
    /// `None` for a configuration synthesised from global keys
    pub system_id: Option<Uuid>,
    pub operation_type: ProvisioningEventType,
    /// Window in milliseconds
    pub period: Option<i64>,
    pub warning_limit: Option<i64>,
    pub disable_limit: Option<i64>,
    pub disabled: bool,
    pub warning_template: Option<String>,
    pub disable_template: Option<String>,
    pub global_configuration: bool,
}

impl BreakConfigInfo {
    pub fn new(system_id: Uuid, operation_type: ProvisioningEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_id: Some(system_id),
            operation_type,
            period: None,
            warning_limit: None,
            disable_limit: None,
            disabled: false,
            warning_template: None,
            disable_template: None,
            global_configuration: false,
        }
    }
}

/// Recipient of break notifications, an identity or a role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakRecipientInfo {
    pub id: Uuid,
    pub break_config_id: Uuid,
    pub identity_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
}

impl BreakRecipientInfo {
    pub fn for_identity(break_config_id: Uuid, identity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            break_config_id,
            identity_id: Some(identity_id),
            role_id: None,
        }
    }

    pub fn for_role(break_config_id: Uuid, role_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            break_config_id,
            identity_id: None,
            role_id: Some(role_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInfo {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub disabled: bool,
}

impl IdentityInfo {
    pub fn new(username: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: None,
            disabled: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub id: Uuid,
    pub code: String,
    pub base_code: String,
}

impl RoleInfo {
    pub fn new(base_code: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: base_code.to_string(),
            base_code: base_code.to_string(),
        }
    }
}

/// Role assigned to an identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRoleInfo {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub role_id: Uuid,
}

/// Queued provisioning operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningOperationInfo {
    pub id: Uuid,
    pub system_id: Uuid,
    pub system_entity_id: Uuid,
    pub entity_identifier: Option<Uuid>,
    pub operation_type: ProvisioningEventType,
    pub result: OperationResult,
    pub batch_id: Option<Uuid>,
    pub attributes: serde_json::Value,
    pub current_attempt: u32,
    pub max_attempts: u32,
    pub next_attempt: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl ProvisioningOperationInfo {
    pub fn new(
        system_id: Uuid,
        system_entity_id: Uuid,
        operation_type: ProvisioningEventType,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_id,
            system_entity_id,
            entity_identifier: None,
            operation_type,
            result: OperationResult::new(OperationState::Created),
            batch_id: None,
            attributes,
            current_attempt: 0,
            max_attempts: 0,
            next_attempt: None,
            created: Utc::now(),
        }
    }

    pub fn state(&self) -> OperationState {
        self.result.state
    }
}

/// Group of operations of one system entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningBatchInfo {
    pub id: Uuid,
    pub system_id: Uuid,
    pub system_entity_id: Uuid,
    pub next_attempt: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl ProvisioningBatchInfo {
    pub fn new(system_id: Uuid, system_entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_id,
            system_entity_id,
            next_attempt: None,
            created: Utc::now(),
        }
    }
}

/// Finished operation moved out of the active queue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningArchiveInfo {
    pub id: Uuid,
    pub system_id: Uuid,
    pub system_entity_id: Uuid,
    pub operation_type: ProvisioningEventType,
    pub result: OperationResult,
    pub attempts: u32,
    pub created: DateTime<Utc>,
    pub archived: DateTime<Utc>,
}

impl ProvisioningArchiveInfo {
    pub fn from_operation(operation: &ProvisioningOperationInfo, archived: DateTime<Utc>) -> Self {
        Self {
            id: operation.id,
            system_id: operation.system_id,
            system_entity_id: operation.system_entity_id,
            operation_type: operation.operation_type,
            result: operation.result.clone(),
            attempts: operation.current_attempt,
            created: operation.created,
            archived,
        }
    }
}

/// Persisted record of a long running task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningTaskInfo {
    pub id: Uuid,
    pub task_type: String,
    pub task_description: Option<String>,
    pub task_properties: BTreeMap<String, serde_json::Value>,
    pub count: Option<i64>,
    pub counter: Option<i64>,
    pub result: OperationResult,
    pub running: bool,
    pub thread_id: Option<String>,
    pub thread_name: Option<String>,
    pub dry_run: bool,
    pub stateful: bool,
    pub instance_id: String,
    pub scheduled_task_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub task_started: Option<DateTime<Utc>>,
}

impl LongRunningTaskInfo {
    pub fn new(task_type: &str, instance_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.to_string(),
            task_description: None,
            task_properties: BTreeMap::new(),
            count: None,
            counter: None,
            result: OperationResult::new(OperationState::Created),
            running: false,
            thread_id: None,
            thread_name: None,
            dry_run: false,
            stateful: false,
            instance_id: instance_id.to_string(),
            scheduled_task_id: None,
            created: Utc::now(),
            task_started: None,
        }
    }

    pub fn state(&self) -> OperationState {
        self.result.state
    }
}

#[derive(Clone, Debug, Default)]
pub struct LongRunningTaskFilter {
    pub task_type: Option<String>,
    pub running: Option<bool>,
    pub state: Option<OperationState>,
    pub instance_id: Option<String>,
}

/// Kind of processed item record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessedItemKind {
    /// Item successfully processed by a scheduled task, skipped on the next run
    Queue,
    /// Result of one item within one task run
    Log,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedTaskItemInfo {
    pub id: Uuid,
    pub kind: ProcessedItemKind,
    pub scheduled_task_id: Option<Uuid>,
    pub long_running_task_id: Option<Uuid>,
    pub referenced_entity_id: Uuid,
    pub referenced_dto_type: String,
    pub operation_result: OperationResult,
    pub created: DateTime<Utc>,
}

/// Trigger of a scheduled task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "type")]
pub enum TaskTrigger {
    /// Fires once
    Simple { fire_at: DateTime<Utc> },
    /// Fires repeatedly every `interval_ms`
    Repeat {
        interval_ms: i64,
        next_fire_at: DateTime<Utc>,
    },
}

impl TaskTrigger {
    pub fn next_fire_at(&self) -> DateTime<Utc> {
        match self {
            TaskTrigger::Simple { fire_at } => *fire_at,
            TaskTrigger::Repeat { next_fire_at, .. } => *next_fire_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskInfo {
    pub id: Uuid,
    pub task_type: String,
    pub description: Option<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub dry_run: bool,
    /// `None` once a simple trigger has fired
    pub trigger: Option<TaskTrigger>,
    pub instance_id: String,
    pub created: DateTime<Utc>,
}

impl ScheduledTaskInfo {
    pub fn new(task_type: &str, instance_id: &str, trigger: Option<TaskTrigger>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.to_string(),
            description: None,
            properties: BTreeMap::new(),
            dry_run: false,
            trigger,
            instance_id: instance_id.to_string(),
            created: Utc::now(),
        }
    }
}
