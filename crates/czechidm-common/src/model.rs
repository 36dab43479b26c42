// Shared domain enums and the operation result carried by tasks and provisioning operations

use serde::{Deserialize, Serialize};

use crate::error::{IdmError, ResultCode, ResultModel};

/// State of an operation, task or processed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    #[default]
    Created,
    Running,
    Executed,
    Exception,
    NotExecuted,
    Blocked,
    Canceled,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Created => "CREATED",
            OperationState::Running => "RUNNING",
            OperationState::Executed => "EXECUTED",
            OperationState::Exception => "EXCEPTION",
            OperationState::NotExecuted => "NOT_EXECUTED",
            OperationState::Blocked => "BLOCKED",
            OperationState::Canceled => "CANCELED",
        }
    }

    /// Operation can be started or is still in progress
    pub fn is_runnable(&self) -> bool {
        matches!(self, OperationState::Created | OperationState::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, OperationState::Executed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OperationState::Exception)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OperationState::Created),
            "RUNNING" => Ok(OperationState::Running),
            "EXECUTED" => Ok(OperationState::Executed),
            "EXCEPTION" => Ok(OperationState::Exception),
            "NOT_EXECUTED" => Ok(OperationState::NotExecuted),
            "BLOCKED" => Ok(OperationState::Blocked),
            "CANCELED" => Ok(OperationState::Canceled),
            _ => Err(format!("Invalid operation state: {}", s)),
        }
    }
}

/// Result of an operation: state plus an optional structured model and cause
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub state: OperationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ResultModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl OperationResult {
    pub fn new(state: OperationState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn with_model(state: OperationState, model: ResultModel) -> Self {
        Self {
            state,
            code: Some(model.status_enum.clone()),
            model: Some(model),
            cause: None,
        }
    }

    pub fn with_code<I, K, V>(state: OperationState, code: &ResultCode, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Self::with_model(state, code.model(parameters))
    }

    /// `EXCEPTION` result built from an error, keeping its structured model
    pub fn from_error(error: &IdmError) -> Self {
        let model = error.result_model();
        Self {
            state: OperationState::Exception,
            code: Some(model.status_enum.clone()),
            model: Some(model),
            cause: Some(error.to_string()),
        }
    }

    pub fn is_code(&self, code: &ResultCode) -> bool {
        self.code.as_deref() == Some(code.code)
    }
}

/// Provisioning operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningEventType {
    Create,
    Update,
    Delete,
}

impl ProvisioningEventType {
    pub const ALL: [ProvisioningEventType; 3] = [
        ProvisioningEventType::Create,
        ProvisioningEventType::Update,
        ProvisioningEventType::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningEventType::Create => "CREATE",
            ProvisioningEventType::Update => "UPDATE",
            ProvisioningEventType::Delete => "DELETE",
        }
    }

    /// Lower case name used in configuration keys
    pub fn property_name(&self) -> &'static str {
        match self {
            ProvisioningEventType::Create => "create",
            ProvisioningEventType::Update => "update",
            ProvisioningEventType::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ProvisioningEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProvisioningEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(ProvisioningEventType::Create),
            "UPDATE" => Ok(ProvisioningEventType::Update),
            "DELETE" => Ok(ProvisioningEventType::Delete),
            _ => Err(format!("Invalid provisioning operation type: {}", s)),
        }
    }
}
