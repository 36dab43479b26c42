//! Error types and result codes for CzechIdM
//!
//! This module defines:
//! - `IdmError`: Application-specific error enum
//! - `ResultCode`: Structured result codes with HTTP-equivalent status
//! - `ResultModel`: Localizable result carried by errors and operation results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Module identifier of the core result codes
pub const MODULE_CORE: &str = "core";

/// Result code with a message template
///
/// Placeholders in `message` are written as `{name}` and are substituted
/// from the parameters of the `ResultModel` built from this code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultCode {
    pub code: &'static str,
    pub module: &'static str,
    pub status: u16,
    pub message: &'static str,
}

impl ResultCode {
    /// Build a result model from this code and the given template parameters
    pub fn model<I, K, V>(&self, parameters: I) -> ResultModel
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        ResultModel::new(self, parameters)
    }

    /// Build an error carrying this code
    pub fn error<I, K, V>(&self, parameters: I) -> IdmError
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        IdmError::Result(self.model(parameters))
    }
}

pub const OK: ResultCode = ResultCode {
    code: "OK",
    module: MODULE_CORE,
    status: 200,
    message: "ok",
};

pub const ACCEPTED: ResultCode = ResultCode {
    code: "ACCEPTED",
    module: MODULE_CORE,
    status: 202,
    message: "accepted",
};

pub const BAD_VALUE: ResultCode = ResultCode {
    code: "BAD_VALUE",
    module: MODULE_CORE,
    status: 400,
    message: "Value [{value}] is not valid.",
};

pub const NOT_FOUND: ResultCode = ResultCode {
    code: "NOT_FOUND",
    module: MODULE_CORE,
    status: 404,
    message: "[{entity}] not found.",
};

pub const INTERNAL_SERVER_ERROR: ResultCode = ResultCode {
    code: "INTERNAL_SERVER_ERROR",
    module: MODULE_CORE,
    status: 500,
    message: "Internal error: {message}",
};

pub const CONFIGURATION_ERROR: ResultCode = ResultCode {
    code: "CONFIGURATION_ERROR",
    module: MODULE_CORE,
    status: 500,
    message: "Configuration error: {message}",
};

// Long running task result codes
pub const LONG_RUNNING_TASK_NOT_FOUND: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_NOT_FOUND",
    module: MODULE_CORE,
    status: 404,
    message: "Task [{taskId}] not found.",
};

pub const LONG_RUNNING_TASK_IS_RUNNING: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_IS_RUNNING",
    module: MODULE_CORE,
    status: 409,
    message: "Task [{taskId}] is already running.",
};

pub const LONG_RUNNING_TASK_IS_PROCESSED: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_IS_PROCESSED",
    module: MODULE_CORE,
    status: 409,
    message: "Task [{taskId}] is already processed.",
};

pub const LONG_RUNNING_TASK_INTERRUPT: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_INTERRUPT",
    module: MODULE_CORE,
    status: 500,
    message: "Task [{taskId}] was interrupted.",
};

pub const LONG_RUNNING_TASK_CANCELED_BY_RESTART: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_CANCELED_BY_RESTART",
    module: MODULE_CORE,
    status: 400,
    message: "Task [{taskId}] was canceled by restart of instance [{instanceId}].",
};

pub const LONG_RUNNING_TASK_FAILED: ResultCode = ResultCode {
    code: "LONG_RUNNING_TASK_FAILED",
    module: MODULE_CORE,
    status: 500,
    message: "Task [{taskId}] of type [{taskType}] failed.",
};

pub const CONCURRENT_EXECUTION: ResultCode = ResultCode {
    code: "CONCURRENT_EXECUTION",
    module: MODULE_CORE,
    status: 409,
    message: "Task type [{taskType}] does not support concurrent execution, task [{taskId}] is running.",
};

pub const DRY_RUN_NOT_SUPPORTED: ResultCode = ResultCode {
    code: "DRY_RUN_NOT_SUPPORTED",
    module: MODULE_CORE,
    status: 400,
    message: "Task type [{taskType}] does not support dry run mode.",
};

pub const SCHEDULER_TASK_TYPE_NOT_FOUND: ResultCode = ResultCode {
    code: "SCHEDULER_TASK_TYPE_NOT_FOUND",
    module: MODULE_CORE,
    status: 400,
    message: "Task type [{taskType}] is not registered.",
};

/// Structured, localizable result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultModel {
    pub status_code: u16,
    pub status_enum: String,
    pub module: String,
    pub message: String,
    pub parameters: BTreeMap<String, String>,
}

impl ResultModel {
    pub fn new<I, K, V>(code: &ResultCode, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let parameters: BTreeMap<String, String> = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();

        let mut message = code.message.to_string();
        for (name, value) in &parameters {
            message = message.replace(&format!("{{{}}}", name), value);
        }

        Self {
            status_code: code.status,
            status_enum: code.code.to_string(),
            module: code.module.to_string(),
            message,
            parameters,
        }
    }

    pub fn is_code(&self, code: &ResultCode) -> bool {
        self.status_enum == code.code
    }
}

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum IdmError {
    #[error("{}", .0.message)]
    Result(ResultModel),

    #[error("task type [{task_type}] does not support concurrent execution, task [{running_task_id}] is running")]
    ConcurrentExecution {
        task_type: String,
        running_task_id: Uuid,
    },

    #[error("task type [{0}] does not support dry run mode")]
    DryRunNotSupported(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IdmError {
    /// The structured result of this error, suitable for a client or a notification
    pub fn result_model(&self) -> ResultModel {
        match self {
            IdmError::Result(model) => model.clone(),
            IdmError::ConcurrentExecution {
                task_type,
                running_task_id,
            } => CONCURRENT_EXECUTION.model([
                ("taskType", task_type.clone()),
                ("taskId", running_task_id.to_string()),
            ]),
            IdmError::DryRunNotSupported(task_type) => {
                DRY_RUN_NOT_SUPPORTED.model([("taskType", task_type)])
            }
            IdmError::Persistence(e) => INTERNAL_SERVER_ERROR.model([("message", e)]),
            IdmError::Configuration(message) => CONFIGURATION_ERROR.model([("message", message)]),
            IdmError::Internal(message) => INTERNAL_SERVER_ERROR.model([("message", message)]),
        }
    }

    /// Machine readable code of this error
    pub fn code(&self) -> String {
        self.result_model().status_enum
    }

    pub fn is_code(&self, code: &ResultCode) -> bool {
        matches!(self, IdmError::Result(model) if model.is_code(code))
    }
}

pub type IdmResult<T> = Result<T, IdmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_model_formats_message() {
        let model = LONG_RUNNING_TASK_IS_RUNNING.model([("taskId", "abc")]);
        assert_eq!(model.message, "Task [abc] is already running.");
        assert_eq!(model.status_code, 409);
        assert_eq!(model.status_enum, "LONG_RUNNING_TASK_IS_RUNNING");
        assert_eq!(model.parameters.get("taskId").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_result_error_display() {
        let err = LONG_RUNNING_TASK_IS_PROCESSED.error([("taskId", "t1")]);
        assert_eq!(format!("{}", err), "Task [t1] is already processed.");
        assert!(err.is_code(&LONG_RUNNING_TASK_IS_PROCESSED));
        assert!(!err.is_code(&LONG_RUNNING_TASK_IS_RUNNING));
    }

    #[test]
    fn test_concurrent_execution_maps_to_result_model() {
        let id = Uuid::new_v4();
        let err = IdmError::ConcurrentExecution {
            task_type: "retry-provisioning".to_string(),
            running_task_id: id,
        };
        let model = err.result_model();
        assert_eq!(model.status_enum, CONCURRENT_EXECUTION.code);
        assert_eq!(model.parameters.get("taskId"), Some(&id.to_string()));
        assert_eq!(err.code(), "CONCURRENT_EXECUTION");
    }

    #[test]
    fn test_persistence_error_from_anyhow() {
        let err: IdmError = anyhow::anyhow!("disk full").into();
        assert_eq!(format!("{}", err), "persistence error: disk full");
        assert_eq!(err.result_model().status_code, 500);
    }
}
