// Task type name to executor factory

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use czechidm_common::IdmResult;
use czechidm_common::error::SCHEDULER_TASK_TYPE_NOT_FOUND;

use crate::executor::TaskExecutor;

pub type TaskProperties = BTreeMap<String, serde_json::Value>;

/// Builds a configured executor from task properties
pub type TaskFactory =
    Arc<dyn Fn(&TaskProperties) -> IdmResult<Arc<dyn TaskExecutor>> + Send + Sync>;

#[derive(Default)]
pub struct TaskRegistry {
    factories: DashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, task_type: &str, factory: F)
    where
        F: Fn(&TaskProperties) -> IdmResult<Arc<dyn TaskExecutor>> + Send + Sync + 'static,
    {
        debug!(task_type = %task_type, "Registering task type");
        self.factories
            .insert(task_type.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.factories.contains_key(task_type)
    }

    pub fn create(
        &self,
        task_type: &str,
        properties: &TaskProperties,
    ) -> IdmResult<Arc<dyn TaskExecutor>> {
        let factory = self
            .factories
            .get(task_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SCHEDULER_TASK_TYPE_NOT_FOUND.error([("taskType", task_type)]))?;
        factory(properties)
    }

    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}
