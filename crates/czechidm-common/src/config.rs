//! Generic key/value configuration store
//!
//! Keys follow the `idm.<visibility>.<module>.<key>` convention. Values are read
//! from the `config` crate sources and can be overridden at runtime.

use dashmap::DashMap;
use tracing::warn;

/// Configuration access used by services
pub trait ConfigurationService: Send + Sync {
    /// Raw string value of the key
    fn get_value(&self, key: &str) -> Option<String>;

    /// Set a runtime value for the key
    fn set_value(&self, key: &str, value: &str);

    /// Remove a runtime value; file and environment values are masked as well
    fn remove_value(&self, key: &str);

    fn get_boolean(&self, key: &str) -> Option<bool> {
        let value = self.get_value(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                warn!(key = %key, value = %value, "Configuration value is not a boolean");
                None
            }
        }
    }

    fn get_boolean_or(&self, key: &str, default: bool) -> bool {
        self.get_boolean(key).unwrap_or(default)
    }

    fn get_long(&self, key: &str) -> Option<i64> {
        let value = self.get_value(key)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key = %key, value = %value, "Configuration value is not a number");
                None
            }
        }
    }

    /// Comma separated list, blank items are skipped
    fn get_list(&self, key: &str) -> Vec<String> {
        self.get_value(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Configuration backed by `config::Config` with runtime overrides
#[derive(Debug, Default)]
pub struct IdmConfiguration {
    config: config::Config,
    /// `None` marks a removed key
    overrides: DashMap<String, Option<String>>,
}

impl IdmConfiguration {
    pub fn new(config: config::Config) -> Self {
        Self {
            config,
            overrides: DashMap::new(),
        }
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }
}

impl ConfigurationService for IdmConfiguration {
    fn get_value(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return value.clone();
        }
        self.config
            .get_string(key)
            .or_else(|_| self.config.get_string(&key.to_lowercase()))
            .ok()
    }

    fn set_value(&self, key: &str, value: &str) {
        self.overrides
            .insert(key.to_string(), Some(value.to_string()));
    }

    fn remove_value(&self, key: &str) {
        self.overrides.insert(key.to_string(), None);
    }
}
