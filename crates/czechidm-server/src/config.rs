//! Configuration loading for the CzechIdM server
//!
//! Values come from `conf/application.yml` (or the file given by `--config`),
//! then from `IDM_` prefixed environment variables, then from command line
//! overrides.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};

use czechidm_common::{DEFAULT_INSTANCE_ID, INSTANCE_ID_PROPERTY};

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

pub const SCHEDULER_INTERVAL_PROPERTY: &str = "idm.sec.scheduler.interval-secs";
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 10;

pub const RETRY_INTERVAL_PROPERTY: &str = "idm.sec.acc.provisioning.retry.interval-secs";
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "czechidm-server", version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", env = "IDM_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Identifier of this server instance
    #[arg(long = "instance-id")]
    pub instance_id: Option<String>,

    /// Seconds between checks of scheduled task triggers
    #[arg(long = "scheduler-interval-secs")]
    pub scheduler_interval_secs: Option<u64>,
}

/// Loaded server configuration
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub config: Config,
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder()
            .add_source(File::from(file).required(cli.config.is_some()))
            .add_source(
                Environment::with_prefix("IDM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(instance_id) = &cli.instance_id {
            builder = builder.set_override(INSTANCE_ID_PROPERTY, instance_id.as_str())?;
        }
        if let Some(interval) = cli.scheduler_interval_secs {
            builder = builder.set_override(SCHEDULER_INTERVAL_PROPERTY, interval as i64)?;
        }

        Ok(Self {
            config: builder.build()?,
        })
    }

    pub fn instance_id(&self) -> String {
        self.get_string(INSTANCE_ID_PROPERTY)
            .unwrap_or_else(|| DEFAULT_INSTANCE_ID.to_string())
    }

    /// Value of the key, file keys may have been lower cased by the loader
    fn get_string(&self, key: &str) -> Option<String> {
        self.config
            .get_string(key)
            .or_else(|_| self.config.get_string(&key.to_lowercase()))
            .ok()
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.seconds(SCHEDULER_INTERVAL_PROPERTY, DEFAULT_SCHEDULER_INTERVAL_SECS))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.seconds(RETRY_INTERVAL_PROPERTY, DEFAULT_RETRY_INTERVAL_SECS))
    }

    fn seconds(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|value| u64::try_from(value).ok())
            .filter(|value| *value > 0)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let file = write_config("idm: {}\n");
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.instance_id(), DEFAULT_INSTANCE_ID);
        assert_eq!(
            settings.retry_interval(),
            Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_file_values_and_cli_overrides() {
        let file = write_config(
            "idm:\n  pub:\n    app:\n      instanceId: node-a\n  sec:\n    scheduler:\n      interval-secs: 30\n",
        );
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.instance_id(), "node-a");
        assert_eq!(settings.scheduler_interval(), Duration::from_secs(30));

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            instance_id: Some("node-b".to_string()),
            scheduler_interval_secs: Some(5),
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.instance_id(), "node-b");
        assert_eq!(settings.scheduler_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_file_fails() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/czechidm.yml")),
            ..Default::default()
        };
        assert!(Settings::load(&cli).is_err());
    }
}
