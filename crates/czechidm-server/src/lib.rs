//! CzechIdM Server - startup, configuration and wiring of the services

pub mod app;
pub mod config;
pub mod connector;
pub mod startup;

pub use app::Application;
pub use config::{Cli, Settings};
pub use connector::LoggingConnector;
