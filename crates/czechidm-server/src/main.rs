//! Main entry point for the CzechIdM server.
//!
//! Loads configuration, installs logging, recovers tasks of a previous run and
//! runs the scheduler until Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use czechidm_server::startup::{self, LoggingConfig};
use czechidm_server::{Application, Cli, LoggingConnector, Settings};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;
    let _logging_guard = startup::init_logging(&LoggingConfig::from_env())?;

    let scheduler_interval = settings.scheduler_interval();
    let app = Application::new(settings, Arc::new(LoggingConnector));
    app.init().await?;

    let shutdown = startup::wait_for_shutdown_signal();
    let mut shutdown_rx = shutdown.subscribe();
    let scheduler_handle = app
        .scheduler
        .clone()
        .start(scheduler_interval, shutdown.subscribe());
    info!(
        instance_id = %app.instance_id,
        interval = ?scheduler_interval,
        "CzechIdM server started"
    );

    let _ = shutdown_rx.recv().await;

    let canceled = app.task_manager.cancel_all();
    info!(canceled, "Running tasks asked to stop");
    startup::drain("scheduler", scheduler_handle, SHUTDOWN_TIMEOUT).await;

    info!("Shutdown complete");
    Ok(())
}
