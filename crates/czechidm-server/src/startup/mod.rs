//! Application startup utilities module.

mod logging;
mod shutdown;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, drain, wait_for_shutdown_signal};
