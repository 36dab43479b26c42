//! CzechIdM Scheduler - Long running task framework
//!
//! This crate provides:
//! - The executor contract and its runtime context
//! - The task runner (validate, start, process, end)
//! - Stateful paged execution with a processed-items queue
//! - The task manager (async and sync execution, cancel, interrupt, restart recovery)
//! - Scheduled tasks and the trigger loop

pub mod event;
pub mod executor;
pub mod manager;
pub mod processed_items;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod stateful;

pub use event::{TaskEvent, TaskEventPublisher, TaskEventType};
pub use executor::{TaskContext, TaskExecutor};
pub use manager::{ExecuteOptions, LongRunningTaskManager};
pub use processed_items::ProcessedItemsService;
pub use registry::{TaskFactory, TaskProperties, TaskRegistry};
pub use runner::TaskRunner;
pub use scheduler::Scheduler;
pub use stateful::{PAGE_SIZE, StatefulExecutor, StatefulTaskExecutor, TaskItem};
pub use tokio_util::sync::CancellationToken;
