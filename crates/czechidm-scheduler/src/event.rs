// Long running task lifecycle events
// Published on a broadcast channel, subscribers that lag simply miss events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use czechidm_persistence::LongRunningTaskInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    Start,
    End,
}

impl std::fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskEventType::Start => write!(f, "START"),
            TaskEventType::End => write!(f, "END"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    pub task: LongRunningTaskInfo,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TaskEventPublisher {
    sender: broadcast::Sender<TaskEvent>,
}

impl TaskEventPublisher {
    pub fn new(queue_size: usize) -> Self {
        let (sender, _) = broadcast::channel(queue_size);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event_type: TaskEventType, task: &LongRunningTaskInfo) {
        let event = TaskEvent {
            event_type,
            task: task.clone(),
            timestamp: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            trace!(task_id = %task.id, event = %event_type, "No task event subscribers");
        }
    }
}

impl Default for TaskEventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
