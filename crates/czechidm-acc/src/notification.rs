//! Notification dispatch
//!
//! `NotificationManager` is the seam towards the notification subsystem.
//! `NotificationLogService` keeps every sent message in memory as a parent
//! log entry plus one child entry per delivery channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use czechidm_persistence::IdentityInfo;

pub const TOPIC_PROVISIONING_BREAK_WARNING: &str = "acc:provisioningBreakWarning";
pub const TOPIC_PROVISIONING_BREAK_DISABLE: &str = "acc:provisioningBreakDisable";

/// Channel used when none is configured
pub const DEFAULT_CHANNEL: &str = "email";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub level: NotificationLevel,
    pub subject: Option<String>,
    /// Template code used to render the message
    pub template: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn new(level: NotificationLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl ToString) -> Self {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: Uuid,
    /// `None` for the parent entry
    pub parent_id: Option<Uuid>,
    pub topic: String,
    /// `None` for the parent entry
    pub channel: Option<String>,
    pub message: NotificationMessage,
    pub recipients: Vec<Uuid>,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct NotificationFilter {
    pub topic: Option<String>,
    pub recipient: Option<Uuid>,
    pub parent: Option<Uuid>,
}

#[async_trait]
pub trait NotificationManager: Send + Sync {
    /// Send the message to the recipients, returning the created log entries
    async fn send(
        &self,
        topic: &str,
        message: NotificationMessage,
        recipients: &[IdentityInfo],
    ) -> anyhow::Result<Vec<NotificationLog>>;
}

#[derive(Debug)]
pub struct NotificationLogService {
    channels: Vec<String>,
    logs: DashMap<Uuid, NotificationLog>,
}

impl Default for NotificationLogService {
    fn default() -> Self {
        Self::new(vec![DEFAULT_CHANNEL.to_string()])
    }
}

impl NotificationLogService {
    pub fn new(channels: Vec<String>) -> Self {
        Self {
            channels,
            logs: DashMap::new(),
        }
    }

    /// Log entries matching the filter, oldest first
    pub fn find(&self, filter: &NotificationFilter) -> Vec<NotificationLog> {
        let mut logs: Vec<NotificationLog> = self
            .logs
            .iter()
            .filter(|entry| {
                let log = entry.value();
                filter.topic.as_ref().is_none_or(|topic| &log.topic == topic)
                    && filter
                        .recipient
                        .is_none_or(|recipient| log.recipients.contains(&recipient))
                    && filter.parent.is_none_or(|parent| log.parent_id == Some(parent))
            })
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by_key(|log| log.created);
        logs
    }

    pub fn count(&self, filter: &NotificationFilter) -> usize {
        self.find(filter).len()
    }

    pub fn clear(&self) {
        self.logs.clear();
    }
}

#[async_trait]
impl NotificationManager for NotificationLogService {
    async fn send(
        &self,
        topic: &str,
        message: NotificationMessage,
        recipients: &[IdentityInfo],
    ) -> anyhow::Result<Vec<NotificationLog>> {
        let recipients: Vec<Uuid> = recipients.iter().map(|identity| identity.id).collect();
        let created = Utc::now();
        let parent = NotificationLog {
            id: Uuid::new_v4(),
            parent_id: None,
            topic: topic.to_string(),
            channel: None,
            message,
            recipients,
            created,
        };

        let mut sent = Vec::with_capacity(self.channels.len() + 1);
        for channel in &self.channels {
            sent.push(NotificationLog {
                id: Uuid::new_v4(),
                parent_id: Some(parent.id),
                channel: Some(channel.clone()),
                ..parent.clone()
            });
        }
        sent.insert(0, parent);

        for log in &sent {
            self.logs.insert(log.id, log.clone());
        }
        debug!(topic = %topic, entries = sent.len(), "Notification sent");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_creates_parent_and_channel_entries() {
        let service = NotificationLogService::default();
        let identity = IdentityInfo::new("admin");
        let message = NotificationMessage::new(NotificationLevel::Warning)
            .with_parameter("systemCode", "ldap");

        let sent = service
            .send(TOPIC_PROVISIONING_BREAK_WARNING, message, &[identity.clone()])
            .await
            .unwrap();

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].parent_id, None);
        assert_eq!(sent[1].parent_id, Some(sent[0].id));
        assert_eq!(sent[1].channel.as_deref(), Some(DEFAULT_CHANNEL));

        let filter = NotificationFilter {
            recipient: Some(identity.id),
            ..Default::default()
        };
        assert_eq!(service.count(&filter), 2);

        let children = NotificationFilter {
            parent: Some(sent[0].id),
            ..Default::default()
        };
        assert_eq!(service.count(&children), 1);
    }

    #[tokio::test]
    async fn test_find_by_topic() {
        let service = NotificationLogService::new(vec!["email".to_string(), "websocket".to_string()]);
        service
            .send(TOPIC_PROVISIONING_BREAK_DISABLE, NotificationMessage::default(), &[])
            .await
            .unwrap();

        let filter = NotificationFilter {
            topic: Some(TOPIC_PROVISIONING_BREAK_DISABLE.to_string()),
            ..Default::default()
        };
        assert_eq!(service.count(&filter), 3);
        assert_eq!(
            service.count(&NotificationFilter {
                topic: Some(TOPIC_PROVISIONING_BREAK_WARNING.to_string()),
                ..Default::default()
            }),
            0
        );
    }
}
