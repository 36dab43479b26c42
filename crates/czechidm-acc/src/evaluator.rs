//! Provisioning break evaluation
//!
//! Every provisioning attempt of a system is counted in the window of its
//! operation type. Reaching the warning limit notifies the recipients,
//! reaching the disable limit blocks the operation type on the system until
//! an administrator unblocks it.

use std::sync::Arc;

use tracing::{error, info, warn};

use czechidm_common::error::NOT_FOUND;
use czechidm_common::{IdmResult, ProvisioningEventType};
use czechidm_persistence::{PersistenceService, SystemInfo};

use crate::break_config::{BreakPolicy, ProvisioningBreakConfigService};
use crate::notification::{
    NotificationLevel, NotificationManager, NotificationMessage, TOPIC_PROVISIONING_BREAK_DISABLE,
    TOPIC_PROVISIONING_BREAK_WARNING,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakDecision {
    /// Dispatch the operation
    Allow,
    /// Dispatch the operation, recipients were warned
    Warn,
    /// Do not dispatch, the operation type is blocked on the system
    Block,
}

pub struct ProvisioningBreakEvaluator {
    store: Arc<dyn PersistenceService>,
    configs: Arc<ProvisioningBreakConfigService>,
    notifications: Arc<dyn NotificationManager>,
}

impl ProvisioningBreakEvaluator {
    pub fn new(
        store: Arc<dyn PersistenceService>,
        configs: Arc<ProvisioningBreakConfigService>,
        notifications: Arc<dyn NotificationManager>,
    ) -> Self {
        Self {
            store,
            configs,
            notifications,
        }
    }

    /// Count the attempt and decide whether it may be dispatched
    ///
    /// Only a failure to persist the blocked flag is returned as an error,
    /// anything else is logged and the attempt is allowed.
    pub async fn evaluate(
        &self,
        system: &SystemInfo,
        operation_type: ProvisioningEventType,
    ) -> IdmResult<BreakDecision> {
        if system.blocked_operation.is_blocked(operation_type) {
            return Ok(BreakDecision::Block);
        }
        if self.configs.is_globally_disabled(operation_type) {
            return Ok(BreakDecision::Allow);
        }

        let policy = match self.configs.resolve_policy(operation_type, system.id).await {
            Ok(Some(policy)) if !policy.disabled => policy,
            Ok(_) => return Ok(BreakDecision::Allow),
            Err(e) => {
                warn!(system_id = %system.id, operation = %operation_type, error = %e, "Provisioning break policy not resolved, operation allowed");
                return Ok(BreakDecision::Allow);
            }
        };
        let Some(period) = policy.period else {
            return Ok(BreakDecision::Allow);
        };

        let count = self
            .configs
            .counter()
            .record_and_count(system.id, operation_type, period) as i64;

        if policy.disable_limit.is_some_and(|limit| count >= limit) {
            self.block(system, operation_type).await?;
            metrics::counter!("idm_provisioning_break_blocked_total").increment(1);
            info!(system = %system.code, operation = %operation_type, count, "Provisioning break reached disable limit, operation blocked");
            let message = NotificationMessage::new(NotificationLevel::Error)
                .with_template(policy.disable_template.clone());
            self.notify(system, &policy, count, TOPIC_PROVISIONING_BREAK_DISABLE, message)
                .await;
            return Ok(BreakDecision::Block);
        }

        if policy.warning_limit.is_some_and(|limit| count >= limit) {
            metrics::counter!("idm_provisioning_break_warning_total").increment(1);
            info!(system = %system.code, operation = %operation_type, count, "Provisioning break reached warning limit");
            let message = NotificationMessage::new(NotificationLevel::Warning)
                .with_template(policy.warning_template.clone());
            self.notify(system, &policy, count, TOPIC_PROVISIONING_BREAK_WARNING, message)
                .await;
            return Ok(BreakDecision::Warn);
        }

        Ok(BreakDecision::Allow)
    }

    /// Persist the blocked flag on the current state of the system
    async fn block(&self, system: &SystemInfo, operation_type: ProvisioningEventType) -> IdmResult<()> {
        let mut current = self
            .store
            .system_get(system.id)
            .await?
            .ok_or_else(|| NOT_FOUND.error([("entity", system.id)]))?;
        current.blocked_operation.set_blocked(operation_type, true);
        self.store.system_save(&current).await?;
        Ok(())
    }

    async fn notify(
        &self,
        system: &SystemInfo,
        policy: &BreakPolicy,
        count: i64,
        topic: &str,
        message: NotificationMessage,
    ) {
        let recipients = match self.configs.policy_recipients(policy).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(system = %system.code, topic = %topic, error = %e, "Provisioning break recipients not resolved");
                return;
            }
        };
        if recipients.is_empty() {
            warn!(system = %system.code, topic = %topic, "Provisioning break has no recipients, notification not sent");
            return;
        }

        let message = message
            .with_parameter("systemCode", &system.code)
            .with_parameter("operationType", policy.operation_type)
            .with_parameter("actualCount", count)
            .with_parameter("period", policy.period.unwrap_or_default());

        if let Err(e) = self.notifications.send(topic, message, &recipients).await {
            error!(system = %system.code, topic = %topic, error = %e, "Provisioning break notification not sent");
        }
    }
}
