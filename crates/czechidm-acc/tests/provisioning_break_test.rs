// Integration tests for the provisioning break
// Tests warning and disable limits, windows, global configuration and recipients

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use czechidm_acc::notification::{TOPIC_PROVISIONING_BREAK_DISABLE, TOPIC_PROVISIONING_BREAK_WARNING};
use czechidm_acc::NotificationLevel;
use czechidm_acc::{
    BreakDecision, NotificationFilter, NotificationLogService, OperationCounterCache,
    ProvisioningBreakConfigService, ProvisioningBreakEvaluator, ProvisioningBreakItems,
    ReferentialIntegrity, SystemService, global_property,
};
use czechidm_common::{Clock, ConfigurationService, IdmConfiguration, ManualClock, ProvisioningEventType};
use czechidm_persistence::{
    BreakConfigInfo, BreakConfigPersistence, BreakRecipientInfo, IdentityInfo, IdentityPersistence,
    IdentityRoleInfo, MemoryPersistService, RoleInfo, SystemInfo, SystemPersistence,
};

const UPDATE: ProvisioningEventType = ProvisioningEventType::Update;

struct Fixture {
    store: Arc<MemoryPersistService>,
    configuration: Arc<IdmConfiguration>,
    clock: Arc<ManualClock>,
    configs: Arc<ProvisioningBreakConfigService>,
    notifications: Arc<NotificationLogService>,
    evaluator: ProvisioningBreakEvaluator,
    systems: SystemService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryPersistService::new());
    let configuration = Arc::new(IdmConfiguration::default());
    let clock = Arc::new(ManualClock::starting_now());
    let counter = Arc::new(OperationCounterCache::new(clock.clone()));
    let configs = Arc::new(ProvisioningBreakConfigService::new(
        store.clone(),
        configuration.clone(),
        counter,
    ));
    let notifications = Arc::new(NotificationLogService::default());
    let evaluator =
        ProvisioningBreakEvaluator::new(store.clone(), configs.clone(), notifications.clone());
    let systems = SystemService::new(store.clone(), configs.clone());
    Fixture {
        store,
        configuration,
        clock,
        configs,
        notifications,
        evaluator,
        systems,
    }
}

impl Fixture {
    async fn system(&self, code: &str) -> SystemInfo {
        self.store.system_save(&SystemInfo::new(code)).await.unwrap()
    }

    async fn identity(&self, username: &str) -> IdentityInfo {
        self.store
            .identity_save(&IdentityInfo::new(username))
            .await
            .unwrap()
    }

    async fn config(
        &self,
        system: &SystemInfo,
        period: i64,
        warning_limit: Option<i64>,
        disable_limit: Option<i64>,
    ) -> BreakConfigInfo {
        let mut config = BreakConfigInfo::new(system.id, UPDATE);
        config.period = Some(period);
        config.warning_limit = warning_limit;
        config.disable_limit = disable_limit;
        self.configs.save(&config).await.unwrap()
    }

    async fn notify_identity(&self, config: &BreakConfigInfo, identity: &IdentityInfo) {
        self.configs
            .save_recipient(&BreakRecipientInfo::for_identity(config.id, identity.id))
            .await
            .unwrap();
    }

    /// Evaluate against the current persisted state of the system
    async fn evaluate(&self, system_id: Uuid) -> BreakDecision {
        let system = self.store.system_get(system_id).await.unwrap().unwrap();
        self.evaluator.evaluate(&system, UPDATE).await.unwrap()
    }

    fn sent(&self, topic: &str, recipient: &IdentityInfo) -> usize {
        self.notifications.count(&NotificationFilter {
            topic: Some(topic.to_string()),
            recipient: Some(recipient.id),
            ..Default::default()
        })
    }

    async fn is_blocked(&self, system_id: Uuid) -> bool {
        self.store
            .system_get(system_id)
            .await
            .unwrap()
            .unwrap()
            .blocked_operation
            .is_blocked(UPDATE)
    }
}

#[tokio::test]
async fn test_warning_limit_notifies_each_attempt_over_limit() {
    let fx = fixture();
    let system = fx.system("warning-system").await;
    let admin = fx.identity("warning-admin").await;
    let config = fx.config(&system, 60_000, Some(3), None).await;
    fx.notify_identity(&config, &admin).await;

    let decisions: Vec<BreakDecision> = {
        let mut decisions = Vec::new();
        for _ in 0..5 {
            decisions.push(fx.evaluate(system.id).await);
        }
        decisions
    };

    assert_eq!(
        decisions,
        vec![
            BreakDecision::Allow,
            BreakDecision::Allow,
            BreakDecision::Warn,
            BreakDecision::Warn,
            BreakDecision::Warn,
        ]
    );
    // parent and email entry per warning
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &admin), 6);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_DISABLE, &admin), 0);
    assert!(!fx.is_blocked(system.id).await);
}

#[tokio::test]
async fn test_disable_limit_blocks_operation() {
    let fx = fixture();
    let system = fx.system("disable-system").await;
    let admin = fx.identity("disable-admin").await;
    let config = fx.config(&system, 60_000, None, Some(3)).await;
    fx.notify_identity(&config, &admin).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert!(!fx.is_blocked(system.id).await);

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);
    assert!(fx.is_blocked(system.id).await);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_DISABLE, &admin), 2);

    // blocked attempts are neither counted nor notified
    for _ in 0..3 {
        assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);
    }
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_DISABLE, &admin), 2);
    assert_eq!(fx.configs.counter().count(system.id, UPDATE, 60_000), 3);
}

#[tokio::test]
async fn test_disable_takes_precedence_over_warning() {
    let fx = fixture();
    let system = fx.system("combined-system").await;
    let admin = fx.identity("combined-admin").await;
    let config = fx.config(&system, 60_000, Some(2), Some(4)).await;
    fx.notify_identity(&config, &admin).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);

    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &admin), 4);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_DISABLE, &admin), 2);
}

#[tokio::test]
async fn test_notification_level_and_template_follow_limit() {
    let fx = fixture();
    let system = fx.system("template-system").await;
    let admin = fx.identity("template-admin").await;
    let mut config = BreakConfigInfo::new(system.id, UPDATE);
    config.period = Some(60_000);
    config.warning_limit = Some(1);
    config.disable_limit = Some(2);
    config.warning_template = Some("break-warning".to_string());
    config.disable_template = Some("break-disable".to_string());
    let config = fx.configs.save(&config).await.unwrap();
    fx.notify_identity(&config, &admin).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);

    let sent = |topic: &str| {
        fx.notifications.find(&NotificationFilter {
            topic: Some(topic.to_string()),
            recipient: Some(admin.id),
            ..Default::default()
        })
    };
    let warnings = sent(TOPIC_PROVISIONING_BREAK_WARNING);
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|log| log.message.level == NotificationLevel::Warning
        && log.message.template.as_deref() == Some("break-warning")));
    let disables = sent(TOPIC_PROVISIONING_BREAK_DISABLE);
    assert_eq!(disables.len(), 2);
    assert!(disables.iter().all(|log| log.message.level == NotificationLevel::Error
        && log.message.template.as_deref() == Some("break-disable")));
}

#[tokio::test]
async fn test_attempts_outside_period_are_forgotten() {
    let fx = fixture();
    let system = fx.system("period-system").await;
    let admin = fx.identity("period-admin").await;
    let config = fx.config(&system, 1_000, Some(3), None).await;
    fx.notify_identity(&config, &admin).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);

    fx.clock.advance(Duration::from_millis(2_000));
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.configs.cache_processed_items(system.id).size(UPDATE), 1);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &admin), 0);
}

#[tokio::test]
async fn test_cached_items_from_earlier_run_are_counted() {
    let fx = fixture();
    let system = fx.system("cached-system").await;
    let admin = fx.identity("cached-admin").await;
    let config = fx.config(&system, 10_000, Some(3), None).await;
    fx.notify_identity(&config, &admin).await;

    let now = fx.clock.now_millis();
    let mut items = ProvisioningBreakItems::default();
    // one attempt older than the period, two inside it
    items.add(UPDATE, now - 20_000);
    items.add(UPDATE, now - 5_000);
    items.add(UPDATE, now - 1_000);
    fx.configs.save_cache_processed_items(system.id, &items);

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &admin), 2);
    // the expired attempt was dropped
    assert_eq!(fx.configs.cache_processed_items(system.id).size(UPDATE), 3);
}

#[tokio::test]
async fn test_unblock_clears_window() {
    let fx = fixture();
    let system = fx.system("unblock-system").await;
    fx.config(&system, 60_000, None, Some(2)).await;

    fx.evaluate(system.id).await;
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);

    fx.systems.unblock(system.id, UPDATE).await.unwrap();
    assert!(!fx.is_blocked(system.id).await);
    assert!(fx.configs.cache_processed_items(system.id).is_empty());

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);
}

#[tokio::test]
async fn test_system_configuration_overrides_global() {
    let fx = fixture();
    let system = fx.system("override-system").await;
    let global_admin = fx.identity("global-admin").await;
    let system_admin = fx.identity("system-admin").await;

    fx.configuration
        .set_value(&global_property(UPDATE, "period"), "60000");
    fx.configuration
        .set_value(&global_property(UPDATE, "warningLimit"), "5");
    fx.configuration
        .set_value(&global_property(UPDATE, "identityRecipients"), "global-admin");

    // limit from the system, period from global properties
    let mut config = BreakConfigInfo::new(system.id, UPDATE);
    config.warning_limit = Some(2);
    let config = fx.configs.save(&config).await.unwrap();
    fx.notify_identity(&config, &system_admin).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);

    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &system_admin), 2);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &global_admin), 0);
}

#[tokio::test]
async fn test_global_configuration_with_role_recipients() {
    let fx = fixture();
    let system = fx.system("global-system").await;
    let member = fx.identity("break-member").await;
    let outsider = fx.identity("outsider").await;
    let role = fx.store.role_save(&RoleInfo::new("break-admins")).await.unwrap();
    fx.store
        .identity_role_save(&IdentityRoleInfo {
            id: Uuid::new_v4(),
            identity_id: member.id,
            role_id: role.id,
        })
        .await
        .unwrap();

    fx.configuration
        .set_value(&global_property(UPDATE, "period"), "60000");
    fx.configuration
        .set_value(&global_property(UPDATE, "warningLimit"), "1");
    fx.configuration
        .set_value(&global_property(UPDATE, "roleRecipients"), "break-admins");

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Warn);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &member), 2);
    assert_eq!(fx.sent(TOPIC_PROVISIONING_BREAK_WARNING, &outsider), 0);
}

#[tokio::test]
async fn test_globally_disabled_breaker_allows_everything() {
    let fx = fixture();
    let system = fx.system("disabled-breaker-system").await;
    let admin = fx.identity("disabled-breaker-admin").await;
    let config = fx.config(&system, 60_000, Some(1), Some(2)).await;
    fx.notify_identity(&config, &admin).await;

    fx.configuration
        .set_value(&global_property(UPDATE, "disabled"), "true");

    for _ in 0..5 {
        assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    }
    assert!(!fx.is_blocked(system.id).await);
    assert_eq!(fx.notifications.count(&NotificationFilter::default()), 0);
}

#[tokio::test]
async fn test_disabled_system_configuration_allows_everything() {
    let fx = fixture();
    let system = fx.system("disabled-config-system").await;
    let mut config = BreakConfigInfo::new(system.id, UPDATE);
    config.period = Some(60_000);
    config.disable_limit = Some(1);
    config.disabled = true;
    fx.configs.save(&config).await.unwrap();

    for _ in 0..3 {
        assert_eq!(fx.evaluate(system.id).await, BreakDecision::Allow);
    }
    assert!(!fx.is_blocked(system.id).await);
}

#[tokio::test]
async fn test_missing_recipients_do_not_stop_blocking() {
    let fx = fixture();
    let system = fx.system("no-recipient-system").await;
    fx.config(&system, 60_000, None, Some(1)).await;

    assert_eq!(fx.evaluate(system.id).await, BreakDecision::Block);
    assert!(fx.is_blocked(system.id).await);
    assert_eq!(fx.notifications.count(&NotificationFilter::default()), 0);
}

#[tokio::test]
async fn test_deleting_identity_and_role_removes_recipients() {
    let fx = fixture();
    let integrity = ReferentialIntegrity::new(fx.store.clone());
    let system = fx.system("integrity-system").await;
    let admin = fx.identity("integrity-admin").await;
    let role = fx.store.role_save(&RoleInfo::new("integrity-role")).await.unwrap();
    let config = fx.config(&system, 60_000, Some(1), None).await;

    fx.notify_identity(&config, &admin).await;
    fx.configs
        .save_recipient(&BreakRecipientInfo::for_role(config.id, role.id))
        .await
        .unwrap();
    assert_eq!(fx.configs.find_recipient_entries(config.id).await.unwrap().len(), 2);

    assert!(integrity.delete_identity(admin.id).await.unwrap());
    let remaining = fx.configs.find_recipient_entries(config.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].role_id, Some(role.id));

    assert!(integrity.delete_role(role.id).await.unwrap());
    assert!(fx.configs.find_recipient_entries(config.id).await.unwrap().is_empty());
    assert!(fx.store.identity_get(admin.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_system_delete_removes_configurations() {
    let fx = fixture();
    let system = fx.system("deleted-system").await;
    let admin = fx.identity("deleted-admin").await;
    let config = fx.config(&system, 60_000, Some(1), None).await;
    fx.notify_identity(&config, &admin).await;
    fx.evaluate(system.id).await;

    assert!(fx.systems.delete(system.id).await.unwrap());

    assert!(fx.store.break_config_get(config.id).await.unwrap().is_none());
    assert!(fx
        .store
        .break_recipient_find_by_config(config.id)
        .await
        .unwrap()
        .is_empty());
    assert!(fx.configs.cache_processed_items(system.id).is_empty());
}
