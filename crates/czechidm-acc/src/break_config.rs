//! Provisioning break configuration
//!
//! A break configuration is either stored for a system and operation type or
//! synthesised from global configuration properties:
//!
//! ```text
//! idm.sec.core.provisioning-break.<operation>.disabled
//! idm.sec.core.provisioning-break.<operation>.warningLimit
//! idm.sec.core.provisioning-break.<operation>.disableLimit
//! idm.sec.core.provisioning-break.<operation>.period
//! idm.sec.core.provisioning-break.<operation>.identityRecipients
//! idm.sec.core.provisioning-break.<operation>.roleRecipients
//! idm.sec.core.provisioning-break.<operation>.warningTemplate
//! idm.sec.core.provisioning-break.<operation>.disableTemplate
//! ```
//!
//! The effective policy takes each value from the system configuration and
//! falls back to the global one.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use czechidm_common::error::NOT_FOUND;
use czechidm_common::{ConfigurationService, IdmResult, ProvisioningEventType};
use czechidm_persistence::{BreakConfigInfo, BreakRecipientInfo, IdentityInfo, PersistenceService};

use crate::counter::{OperationCounterCache, ProvisioningBreakItems};
use crate::result_code::{
    PROVISIONING_BREAK_GLOBAL_CONFIG_SAVE, PROVISIONING_BREAK_OPERATION_EXISTS,
    PROVISIONING_BREAK_RECIPIENT_INVALID,
};

pub const GLOBAL_PROPERTY_PREFIX: &str = "idm.sec.core.provisioning-break";

pub const PROPERTY_DISABLED: &str = "disabled";
pub const PROPERTY_WARNING_LIMIT: &str = "warningLimit";
pub const PROPERTY_DISABLE_LIMIT: &str = "disableLimit";
pub const PROPERTY_PERIOD: &str = "period";
pub const PROPERTY_IDENTITY_RECIPIENTS: &str = "identityRecipients";
pub const PROPERTY_ROLE_RECIPIENTS: &str = "roleRecipients";
pub const PROPERTY_WARNING_TEMPLATE: &str = "warningTemplate";
pub const PROPERTY_DISABLE_TEMPLATE: &str = "disableTemplate";

/// Full configuration key of a global break property
pub fn global_property(operation_type: ProvisioningEventType, property: &str) -> String {
    format!(
        "{}.{}.{}",
        GLOBAL_PROPERTY_PREFIX,
        operation_type.property_name(),
        property
    )
}

/// Where the recipients of a policy come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecipientSource {
    /// Recipients stored for the break configuration
    Config(Uuid),
    /// Usernames and role codes from global properties
    Global,
}

/// Effective break policy of one system and operation type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakPolicy {
    pub operation_type: ProvisioningEventType,
    pub disabled: bool,
    /// Window in milliseconds, `None` turns the breaker off
    pub period: Option<i64>,
    pub warning_limit: Option<i64>,
    pub disable_limit: Option<i64>,
    pub warning_template: Option<String>,
    pub disable_template: Option<String>,
    pub recipients: RecipientSource,
    /// Resolved from global properties only
    pub global: bool,
}

pub struct ProvisioningBreakConfigService {
    store: Arc<dyn PersistenceService>,
    configuration: Arc<dyn ConfigurationService>,
    counter: Arc<OperationCounterCache>,
}

impl ProvisioningBreakConfigService {
    pub fn new(
        store: Arc<dyn PersistenceService>,
        configuration: Arc<dyn ConfigurationService>,
        counter: Arc<OperationCounterCache>,
    ) -> Self {
        Self {
            store,
            configuration,
            counter,
        }
    }

    pub fn counter(&self) -> &Arc<OperationCounterCache> {
        &self.counter
    }

    pub async fn get(&self, id: Uuid) -> IdmResult<Option<BreakConfigInfo>> {
        Ok(self.store.break_config_get(id).await?)
    }

    pub async fn find_by_system(&self, system_id: Uuid) -> IdmResult<Vec<BreakConfigInfo>> {
        Ok(self.store.break_config_find_by_system(system_id).await?)
    }

    /// Save a system break configuration
    ///
    /// Only one configuration may exist per system and operation type.
    pub async fn save(&self, config: &BreakConfigInfo) -> IdmResult<BreakConfigInfo> {
        let Some(system_id) = config.system_id.filter(|_| !config.global_configuration) else {
            return Err(PROVISIONING_BREAK_GLOBAL_CONFIG_SAVE
                .error([("operationType", config.operation_type)]));
        };
        if self.store.system_get(system_id).await?.is_none() {
            return Err(NOT_FOUND.error([("entity", system_id)]));
        }
        let existing = self
            .store
            .break_config_find(system_id, config.operation_type)
            .await?;
        if existing.iter().any(|other| other.id != config.id) {
            return Err(PROVISIONING_BREAK_OPERATION_EXISTS.error([
                ("operationType", config.operation_type.to_string()),
                ("system", system_id.to_string()),
            ]));
        }

        let saved = self.store.break_config_save(config).await?;
        info!(config_id = %saved.id, system_id = %system_id, operation = %saved.operation_type, "Provisioning break configuration saved");
        Ok(saved)
    }

    /// Delete the configuration together with its recipients
    pub async fn delete(&self, id: Uuid) -> IdmResult<bool> {
        for recipient in self.store.break_recipient_find_by_config(id).await? {
            self.store.break_recipient_delete(recipient.id).await?;
        }
        Ok(self.store.break_config_delete(id).await?)
    }

    pub async fn save_recipient(&self, recipient: &BreakRecipientInfo) -> IdmResult<BreakRecipientInfo> {
        if recipient.identity_id.is_some() == recipient.role_id.is_some() {
            return Err(PROVISIONING_BREAK_RECIPIENT_INVALID.error([("recipient", recipient.id)]));
        }
        if self
            .store
            .break_config_get(recipient.break_config_id)
            .await?
            .is_none()
        {
            return Err(NOT_FOUND.error([("entity", recipient.break_config_id)]));
        }
        Ok(self.store.break_recipient_save(recipient).await?)
    }

    pub async fn delete_recipient(&self, id: Uuid) -> IdmResult<bool> {
        Ok(self.store.break_recipient_delete(id).await?)
    }

    pub async fn find_recipient_entries(&self, config_id: Uuid) -> IdmResult<Vec<BreakRecipientInfo>> {
        Ok(self.store.break_recipient_find_by_config(config_id).await?)
    }

    /// Stored configuration of the system and operation type
    pub async fn get_config(
        &self,
        operation_type: ProvisioningEventType,
        system_id: Uuid,
    ) -> IdmResult<Option<BreakConfigInfo>> {
        let mut configs = self.store.break_config_find(system_id, operation_type).await?;
        if configs.len() > 1 {
            warn!(system_id = %system_id, operation = %operation_type, count = configs.len(), "Multiple provisioning break configurations found, using the first one");
        }
        Ok((!configs.is_empty()).then(|| configs.swap_remove(0)))
    }

    /// Breaker for the operation type is switched off globally
    pub fn is_globally_disabled(&self, operation_type: ProvisioningEventType) -> bool {
        self.configuration
            .get_boolean_or(&global_property(operation_type, PROPERTY_DISABLED), false)
    }

    /// Configuration synthesised from global properties, `None` when nothing is set
    pub fn global_config(&self, operation_type: ProvisioningEventType) -> Option<BreakConfigInfo> {
        let value = |property: &str| global_property(operation_type, property);
        let disabled = self.configuration.get_boolean(&value(PROPERTY_DISABLED));
        let period = self.configuration.get_long(&value(PROPERTY_PERIOD));
        let warning_limit = self.configuration.get_long(&value(PROPERTY_WARNING_LIMIT));
        let disable_limit = self.configuration.get_long(&value(PROPERTY_DISABLE_LIMIT));

        if disabled.is_none() && period.is_none() && warning_limit.is_none() && disable_limit.is_none() {
            return None;
        }

        Some(BreakConfigInfo {
            id: Uuid::nil(),
            system_id: None,
            operation_type,
            period,
            warning_limit,
            disable_limit,
            disabled: disabled.unwrap_or(false),
            warning_template: self.configuration.get_value(&value(PROPERTY_WARNING_TEMPLATE)),
            disable_template: self.configuration.get_value(&value(PROPERTY_DISABLE_TEMPLATE)),
            global_configuration: true,
        })
    }

    /// Effective policy of the system and operation type
    pub async fn resolve_policy(
        &self,
        operation_type: ProvisioningEventType,
        system_id: Uuid,
    ) -> IdmResult<Option<BreakPolicy>> {
        let specific = self.get_config(operation_type, system_id).await?;
        let global = self.global_config(operation_type);

        let policy = match (specific, global) {
            (None, None) => None,
            (None, Some(global)) => Some(BreakPolicy {
                operation_type,
                disabled: global.disabled,
                period: global.period,
                warning_limit: global.warning_limit,
                disable_limit: global.disable_limit,
                warning_template: global.warning_template,
                disable_template: global.disable_template,
                recipients: RecipientSource::Global,
                global: true,
            }),
            (Some(specific), global) => {
                let has_recipients = !self
                    .store
                    .break_recipient_find_by_config(specific.id)
                    .await?
                    .is_empty();
                let global = global.as_ref();
                Some(BreakPolicy {
                    operation_type,
                    disabled: specific.disabled,
                    period: specific.period.or_else(|| global.and_then(|g| g.period)),
                    warning_limit: specific
                        .warning_limit
                        .or_else(|| global.and_then(|g| g.warning_limit)),
                    disable_limit: specific
                        .disable_limit
                        .or_else(|| global.and_then(|g| g.disable_limit)),
                    warning_template: specific
                        .warning_template
                        .or_else(|| global.and_then(|g| g.warning_template.clone())),
                    disable_template: specific
                        .disable_template
                        .or_else(|| global.and_then(|g| g.disable_template.clone())),
                    recipients: if has_recipients {
                        RecipientSource::Config(specific.id)
                    } else {
                        RecipientSource::Global
                    },
                    global: false,
                })
            }
        };
        debug!(system_id = %system_id, operation = %operation_type, policy = ?policy, "Provisioning break policy resolved");
        Ok(policy)
    }

    /// Identities notified for the policy
    pub async fn policy_recipients(&self, policy: &BreakPolicy) -> IdmResult<Vec<IdentityInfo>> {
        match policy.recipients {
            RecipientSource::Config(config_id) => self.find_recipients(config_id).await,
            RecipientSource::Global => self.global_recipients(policy.operation_type).await,
        }
    }

    /// Identities behind the stored recipients of the configuration
    pub async fn find_recipients(&self, config_id: Uuid) -> IdmResult<Vec<IdentityInfo>> {
        let mut identities = Vec::new();
        for recipient in self.store.break_recipient_find_by_config(config_id).await? {
            if let Some(identity_id) = recipient.identity_id {
                if let Some(identity) = self.store.identity_get(identity_id).await? {
                    identities.push(identity);
                }
            }
            if let Some(role_id) = recipient.role_id {
                identities.extend(self.store.identity_find_by_role(role_id).await?);
            }
        }
        Ok(distinct(identities))
    }

    /// Identities from the global username and role code lists
    pub async fn global_recipients(
        &self,
        operation_type: ProvisioningEventType,
    ) -> IdmResult<Vec<IdentityInfo>> {
        let mut identities = Vec::new();
        let usernames = self
            .configuration
            .get_list(&global_property(operation_type, PROPERTY_IDENTITY_RECIPIENTS));
        for username in usernames {
            match self.store.identity_find_by_username(&username).await? {
                Some(identity) => identities.push(identity),
                None => warn!(username = %username, "Provisioning break recipient identity not found"),
            }
        }

        let role_codes = self
            .configuration
            .get_list(&global_property(operation_type, PROPERTY_ROLE_RECIPIENTS));
        for code in role_codes {
            match self.store.role_find_by_base_code(&code).await? {
                Some(role) => identities.extend(self.store.identity_find_by_role(role.id).await?),
                None => warn!(role = %code, "Provisioning break recipient role not found"),
            }
        }
        Ok(distinct(identities))
    }

    pub fn cache_processed_items(&self, system_id: Uuid) -> ProvisioningBreakItems {
        self.counter.snapshot(system_id)
    }

    pub fn save_cache_processed_items(&self, system_id: Uuid, items: &ProvisioningBreakItems) {
        self.counter.replace(system_id, items);
    }

    pub fn clear_cache(&self, system_id: Uuid, operation_type: ProvisioningEventType) {
        debug!(system_id = %system_id, operation = %operation_type, "Clearing provisioning break cache");
        self.counter.clear(system_id, operation_type);
    }
}

/// Keep the first occurrence of each identity
fn distinct(identities: Vec<IdentityInfo>) -> Vec<IdentityInfo> {
    let mut seen = HashSet::new();
    identities
        .into_iter()
        .filter(|identity| seen.insert(identity.id))
        .collect()
}
