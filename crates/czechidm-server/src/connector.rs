// Connector used when no target system integration is configured

use async_trait::async_trait;
use tracing::info;

use czechidm_acc::{Connector, ConnectorError};
use czechidm_persistence::{ProvisioningOperationInfo, SystemInfo};

/// Accepts every operation and only logs it
#[derive(Debug, Default)]
pub struct LoggingConnector;

#[async_trait]
impl Connector for LoggingConnector {
    async fn execute(
        &self,
        system: &SystemInfo,
        operation: &ProvisioningOperationInfo,
    ) -> Result<(), ConnectorError> {
        info!(
            system = %system.code,
            operation_id = %operation.id,
            operation = %operation.operation_type,
            system_entity_id = %operation.system_entity_id,
            "Provisioning operation accepted"
        );
        Ok(())
    }
}
