use std::time::Duration;

use derive_more::Display;

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

/// The admin operations the reconciliation engine issues against a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Operation {
    #[display(fmt = "list topics")]
    ListTopics,
    #[display(fmt = "describe topics")]
    DescribeTopics,
    #[display(fmt = "describe configs")]
    DescribeConfigs,
    #[display(fmt = "create topics")]
    CreateTopics,
    #[display(fmt = "create partitions")]
    CreatePartitions,
    #[display(fmt = "alter configs")]
    AlterConfigs,
}

impl Operation {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::CreateTopics | Operation::CreatePartitions | Operation::AlterConfigs
        )
    }
}

/// Why a single gateway call did not complete.
#[derive(thiserror::Error, Debug)]
pub enum GatewayFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0:#}")]
    Execution(#[source] anyhow::Error),
    #[error("provisioning was interrupted")]
    Interrupted,
}

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("invalid provisioning config: {0}")]
    Validation(String),
    #[error("failed to {operation}: {cause}")]
    Gateway {
        operation: Operation,
        #[source]
        cause: GatewayFailure,
    },
    #[error("failed to provision topics after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ProvisionError::Validation(reason.into())
    }

    pub fn gateway(operation: Operation, cause: GatewayFailure) -> Self {
        ProvisionError::Gateway { operation, cause }
    }

    /// Only gateway failures are worth another pass; a bad config stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Gateway { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        match self {
            ProvisionError::Gateway {
                cause: GatewayFailure::Interrupted,
                ..
            } => true,
            ProvisionError::Failed { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}
