//! Reconciles the topics of a message-broker cluster against a declared spec.
//!
//! Missing topics are created, partition counts grown and declared config
//! overrides applied. Topics are never deleted, partitions never shrink and
//! replication factors never change.

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod kafka;
pub mod logger;
pub mod retry;
pub mod spec;
pub mod util;

pub use crate::config::ProvisionConfig;
pub use crate::engine::{Reconciliation, ReconciliationEngine};
pub use crate::error::{ProvisionError, Result};
pub use crate::gateway::ClusterAdminGateway;
pub use crate::retry::RetryPolicy;
pub use crate::spec::{ClusterTopicState, ProvisionSpec, TopicSpec};
pub use crate::util::Shutdown;

/// Validates `config` and, unless provisioning is disabled, reconciles the
/// cluster behind `gateway` with it.
#[tracing::instrument(skip_all, fields(brokers = %config.brokers))]
pub async fn provision<G>(
    config: &ProvisionConfig,
    gateway: &mut G,
    shutdown: Shutdown,
) -> Result<Reconciliation>
where
    G: ClusterAdminGateway + ?Sized,
{
    config.validate()?;
    if !config.enabled {
        tracing::info!("topic provisioning is disabled");
        return Ok(Reconciliation::default());
    }

    ReconciliationEngine::new(config.retry.clone())
        .with_timeout(config.request_timeout())
        .with_shutdown(shutdown)
        .run(&config.spec(), gateway)
        .await
}
