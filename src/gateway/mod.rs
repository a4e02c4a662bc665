//! The admin surface the reconciliation engine needs from a cluster.
//!
//! [`ClusterAdminGateway`] is what a cluster client implements. The engine never
//! calls it directly; every call goes through [`BoundedGateway`], which enforces
//! the shared contract: a deadline per call, cooperative interruption, empty
//! inputs short-circuited without a round trip, and every failure folded into
//! [`ProvisionError::Gateway`].

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GatewayFailure, Operation, ProvisionError, Result};
use crate::spec::TopicSpec;
use crate::util::Shutdown;

pub mod memory;

/// Default deadline for a single admin call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Live partition layout of an existing topic.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicDescription {
    pub partition_count: u32,
}

/// A single key/value proposed for a topic's configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait ClusterAdminGateway: Send {
    /// Every topic visible on the cluster.
    async fn list_topic_names(&mut self) -> anyhow::Result<BTreeSet<String>>;

    /// Partition counts of the requested topics. Topics that do not exist are
    /// left out of the result.
    async fn describe_topics(
        &mut self,
        names: &BTreeSet<String>,
    ) -> anyhow::Result<BTreeMap<String, TopicDescription>>;

    /// Current configuration entries of the requested topics.
    async fn describe_configs(
        &mut self,
        names: &BTreeSet<String>,
    ) -> anyhow::Result<BTreeMap<String, BTreeMap<String, String>>>;

    /// Creates topics with their partition count, replication factor and configs.
    async fn create_topics(&mut self, topics: &[TopicSpec]) -> anyhow::Result<()>;

    /// Grows each topic to the given total partition count.
    async fn increase_partitions(&mut self, targets: &BTreeMap<String, u32>) -> anyhow::Result<()>;

    /// Sets the given entries on each topic. Keys not mentioned keep their value.
    async fn alter_configs(
        &mut self,
        changes: &BTreeMap<String, BTreeSet<ConfigEntry>>,
    ) -> anyhow::Result<()>;
}

/// Runs a single admin call under the deadline and the shutdown signal.
pub async fn bounded<T>(
    operation: Operation,
    timeout: Duration,
    shutdown: &Shutdown,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    let outcome = if shutdown.is_shutdown() {
        Err(GatewayFailure::Interrupted)
    } else {
        tokio::select! {
            biased;
            _ = shutdown.wait() => Err(GatewayFailure::Interrupted),
            res = tokio::time::timeout(timeout, call) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(GatewayFailure::Execution(err)),
                Err(_) => Err(GatewayFailure::Timeout(timeout)),
            },
        }
    };

    outcome.map_err(|cause| {
        tracing::error!(%operation, error = %cause, "failed to provision topics");
        ProvisionError::gateway(operation, cause)
    })
}

/// A gateway borrowed for one reconciliation pass.
pub struct BoundedGateway<'a, G: ?Sized> {
    gateway: &'a mut G,
    timeout: Duration,
    shutdown: &'a Shutdown,
}

impl<'a, G> BoundedGateway<'a, G>
where
    G: ClusterAdminGateway + ?Sized,
{
    pub fn new(gateway: &'a mut G, timeout: Duration, shutdown: &'a Shutdown) -> Self {
        Self {
            gateway,
            timeout,
            shutdown,
        }
    }

    pub async fn list_topic_names(&mut self) -> Result<BTreeSet<String>> {
        let call = self.gateway.list_topic_names();
        bounded(Operation::ListTopics, self.timeout, self.shutdown, call).await
    }

    pub async fn describe_topics(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, TopicDescription>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let call = self.gateway.describe_topics(names);
        bounded(Operation::DescribeTopics, self.timeout, self.shutdown, call).await
    }

    pub async fn describe_configs(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let call = self.gateway.describe_configs(names);
        let configs = bounded(Operation::DescribeConfigs, self.timeout, self.shutdown, call).await?;
        tracing::debug!(?configs, "current config on the broker");
        Ok(configs)
    }

    pub async fn create_topics(&mut self, topics: &[TopicSpec]) -> Result<()> {
        if topics.is_empty() {
            return Ok(());
        }
        tracing::info!(
            topics = %serde_json::to_string(topics).unwrap_or_default(),
            "about to create topics"
        );
        let call = self.gateway.create_topics(topics);
        bounded(Operation::CreateTopics, self.timeout, self.shutdown, call).await
    }

    pub async fn increase_partitions(&mut self, targets: &BTreeMap<String, u32>) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let call = self.gateway.increase_partitions(targets);
        bounded(Operation::CreatePartitions, self.timeout, self.shutdown, call).await
    }

    pub async fn alter_configs(
        &mut self,
        changes: &BTreeMap<String, BTreeSet<ConfigEntry>>,
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let call = self.gateway.alter_configs(changes);
        bounded(Operation::AlterConfigs, self.timeout, self.shutdown, call).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    use crate::error::{GatewayFailure, Operation, ProvisionError};
    use crate::gateway::memory::MemoryCluster;
    use crate::gateway::{bounded, BoundedGateway, DEFAULT_REQUEST_TIMEOUT};
    use crate::util::Shutdown;

    #[tokio::test]
    async fn empty_inputs_skip_the_gateway() {
        let mut cluster = MemoryCluster::new();
        let shutdown = Shutdown::new();
        let mut gateway = BoundedGateway::new(&mut cluster, DEFAULT_REQUEST_TIMEOUT, &shutdown);

        assert!(gateway.describe_topics(&BTreeSet::new()).await.unwrap().is_empty());
        assert!(gateway.describe_configs(&BTreeSet::new()).await.unwrap().is_empty());
        gateway.create_topics(&[]).await.unwrap();
        gateway.increase_partitions(&BTreeMap::new()).await.unwrap();
        gateway.alter_configs(&BTreeMap::new()).await.unwrap();

        assert!(cluster.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded() {
        let shutdown = Shutdown::new();
        let err = bounded(
            Operation::ListTopics,
            Duration::from_secs(60),
            &shutdown,
            std::future::pending::<anyhow::Result<()>>(),
        )
        .await
        .unwrap_err();

        match err {
            ProvisionError::Gateway {
                operation: Operation::ListTopics,
                cause: GatewayFailure::Timeout(timeout),
            } => assert_eq!(Duration::from_secs(60), timeout),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn execution_failure_keeps_cause() {
        let shutdown = Shutdown::new();
        let err = bounded(
            Operation::CreateTopics,
            DEFAULT_REQUEST_TIMEOUT,
            &shutdown,
            async { Err::<(), _>(anyhow::anyhow!("not controller")) },
        )
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!("failed to create topics: not controller", err.to_string());
    }

    #[tokio::test]
    async fn interrupted_call_leaves_signal_set() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let call = async move {
            waiter.shutdown();
            std::future::pending::<anyhow::Result<()>>().await
        };
        let err = bounded(
            Operation::DescribeConfigs,
            DEFAULT_REQUEST_TIMEOUT,
            &shutdown,
            call,
        )
        .await
        .unwrap_err();

        assert!(err.is_interrupted());
        assert!(shutdown.is_shutdown());
    }
}
