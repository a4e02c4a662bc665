//! Reconciles declared topics against a live cluster.
//!
//! A run is a sequence of passes. Each pass starts from a fresh topic listing and
//! walks the phases in a fixed order: create missing topics, grow partition
//! counts, update configs. Any gateway failure aborts the pass and the whole pass
//! is retried under the [`RetryPolicy`]; nothing from a failed pass is carried
//! over, the next listing and diff pick up whatever it managed to apply.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::error::{ProvisionError, Result};
use crate::gateway::{BoundedGateway, ClusterAdminGateway, DEFAULT_REQUEST_TIMEOUT};
use crate::retry::RetryPolicy;
use crate::spec::ProvisionSpec;
use crate::util::Shutdown;

pub use diff::{ConfigChange, ConfigChangeKind, PartitionChange, PartitionDrift};

mod diff;

/// What a run changed on the cluster.
///
/// `created` covers every pass of the run, failed ones included, since a
/// topic created before a pass failed is not missing on the next one. The
/// other fields describe the successful pass only.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Reconciliation {
    /// Passes it took, the successful one included.
    pub attempts: u32,
    pub created: Vec<String>,
    pub partition_increases: BTreeMap<String, PartitionChange>,
    pub partition_drift: Vec<PartitionDrift>,
    pub config_changes: Vec<ConfigChange>,
}

impl Reconciliation {
    /// True when the cluster already matched the declared state.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.partition_increases.is_empty()
            && self.config_changes.is_empty()
    }
}

impl Display for Reconciliation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created {} topic(s), grew {} topic(s), set {} config value(s), {} partition drift warning(s) after {} attempt(s)",
            self.created.len(),
            self.partition_increases.len(),
            self.config_changes.len(),
            self.partition_drift.len(),
            self.attempts
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    ListTopics,
    CreateTopics,
    GrowPartitions,
    UpdateConfigs,
    Done,
}

impl Phase {
    fn successor(self) -> Phase {
        match self {
            Phase::ListTopics => Phase::CreateTopics,
            Phase::CreateTopics => Phase::GrowPartitions,
            Phase::GrowPartitions => Phase::UpdateConfigs,
            Phase::UpdateConfigs | Phase::Done => Phase::Done,
        }
    }
}

/// State of a single pass.
struct Pass<'a, G: ?Sized> {
    spec: &'a ProvisionSpec,
    gateway: BoundedGateway<'a, G>,
    /// Topic names listed at the start of the pass, before anything was created.
    existing: BTreeSet<String>,
    report: Reconciliation,
}

impl<'a, G> Pass<'a, G>
where
    G: ClusterAdminGateway + ?Sized,
{
    fn new(spec: &'a ProvisionSpec, gateway: BoundedGateway<'a, G>) -> Self {
        Self {
            spec,
            gateway,
            existing: BTreeSet::new(),
            report: Reconciliation::default(),
        }
    }

    fn enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::CreateTopics => self.spec.auto_create_topics,
            Phase::GrowPartitions => self.spec.auto_add_partitions,
            Phase::UpdateConfigs => self.spec.auto_update_config,
            Phase::ListTopics | Phase::Done => true,
        }
    }

    fn next(&self, phase: Phase) -> Phase {
        let mut next = phase.successor();
        while !self.enabled(next) {
            next = next.successor();
        }
        next
    }

    async fn run(&mut self) -> Result<()> {
        let mut phase = Phase::ListTopics;
        while phase != Phase::Done {
            tracing::trace!(?phase, "entering phase");
            match phase {
                Phase::ListTopics => self.list_topics().await?,
                Phase::CreateTopics => self.create_topics().await?,
                Phase::GrowPartitions => self.grow_partitions().await?,
                Phase::UpdateConfigs => self.update_configs().await?,
                Phase::Done => {}
            }
            phase = self.next(phase);
        }
        Ok(())
    }

    async fn list_topics(&mut self) -> Result<()> {
        self.existing = self.gateway.list_topic_names().await?;
        tracing::debug!(topics = ?self.existing, "found topics on the broker");
        Ok(())
    }

    async fn create_topics(&mut self) -> Result<()> {
        let missing = diff::missing_topics(self.spec, &self.existing);
        self.gateway.create_topics(&missing).await?;
        self.report.created = missing.into_iter().map(|topic| topic.name).collect();
        Ok(())
    }

    async fn grow_partitions(&mut self) -> Result<()> {
        let candidates = diff::existing_declared(self.spec, &self.existing);
        let described = self.gateway.describe_topics(&candidates).await?;
        let plan = diff::plan_partitions(self.spec, &described);

        for (topic, change) in &plan.increases {
            tracing::debug!(
                %topic,
                from = change.from,
                to = change.to,
                "about to add {} partition(s)",
                change.to - change.from
            );
        }
        for drift in &plan.drift {
            tracing::warn!(
                topic = %drift.topic,
                desired = drift.desired,
                actual = drift.actual,
                "configured partition number is less than actual"
            );
        }

        self.gateway.increase_partitions(&plan.targets()).await?;
        self.report.partition_increases = plan.increases;
        self.report.partition_drift = plan.drift;
        Ok(())
    }

    async fn update_configs(&mut self) -> Result<()> {
        let candidates = diff::existing_declared(self.spec, &self.existing);
        let current = self.gateway.describe_configs(&candidates).await?;
        let plan = diff::plan_configs(self.spec, &current);

        for change in &plan.changes {
            match &change.kind {
                ConfigChangeKind::Changed { from, to } => tracing::warn!(
                    topic = %change.topic,
                    key = %change.key,
                    %from,
                    %to,
                    "config value changed"
                ),
                ConfigChangeKind::Added { value } => tracing::debug!(
                    topic = %change.topic,
                    key = %change.key,
                    %value,
                    "new config added"
                ),
            }
        }

        self.gateway.alter_configs(&plan.proposals).await?;
        self.report.config_changes = plan.changes;
        Ok(())
    }
}

/// Drives reconciliation passes against a cluster until one succeeds or the
/// retry policy gives up.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    retry: RetryPolicy,
    timeout: Duration,
    shutdown: Shutdown,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ReconciliationEngine {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown: Shutdown::new(),
        }
    }

    /// Deadline applied to every individual gateway call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Runs passes until one completes. `spec` is assumed to be validated and
    /// free of duplicate topic names.
    #[tracing::instrument(skip_all, fields(topics = spec.topics.len()))]
    pub async fn run<G>(&self, spec: &ProvisionSpec, gateway: &mut G) -> Result<Reconciliation>
    where
        G: ClusterAdminGateway + ?Sized,
    {
        let mut backoff = self.retry.backoff();
        let mut created = Vec::new();
        loop {
            let attempt = backoff.attempt();
            let bounded = BoundedGateway::new(&mut *gateway, self.timeout, &self.shutdown);
            let mut pass = Pass::new(spec, bounded);
            let outcome = pass.run().await;
            let mut report = pass.report;
            created.append(&mut report.created);
            let err = match outcome {
                Ok(()) => {
                    report.attempts = attempt;
                    report.created = created;
                    tracing::info!(attempt, %report, "topics provisioned");
                    return Ok(report);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            let delay = match backoff.next_delay() {
                Some(delay) if !self.shutdown.is_shutdown() => delay,
                _ => return Err(self.give_up(attempt, err)),
            };
            tracing::warn!(attempt, ?delay, error = %err, "reconciliation pass failed, retrying");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.wait() => return Err(self.give_up(attempt, err)),
            }
        }
    }

    fn give_up(&self, attempts: u32, last: ProvisionError) -> ProvisionError {
        let err = ProvisionError::Failed {
            attempts,
            source: Box::new(last),
        };
        tracing::error!(error = %err, "giving up on topic provisioning");
        err
    }
}
