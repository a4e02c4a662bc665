//! An in-process cluster used to exercise the engine without a broker.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::Operation;
use crate::gateway::{ClusterAdminGateway, ConfigEntry, TopicDescription};
use crate::spec::{ClusterTopicState, TopicSpec};

/// A gateway call as it reached the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ListTopics,
    DescribeTopics(BTreeSet<String>),
    DescribeConfigs(BTreeSet<String>),
    CreateTopics(Vec<TopicSpec>),
    IncreasePartitions(BTreeMap<String, u32>),
    AlterConfigs(BTreeMap<String, BTreeSet<ConfigEntry>>),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::ListTopics => Operation::ListTopics,
            Call::DescribeTopics(_) => Operation::DescribeTopics,
            Call::DescribeConfigs(_) => Operation::DescribeConfigs,
            Call::CreateTopics(_) => Operation::CreateTopics,
            Call::IncreasePartitions(_) => Operation::CreatePartitions,
            Call::AlterConfigs(_) => Operation::AlterConfigs,
        }
    }
}

#[derive(Clone, Debug)]
struct Fault {
    operation: Option<Operation>,
    remaining: Option<usize>,
    hang: bool,
}

impl Fault {
    fn matches(&self, operation: Operation) -> bool {
        self.remaining != Some(0) && self.operation.map_or(true, |op| op == operation)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    topics: BTreeMap<String, ClusterTopicState>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: ClusterTopicState) -> Self {
        self.topics.insert(topic.name.clone(), topic);
        self
    }

    pub fn topic(&self, name: &str) -> Option<&ClusterTopicState> {
        self.topics.get(name)
    }

    pub fn topics(&self) -> &BTreeMap<String, ClusterTopicState> {
        &self.topics
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn mutating_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|call| call.operation().is_mutating())
            .collect()
    }

    pub fn calls_to(&self, operation: Operation) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|call| call.operation() == operation)
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Fails the next `times` calls, whatever they are.
    pub fn fail_next(&mut self, times: usize) {
        self.faults.push(Fault {
            operation: None,
            remaining: Some(times),
            hang: false,
        });
    }

    /// Fails every call from now on.
    pub fn fail_always(&mut self) {
        self.faults.push(Fault {
            operation: None,
            remaining: None,
            hang: false,
        });
    }

    /// Fails the next `times` calls of one operation.
    pub fn fail_operation(&mut self, operation: Operation, times: usize) {
        self.faults.push(Fault {
            operation: Some(operation),
            remaining: Some(times),
            hang: false,
        });
    }

    /// Never answers calls of one operation.
    pub fn hang_operation(&mut self, operation: Operation) {
        self.faults.push(Fault {
            operation: Some(operation),
            remaining: None,
            hang: true,
        });
    }

    async fn record(&mut self, call: Call) -> Result<()> {
        let operation = call.operation();
        self.calls.push(call);

        let fault = match self.faults.iter_mut().find(|f| f.matches(operation)) {
            Some(fault) => fault,
            None => return Ok(()),
        };
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        if fault.hang {
            std::future::pending::<()>().await;
        }
        Err(anyhow!("injected failure during {}", operation))
    }

    fn existing<'s>(
        &'s self,
        names: &'s BTreeSet<String>,
    ) -> impl Iterator<Item = &'s ClusterTopicState> + 's {
        names.iter().filter_map(move |name| self.topics.get(name))
    }
}

#[async_trait]
impl ClusterAdminGateway for MemoryCluster {
    async fn list_topic_names(&mut self) -> Result<BTreeSet<String>> {
        self.record(Call::ListTopics).await?;
        Ok(self.topics.keys().cloned().collect())
    }

    async fn describe_topics(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, TopicDescription>> {
        self.record(Call::DescribeTopics(names.clone())).await?;
        Ok(self
            .existing(names)
            .map(|topic| {
                let description = TopicDescription {
                    partition_count: topic.partition_count,
                };
                (topic.name.clone(), description)
            })
            .collect())
    }

    async fn describe_configs(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        self.record(Call::DescribeConfigs(names.clone())).await?;
        Ok(self
            .existing(names)
            .map(|topic| (topic.name.clone(), topic.configs.clone()))
            .collect())
    }

    async fn create_topics(&mut self, topics: &[TopicSpec]) -> Result<()> {
        self.record(Call::CreateTopics(topics.to_vec())).await?;
        if let Some(topic) = topics.iter().find(|t| self.topics.contains_key(&t.name)) {
            return Err(anyhow!("topic '{}' already exists", topic.name));
        }
        for topic in topics {
            self.topics.insert(topic.name.clone(), ClusterTopicState::from(topic));
        }
        Ok(())
    }

    async fn increase_partitions(&mut self, targets: &BTreeMap<String, u32>) -> Result<()> {
        self.record(Call::IncreasePartitions(targets.clone())).await?;
        for (name, count) in targets {
            let topic = self
                .topics
                .get(name)
                .ok_or_else(|| anyhow!("unknown topic '{}'", name))?;
            if *count <= topic.partition_count {
                return Err(anyhow!(
                    "topic '{}' already has {} partitions",
                    name,
                    topic.partition_count
                ));
            }
        }
        for (name, count) in targets {
            if let Some(topic) = self.topics.get_mut(name) {
                topic.partition_count = *count;
            }
        }
        Ok(())
    }

    async fn alter_configs(
        &mut self,
        changes: &BTreeMap<String, BTreeSet<ConfigEntry>>,
    ) -> Result<()> {
        self.record(Call::AlterConfigs(changes.clone())).await?;
        if let Some(name) = changes.keys().find(|name| !self.topics.contains_key(*name)) {
            return Err(anyhow!("unknown topic '{}'", name));
        }
        for (name, entries) in changes {
            if let Some(topic) = self.topics.get_mut(name) {
                for entry in entries {
                    topic.configs.insert(entry.name.clone(), entry.value.clone());
                }
            }
        }
        Ok(())
    }
}
