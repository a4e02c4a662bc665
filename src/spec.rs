use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ProvisionError, Result};

/// Longest topic name a broker accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Declared state of a single topic.
///
/// `configs` only lists the keys that should be enforced; anything else the
/// broker holds for the topic is left alone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicSpec {
    pub name: String,
    pub num_partitions: u32,
    pub replication_factor: u16,
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, num_partitions: u32, replication_factor: u16) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            configs: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_topic_name(&self.name)?;
        if self.num_partitions < 1 {
            return Err(ProvisionError::validation(format!(
                "topic '{}': num_partitions must be at least 1",
                self.name
            )));
        }
        if self.replication_factor < 1 {
            return Err(ProvisionError::validation(format!(
                "topic '{}': replication_factor must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// The full declared state handed to the reconciliation engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionSpec {
    pub topics: Vec<TopicSpec>,
    pub auto_create_topics: bool,
    pub auto_add_partitions: bool,
    pub auto_update_config: bool,
}

impl Default for ProvisionSpec {
    fn default() -> Self {
        Self {
            topics: vec![],
            auto_create_topics: true,
            auto_add_partitions: true,
            auto_update_config: true,
        }
    }
}

impl ProvisionSpec {
    pub fn with_topics(topics: Vec<TopicSpec>) -> Self {
        Self {
            topics,
            ..Default::default()
        }
    }

    pub fn topic(&self, name: &str) -> Option<&TopicSpec> {
        self.topics.iter().find(|topic| topic.name == name)
    }

    /// Validates every topic and rejects duplicate names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for topic in &self.topics {
            topic.validate()?;
            if !seen.insert(topic.name.as_str()) {
                return Err(ProvisionError::validation(format!(
                    "topic '{}' is declared more than once",
                    topic.name
                )));
            }
        }
        Ok(())
    }
}

/// A topic as the broker reports it at the moment of the read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterTopicState {
    pub name: String,
    pub partition_count: u32,
    pub configs: BTreeMap<String, String>,
}

impl ClusterTopicState {
    pub fn new(name: impl Into<String>, partition_count: u32) -> Self {
        Self {
            name: name.into(),
            partition_count,
            configs: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }
}

impl From<&TopicSpec> for ClusterTopicState {
    fn from(spec: &TopicSpec) -> Self {
        Self {
            name: spec.name.clone(),
            partition_count: spec.num_partitions,
            configs: spec.configs.clone(),
        }
    }
}

// bounded quantifier keeps the length check inside the pattern
static TOPIC_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,249}$").expect("topic name pattern"));

pub fn validate_topic_name(name: &str) -> Result<()> {
    if TOPIC_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::validation(format!(
            "'{}' is not a legal topic name: use 1 to {} characters from [A-Za-z0-9._-]",
            name, MAX_TOPIC_NAME_LEN
        )))
    }
}
