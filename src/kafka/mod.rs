//! [`ClusterAdminGateway`] over the Kafka wire protocol.
//!
//! Connections are owned by the gateway and opened on first use: one to any
//! bootstrap broker for reads and one to the controller for mutations. A
//! connection whose request fails, times out or is interrupted is dropped and
//! reopened by the next call, so a retried pass starts over with fresh sockets.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use kafka_protocol::messages::create_partitions_request::CreatePartitionsTopic;
use kafka_protocol::messages::create_topics_request::{CreatableTopic, CreateableTopicConfig};
use kafka_protocol::messages::describe_configs_request::DescribeConfigsResource;
use kafka_protocol::messages::incremental_alter_configs_request::{
    AlterConfigsResource, AlterableConfig,
};
use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{
    CreatePartitionsRequest, CreateTopicsRequest, DescribeConfigsRequest,
    IncrementalAlterConfigsRequest, MetadataRequest, MetadataResponse,
};
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes};

use crate::config::ProvisionConfig;
use crate::gateway::{ClusterAdminGateway, ConfigEntry, TopicDescription, DEFAULT_REQUEST_TIMEOUT};
use crate::kafka::client::KafkaClient;
use crate::kafka::error::{BrokerError, UNKNOWN_TOPIC_OR_PARTITION};
use crate::kafka::util::{to_owned, topic_name, ToStrBytes};
use crate::spec::TopicSpec;

pub mod client;
pub mod codec;
pub mod error;
pub mod util;

const METADATA_VERSION: i16 = 1;
const CREATE_TOPICS_VERSION: i16 = 2;
const CREATE_PARTITIONS_VERSION: i16 = 1;
const DESCRIBE_CONFIGS_VERSION: i16 = 1;
const INCREMENTAL_ALTER_CONFIGS_VERSION: i16 = 0;

const TOPIC_RESOURCE: i8 = 2;
const OP_SET: i8 = 0;

#[derive(Debug)]
pub struct KafkaAdminGateway {
    bootstrap: Vec<String>,
    client_id: StrBytes,
    timeout: Duration,
    broker: Option<KafkaClient>,
    controller: Option<KafkaClient>,
}

impl KafkaAdminGateway {
    pub fn new(bootstrap: Vec<String>, client_id: &str) -> Self {
        Self {
            bootstrap,
            client_id: client_id.to_str_bytes(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            broker: None,
            controller: None,
        }
    }

    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self::new(config.bootstrap_servers(), &config.client_id)
            .with_timeout(config.request_timeout())
    }

    /// Server side timeout sent with mutating requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect_bootstrap(&self) -> Result<KafkaClient> {
        let mut last = anyhow!("no bootstrap servers configured");
        for addr in &self.bootstrap {
            match KafkaClient::connect(addr, self.client_id.clone()).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "bootstrap server unavailable");
                    last = e;
                }
            }
        }
        Err(last)
    }

    async fn connect_controller(&mut self) -> Result<KafkaClient> {
        let metadata = self.metadata(Some(&BTreeSet::new())).await?;
        let addr = controller_addr(&metadata)?;
        let client = KafkaClient::connect(&addr, self.client_id.clone()).await?;
        tracing::debug!(addr = client.addr(), "connected to controller");
        Ok(client)
    }

    // A connection is out of the gateway while its request is in flight and
    // only goes back once the response was read.
    async fn send_to_broker<R>(&mut self, request: &R, version: i16) -> Result<R::Response>
    where
        R: Request + Encodable + HeaderVersion,
        R::Response: Decodable + HeaderVersion,
    {
        let mut client = match self.broker.take() {
            Some(client) => client,
            None => self.connect_bootstrap().await?,
        };
        let response = client.send(request, version).await?;
        self.broker = Some(client);
        Ok(response)
    }

    async fn send_to_controller<R>(&mut self, request: &R, version: i16) -> Result<R::Response>
    where
        R: Request + Encodable + HeaderVersion,
        R::Response: Decodable + HeaderVersion,
    {
        let mut client = match self.controller.take() {
            Some(client) => client,
            None => self.connect_controller().await?,
        };
        let response = client.send(request, version).await?;
        self.controller = Some(client);
        Ok(response)
    }

    async fn metadata(&mut self, topics: Option<&BTreeSet<String>>) -> Result<MetadataResponse> {
        self.send_to_broker(&metadata_request(topics), METADATA_VERSION)
            .await
    }

    /// Fails with every broker error at once. A stale controller connection is
    /// dropped so the next call looks the controller up again.
    fn check(&mut self, errors: Vec<BrokerError>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        if errors.iter().any(BrokerError::is_not_controller) {
            self.controller = None;
        }
        let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("{}", errors.join(", "))
    }
}

#[async_trait]
impl ClusterAdminGateway for KafkaAdminGateway {
    async fn list_topic_names(&mut self) -> Result<BTreeSet<String>> {
        let metadata = self.metadata(None).await?;
        Ok(metadata
            .topics
            .iter()
            .filter(|(_, topic)| topic.error_code == 0 && !topic.is_internal)
            .map(|(name, _)| to_owned(&name.0))
            .collect())
    }

    async fn describe_topics(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, TopicDescription>> {
        let metadata = self.metadata(Some(names)).await?;
        let mut described = BTreeMap::new();
        let mut errors = Vec::new();
        for (name, topic) in &metadata.topics {
            let name = to_owned(&name.0);
            match topic.error_code {
                0 => {
                    let description = TopicDescription {
                        partition_count: topic.partitions.len() as u32,
                    };
                    described.insert(name, description);
                }
                UNKNOWN_TOPIC_OR_PARTITION => {
                    tracing::debug!(topic = %name, "topic disappeared before it was described")
                }
                code => errors.extend(BrokerError::check(code, &name, None)),
            }
        }
        self.check(errors)?;
        Ok(described)
    }

    async fn describe_configs(
        &mut self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        let response = self
            .send_to_broker(&describe_configs_request(names), DESCRIBE_CONFIGS_VERSION)
            .await?;
        let mut configs = BTreeMap::new();
        let mut errors = Vec::new();
        for result in &response.results {
            let name = to_owned(&result.resource_name);
            let message = result.error_message.as_ref().map(to_owned);
            if let Some(err) = BrokerError::check(result.error_code, &name, message.as_deref()) {
                errors.push(err);
                continue;
            }
            let entries = result
                .configs
                .iter()
                .filter_map(|entry| {
                    let value = entry.value.as_ref()?;
                    Some((to_owned(&entry.name), to_owned(value)))
                })
                .collect();
            configs.insert(name, entries);
        }
        self.check(errors)?;
        Ok(configs)
    }

    async fn create_topics(&mut self, topics: &[TopicSpec]) -> Result<()> {
        let request = create_topics_request(topics, self.timeout)?;
        let response = self
            .send_to_controller(&request, CREATE_TOPICS_VERSION)
            .await?;
        let errors = response
            .topics
            .iter()
            .filter_map(|(name, result)| {
                let message = result.error_message.as_ref().map(to_owned);
                BrokerError::check(result.error_code, &name.0, message.as_deref())
            })
            .collect();
        self.check(errors)
    }

    async fn increase_partitions(&mut self, targets: &BTreeMap<String, u32>) -> Result<()> {
        let request = create_partitions_request(targets, self.timeout)?;
        let response = self
            .send_to_controller(&request, CREATE_PARTITIONS_VERSION)
            .await?;
        let errors = response
            .results
            .iter()
            .filter_map(|result| {
                let message = result.error_message.as_ref().map(to_owned);
                BrokerError::check(result.error_code, &result.name.0, message.as_deref())
            })
            .collect();
        self.check(errors)
    }

    async fn alter_configs(
        &mut self,
        changes: &BTreeMap<String, BTreeSet<ConfigEntry>>,
    ) -> Result<()> {
        let response = self
            .send_to_controller(
                &incremental_alter_configs_request(changes),
                INCREMENTAL_ALTER_CONFIGS_VERSION,
            )
            .await?;
        let errors = response
            .responses
            .iter()
            .filter_map(|result| {
                let message = result.error_message.as_ref().map(to_owned);
                BrokerError::check(result.error_code, &result.resource_name, message.as_deref())
            })
            .collect();
        self.check(errors)
    }
}

fn controller_addr(metadata: &MetadataResponse) -> Result<String> {
    let broker = metadata
        .brokers
        .get(&metadata.controller_id)
        .ok_or_else(|| anyhow!("cluster has no known controller ({})", metadata.controller_id.0))?;
    let host: &str = &broker.host;
    Ok(format!("{}:{}", host, broker.port))
}

fn timeout_ms(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// `None` lists every topic.
fn metadata_request(topics: Option<&BTreeSet<String>>) -> MetadataRequest {
    let mut request = MetadataRequest::default();
    request.topics = topics.map(|names| {
        names
            .iter()
            .map(|name| {
                let mut topic = MetadataRequestTopic::default();
                topic.name = Some(topic_name(name));
                topic
            })
            .collect()
    });
    request
}

fn create_topics_request(topics: &[TopicSpec], timeout: Duration) -> Result<CreateTopicsRequest> {
    let mut request = CreateTopicsRequest::default();
    request.timeout_ms = timeout_ms(timeout);
    for spec in topics {
        let mut topic = CreatableTopic::default();
        topic.num_partitions = i32::try_from(spec.num_partitions)
            .map_err(|_| anyhow!("topic '{}' has too many partitions", spec.name))?;
        topic.replication_factor = i16::try_from(spec.replication_factor)
            .map_err(|_| anyhow!("topic '{}' has too many replicas", spec.name))?;
        for (key, value) in &spec.configs {
            let mut config = CreateableTopicConfig::default();
            config.value = Some(value.to_str_bytes());
            topic.configs.insert(key.to_str_bytes(), config);
        }
        request.topics.insert(topic_name(&spec.name), topic);
    }
    Ok(request)
}

fn create_partitions_request(
    targets: &BTreeMap<String, u32>,
    timeout: Duration,
) -> Result<CreatePartitionsRequest> {
    let mut request = CreatePartitionsRequest::default();
    request.timeout_ms = timeout_ms(timeout);
    for (name, count) in targets {
        let mut topic = CreatePartitionsTopic::default();
        topic.count = i32::try_from(*count)
            .map_err(|_| anyhow!("topic '{}' has too many partitions", name))?;
        topic.assignments = None;
        request.topics.insert(topic_name(name), topic);
    }
    Ok(request)
}

fn describe_configs_request(names: &BTreeSet<String>) -> DescribeConfigsRequest {
    let mut request = DescribeConfigsRequest::default();
    request.resources = names
        .iter()
        .map(|name| {
            let mut resource = DescribeConfigsResource::default();
            resource.resource_type = TOPIC_RESOURCE;
            resource.resource_name = name.to_str_bytes();
            resource.configuration_keys = None;
            resource
        })
        .collect();
    request
}

fn incremental_alter_configs_request(
    changes: &BTreeMap<String, BTreeSet<ConfigEntry>>,
) -> IncrementalAlterConfigsRequest {
    let mut request = IncrementalAlterConfigsRequest::default();
    for (name, entries) in changes {
        let mut resource = AlterConfigsResource::default();
        resource.resource_type = TOPIC_RESOURCE;
        resource.resource_name = name.to_str_bytes();
        for entry in entries {
            let mut config = AlterableConfig::default();
            config.name = entry.name.to_str_bytes();
            config.config_operation = OP_SET;
            config.value = Some(entry.value.to_str_bytes());
            resource.configs.push(config);
        }
        request.resources.push(resource);
    }
    request
}
