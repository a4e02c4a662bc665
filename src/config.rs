use std::time::Duration;

use crate::error::{ProvisionError, Result};
use crate::retry::RetryPolicy;
use crate::spec::{ProvisionSpec, TopicSpec};

const ENV_PREFIX: &str = "PROVISION";
const DEFAULT_CLIENT_ID: &str = "provisioning-admin-client";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Everything needed to provision topics on one cluster.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Comma separated `host:port` bootstrap list.
    pub brokers: String,
    /// Skips provisioning entirely when false.
    pub enabled: bool,
    /// Client id presented to the brokers.
    pub client_id: String,
    /// Deadline for every admin request.
    pub request_timeout_ms: u64,
    pub auto_create_topics: bool,
    pub auto_add_partitions: bool,
    pub auto_update_config: bool,
    pub topics: Vec<TopicSpec>,
    pub retry: RetryPolicy,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        let spec = ProvisionSpec::default();
        Self {
            brokers: String::new(),
            enabled: true,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            auto_create_topics: spec.auto_create_topics,
            auto_add_partitions: spec.auto_add_partitions,
            auto_update_config: spec.auto_update_config,
            topics: spec.topics,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProvisionConfig {
    /// Validates the configuration, ensuring all values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.bootstrap_servers().is_empty() {
            return Err(ProvisionError::validation("brokers must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ProvisionError::validation(
                "request_timeout_ms must be at least 1",
            ));
        }
        self.retry.validate()?;
        self.spec().validate()
    }

    pub fn spec(&self) -> ProvisionSpec {
        ProvisionSpec {
            topics: self.topics.clone(),
            auto_create_topics: self.auto_create_topics,
            auto_add_partitions: self.auto_add_partitions,
            auto_update_config: self.auto_update_config,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Reads the config file, then lets `PROVISION__*` environment variables
/// override individual keys.
pub fn config<P: AsRef<std::path::Path>>(config_path: P) -> Result<ProvisionConfig> {
    let path = config_path.as_ref();
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| {
            ProvisionError::validation(format!("could not read {}: {}", path.display(), e))
        })?;

    settings
        .try_deserialize()
        .map_err(|e| ProvisionError::validation(format!("could not create configuration: {}", e)))
}
