use std::fmt::{Display, Formatter};

/// A non-zero error code returned by a broker for one resource of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError {
    pub code: i16,
    pub resource: String,
    pub message: Option<String>,
}

impl BrokerError {
    /// Returns `None` for the success code.
    pub fn check(code: i16, resource: &str, message: Option<&str>) -> Option<BrokerError> {
        if code == 0 {
            return None;
        }
        Some(BrokerError {
            code,
            resource: resource.to_string(),
            message: message.map(str::to_string),
        })
    }

    pub fn name(&self) -> &'static str {
        error_name(self.code)
    }

    /// The request went to a broker that is no longer the controller.
    pub fn is_not_controller(&self) -> bool {
        self.code == NOT_CONTROLLER
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for '{}' (error code {})", self.name(), self.resource, self.code)?;
        match &self.message {
            Some(message) => write!(f, ": {}", message),
            None => Ok(()),
        }
    }
}

impl std::error::Error for BrokerError {}

pub const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
pub const NOT_CONTROLLER: i16 = 41;

fn error_name(code: i16) -> &'static str {
    match code {
        -1 => "UNKNOWN_SERVER_ERROR",
        3 => "UNKNOWN_TOPIC_OR_PARTITION",
        7 => "REQUEST_TIMED_OUT",
        17 => "INVALID_TOPIC_EXCEPTION",
        29 => "TOPIC_AUTHORIZATION_FAILED",
        31 => "CLUSTER_AUTHORIZATION_FAILED",
        35 => "UNSUPPORTED_VERSION",
        36 => "TOPIC_ALREADY_EXISTS",
        37 => "INVALID_PARTITIONS",
        38 => "INVALID_REPLICATION_FACTOR",
        40 => "INVALID_CONFIG",
        41 => "NOT_CONTROLLER",
        42 => "INVALID_REQUEST",
        44 => "POLICY_VIOLATION",
        _ => "UNEXPECTED_ERROR",
    }
}
