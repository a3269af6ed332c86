//! Run configuration.

use std::time::Duration;

use crate::{error::ConfigError, policy::ErrorPolicy};

/// MQTT delivery guarantee used for publishes and subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QosLevel {
    /// QoS 0
    #[default]
    AtMostOnce,
    /// QoS 1
    AtLeastOnce,
    /// QoS 2
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other)),
        }
    }
}

/// Configuration for one run.
///
/// Built once by the CLI layer, validated, then shared read-only with every
/// agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Broker host name or IP address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Prefix for publisher topics (`prefix + client number`)
    pub topic_prefix: String,
    /// Number of publishers
    pub client_count: u32,
    /// Delay between two publishes of one publisher
    pub publish_interval: Duration,
    /// Wall-clock length of the run
    pub run_duration: Duration,
    /// Reaction to anomalies
    pub policy: ErrorPolicy,
    /// Delivery guarantee for publishes and subscriptions
    pub qos: QosLevel,
    /// Prefix for MQTT client identifiers. Must be unique per concurrent run
    /// against the same broker.
    pub client_id_prefix: String,
    /// Number of subscriber handler workers
    pub handler_workers: usize,
    /// Upper bound on waiting for agents after a stop was requested
    pub shutdown_grace: Duration,
    /// Upper bound on connecting and subscribing
    pub connect_timeout: Duration,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic_prefix: "seqprobe/".to_string(),
            client_count: 1,
            publish_interval: Duration::from_millis(100),
            run_duration: Duration::from_secs(60),
            policy: ErrorPolicy::default(),
            qos: QosLevel::default(),
            client_id_prefix: "seqprobe".to_string(),
            handler_workers: 4,
            shutdown_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    /// Check the configuration for values that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.client_count == 0 {
            return Err(ConfigError::NoClients);
        }
        if self.publish_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.run_duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.handler_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Topic published by client `client` (1-based).
    pub fn topic_for(&self, client: u32) -> String {
        format!("{}{client}", self.topic_prefix)
    }

    /// All publisher topics, in client order.
    pub fn topics(&self) -> Vec<String> {
        (1..=self.client_count).map(|client| self.topic_for(client)).collect()
    }

    /// MQTT client identifier of publisher `client`.
    pub fn publisher_client_id(&self, client: u32) -> String {
        format!("{}-pub-{client}", self.client_id_prefix)
    }

    /// MQTT client identifier of the subscriber.
    pub fn subscriber_client_id(&self) -> String {
        format!("{}-sub", self.client_id_prefix)
    }
}
