//! Error types for the seqprobe core.
//!
//! Anomalies are not errors: they are counted by the verifier and never
//! propagate. These types cover invalid configuration and broker client
//! failures.

use std::time::Duration;

use thiserror::Error;

/// Invalid run configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Broker host is empty.
    #[error("broker address must not be empty")]
    EmptyHost,

    /// Port 0 cannot be connected to.
    #[error("port must be between 1 and 65535")]
    InvalidPort,

    /// At least one publisher is required.
    #[error("client count must be at least 1")]
    NoClients,

    /// A zero interval would spin.
    #[error("publish interval must be greater than zero")]
    ZeroInterval,

    /// A zero duration would end before anything is published.
    #[error("run duration must be greater than zero")]
    ZeroDuration,

    /// At least one handler worker is required.
    #[error("handler worker count must be at least 1")]
    NoWorkers,

    /// MQTT only knows QoS 0, 1 and 2.
    #[error("unsupported QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),
}

/// Failures reported by a broker client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Connection could not be established.
    #[error("connect failed for {client_id}: {reason}")]
    Connect {
        /// Client that tried to connect
        client_id: String,
        /// Transport error message
        reason: String,
    },

    /// Publish was rejected or could not be queued.
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic
        topic: String,
        /// Transport error message
        reason: String,
    },

    /// Subscription was rejected or could not be sent.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Disconnect did not complete cleanly.
    #[error("disconnect failed: {0}")]
    Disconnect(String),

    /// The session's connection is gone.
    #[error("connection closed")]
    Closed,

    /// Broker did not answer in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// How long we waited
        after: Duration,
    },
}

impl BrokerError {
    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Closed | Self::Timeout { .. })
    }
}
