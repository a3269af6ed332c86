//! Runner error types.

use seqprobe_core::{BrokerError, ConfigError};
use thiserror::Error;

/// Errors that prevent a run from producing a report.
#[derive(Error, Debug)]
pub enum RunError {
    /// Configuration rejected before anything was started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The subscriber could not connect or subscribe, or lost its inbound
    /// stream. Nothing was verified, so there is nothing to report.
    #[error("subscriber unavailable: {0}")]
    SubscriberUnavailable(BrokerError),

    /// A handler worker or the subscriber task died. Part of the traffic went
    /// unverified, so the counters cannot be trusted.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

/// Command line could not be turned into a run configuration.
///
/// Displays the offending detail followed by the usage text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}\n\n{usage}")]
pub struct UsageError {
    /// What was wrong with the arguments
    pub reason: String,
    /// Usage text for the current platform
    pub usage: String,
}
