//! Failure-response policy for detected anomalies.

use std::fmt;

/// What went wrong with a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Value parsed but broke the sequence.
    OutOfOrder {
        /// `previous` slot before the observation.
        previous: Option<i64>,
        /// `actual` slot before the observation.
        actual: Option<i64>,
        /// Value that arrived.
        received: i64,
        /// Value the sequence called for.
        expected: i64,
    },
    /// Payload was an integer outside the published cycle.
    OutOfRange {
        /// Value that arrived.
        value: i64,
    },
    /// Payload was not an integer.
    Malformed {
        /// Payload as received (lossy UTF-8).
        payload: String,
    },
}

/// Everything the policy (and the log line) knows about one anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyContext {
    /// Topic the message arrived on.
    pub topic: String,
    /// Anomaly details.
    pub kind: AnomalyKind,
}

impl fmt::Display for AnomalyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AnomalyKind::OutOfOrder { previous, actual, received, expected } => write!(
                f,
                "sequence error on {}: previous = {}, actual = {}, received = {received}, expected = {expected}",
                self.topic,
                slot(*previous),
                slot(*actual),
            ),
            AnomalyKind::OutOfRange { value } => {
                write!(f, "value out of range received on {}: {value}", self.topic)
            },
            AnomalyKind::Malformed { payload } => {
                write!(f, "non-integer value received on {}: {payload:?}", self.topic)
            },
        }
    }
}

fn slot(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Decision returned by [`ErrorPolicy::on_anomaly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Tally the anomaly and keep running.
    Continue,
    /// Stop the whole run.
    Abort,
}

/// How the run reacts to anomalies.
///
/// Counting happens regardless of the policy; the policy only decides whether
/// the run goes on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort on the first anomaly.
    StopAtFirst,
    /// Count every anomaly and run until the deadline.
    #[default]
    Count,
}

impl ErrorPolicy {
    /// Decide what to do about an anomaly.
    pub fn on_anomaly(&self, _context: &AnomalyContext) -> PolicyDecision {
        match self {
            Self::StopAtFirst => PolicyDecision::Abort,
            Self::Count => PolicyDecision::Continue,
        }
    }

    /// Map the numeric behaviour option used on the command line
    /// (`1` stop at first, `2` count).
    pub fn from_behaviour(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::StopAtFirst),
            2 => Some(Self::Count),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopAtFirst => f.write_str("stop at first anomaly"),
            Self::Count => f.write_str("count anomalies"),
        }
    }
}
