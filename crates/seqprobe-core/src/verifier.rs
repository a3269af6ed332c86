//! Inbound message verification.
//!
//! Flow per message: decode the payload as UTF-8, parse it as an integer,
//! feed it to the [`SequenceTracker`], count anomalies, ask the
//! [`ErrorPolicy`] what to do. The verifier returns the decision; acting on an
//! abort (triggering cancellation) is up to the caller.

use std::sync::Arc;

use crate::{
    counters::RunCounters,
    policy::{AnomalyContext, AnomalyKind, ErrorPolicy, PolicyDecision},
    tracker::{MODULUS, SequenceTracker, Verdict},
};

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Topic history not yet seeded.
    Seeding,
    /// Value continued the sequence.
    Accepted,
    /// Value broke the sequence or could not be parsed.
    Anomaly {
        /// What was wrong
        context: AnomalyContext,
        /// What the policy decided
        decision: PolicyDecision,
    },
}

impl MessageOutcome {
    /// Whether the caller must stop the run.
    pub fn requires_abort(&self) -> bool {
        matches!(self, Self::Anomaly { decision: PolicyDecision::Abort, .. })
    }
}

/// Sequence verifier shared by all subscriber handler workers.
#[derive(Debug)]
pub struct SequenceVerifier {
    tracker: SequenceTracker,
    counters: Arc<RunCounters>,
    policy: ErrorPolicy,
}

impl SequenceVerifier {
    /// Create a verifier that counts into `counters`.
    pub fn new(policy: ErrorPolicy, counters: Arc<RunCounters>) -> Self {
        Self { tracker: SequenceTracker::new(), counters, policy }
    }

    /// Handle one inbound message.
    ///
    /// # Invariants
    ///
    /// - Post: `sequence_errors` grew by exactly one iff the outcome is
    ///   `Anomaly`
    /// - Post: a malformed or out-of-range payload leaves the topic history
    ///   untouched
    pub fn handle(&self, topic: &str, payload: &[u8]) -> MessageOutcome {
        self.counters.record_received();

        let Some(value) = parse_payload(payload) else {
            let context = AnomalyContext {
                topic: topic.to_string(),
                kind: AnomalyKind::Malformed { payload: String::from_utf8_lossy(payload).into_owned() },
            };
            let total = self.counters.record_malformed();
            return self.decide(context, total);
        };

        if !(0..MODULUS).contains(&value) {
            let context = AnomalyContext { topic: topic.to_string(), kind: AnomalyKind::OutOfRange { value } };
            let total = self.counters.record_sequence_error();
            return self.decide(context, total);
        }

        let observation = self.tracker.observe(topic, value);
        match observation.verdict {
            Verdict::Seeding => {
                tracing::trace!(topic, value, "seeding");
                MessageOutcome::Seeding
            },
            Verdict::Accepted => {
                tracing::trace!(topic, value, "accepted");
                MessageOutcome::Accepted
            },
            Verdict::Anomaly { expected } => {
                let context = AnomalyContext {
                    topic: topic.to_string(),
                    kind: AnomalyKind::OutOfOrder {
                        previous: observation.previous,
                        actual: observation.actual,
                        received: value,
                        expected,
                    },
                };
                let total = self.counters.record_sequence_error();
                self.decide(context, total)
            },
        }
    }

    /// Topic history tracker (for inspection).
    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// Counters this verifier writes to.
    pub fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    /// Active error policy.
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    fn decide(&self, context: AnomalyContext, total: u64) -> MessageOutcome {
        let decision = self.policy.on_anomaly(&context);

        match decision {
            PolicyDecision::Abort => tracing::warn!(total, "{context}, stopping run"),
            PolicyDecision::Continue => tracing::warn!(total, "{context}"),
        }

        MessageOutcome::Anomaly { context, decision }
    }
}

/// Parse a payload as a decimal integer. Surrounding whitespace is ignored.
fn parse_payload(payload: &[u8]) -> Option<i64> {
    std::str::from_utf8(payload).ok()?.trim().parse().ok()
}
