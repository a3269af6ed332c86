//! Per-topic sequence tracking.
//!
//! Every topic keeps the two most recently observed values. The first two
//! observations seed the history. The third checks the seeded pair (`actual`
//! must follow `previous`) as well as the new value; from then on each new
//! value must be the successor (modulo [`MODULUS`]) of the newest retained
//! value. Every adjacent pair of delivered values is checked exactly once.
//!
//! The history always shifts forward, even on an anomaly. A single lost or
//! duplicated message therefore produces one anomaly and the topic is back in
//! sync on the next in-order value.
//!
//! # Concurrency
//!
//! The topic map is guarded by a short-lived lock that only resolves (or
//! creates) a topic's entry. The entry itself has its own lock, so updates to
//! one topic are linearized while different topics never contend beyond the
//! map lookup.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Cycle length of the publisher payload sequence (`0..MODULUS`).
pub const MODULUS: i64 = 10;

/// Two-slot history of the values seen on one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicSequenceState {
    /// Older of the two most recently seen values.
    pub previous: Option<i64>,
    /// Newer of the two most recently seen values.
    pub actual: Option<i64>,
    /// Whether the seeded pair has been checked.
    seed_checked: bool,
}

impl TopicSequenceState {
    /// Value the next observation must carry, once the history is seeded.
    pub fn expected_next(&self) -> Option<i64> {
        match (self.previous, self.actual) {
            (Some(_), Some(actual)) => Some(successor(actual)),
            _ => None,
        }
    }

    fn record(&mut self, value: i64) -> Verdict {
        match (self.previous, self.actual) {
            (None, _) => {
                self.previous = Some(value);
                Verdict::Seeding
            },
            (Some(_), None) => {
                self.actual = Some(value);
                Verdict::Seeding
            },
            (Some(previous), Some(actual)) => {
                let seed_gap = !self.seed_checked && actual != successor(previous);
                self.seed_checked = true;
                self.previous = Some(actual);
                self.actual = Some(value);

                if seed_gap {
                    Verdict::Anomaly { expected: successor(previous) }
                } else if value != successor(actual) {
                    Verdict::Anomaly { expected: successor(actual) }
                } else {
                    Verdict::Accepted
                }
            },
        }
    }
}

/// Successor of `value` in the cycle. Values outside `0..MODULUS` are reduced
/// first, so any `i64` is safe.
pub fn successor(value: i64) -> i64 {
    (value.rem_euclid(MODULUS) + 1) % MODULUS
}

/// Result of validating one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fewer than two values seen before this one; nothing to validate yet.
    Seeding,
    /// Value is the successor of the newest retained value.
    Accepted,
    /// Value breaks the sequence.
    ///
    /// On the third observation this also covers a broken seeded pair; if
    /// both pairs are broken it is still one anomaly, and `expected` names the
    /// value missing after `previous`.
    Anomaly {
        /// Value the sequence called for.
        expected: i64,
    },
}

impl Verdict {
    /// Whether this verdict is an anomaly.
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::Anomaly { .. })
    }
}

/// Verdict plus the history as it stood before the observation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Validation result.
    pub verdict: Verdict,
    /// `previous` slot before the shift.
    pub previous: Option<i64>,
    /// `actual` slot before the shift.
    pub actual: Option<i64>,
}

/// Shared per-topic sequence validator.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    topics: Mutex<HashMap<String, Arc<Mutex<TopicSequenceState>>>>,
}

impl SequenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` on `topic` and validate it against the topic history.
    ///
    /// # Invariants
    ///
    /// - Post: the topic retains at most two values
    /// - Post: `actual` holds `value` once the topic has seen two or more values
    pub fn observe(&self, topic: &str, value: i64) -> Observation {
        let entry = self.entry(topic);
        let mut state = entry.lock().unwrap_or_else(PoisonError::into_inner);

        let before = *state;
        let verdict = state.record(value);

        debug_assert!(state.previous.is_some());
        debug_assert!(verdict == Verdict::Seeding || state.actual == Some(value));

        Observation { verdict, previous: before.previous, actual: before.actual }
    }

    /// Current history of `topic`. Unknown topics report `(None, None)`.
    pub fn snapshot(&self, topic: &str) -> TopicSequenceState {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .map(|entry| *entry.lock().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_default()
    }

    /// Number of topics observed so far.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn entry(&self, topic: &str) -> Arc<Mutex<TopicSequenceState>> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = topics.get(topic) {
            return Arc::clone(entry);
        }

        let entry = Arc::new(Mutex::new(TopicSequenceState::default()));
        topics.insert(topic.to_string(), Arc::clone(&entry));
        entry
    }
}
