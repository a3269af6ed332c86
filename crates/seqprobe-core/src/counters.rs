//! Run-scoped counters.
//!
//! Mutated concurrently by handler workers and publishers, read once by the
//! coordinator after shutdown. All counters only ever increase.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for one run.
#[derive(Debug, Default)]
pub struct RunCounters {
    sequence_errors: AtomicU64,
    malformed: AtomicU64,
    received: AtomicU64,
    published: AtomicU64,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Anomalies of any kind (out-of-order plus malformed).
    pub sequence_errors: u64,
    /// Malformed payloads (included in `sequence_errors`).
    pub malformed: u64,
    /// Messages handled by the verifier.
    pub received: u64,
    /// Successful publishes across all publishers.
    pub published: u64,
}

impl RunCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an out-of-order anomaly. Returns the new error total.
    pub fn record_sequence_error(&self) -> u64 {
        self.sequence_errors.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count a malformed payload, which is also an anomaly. Returns the new
    /// error total.
    pub fn record_malformed(&self) -> u64 {
        self.malformed.fetch_add(1, Ordering::AcqRel);
        self.record_sequence_error()
    }

    /// Count a message handed to the verifier.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful publish.
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Total anomalies so far.
    pub fn sequence_errors(&self) -> u64 {
        self.sequence_errors.load(Ordering::Acquire)
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sequence_errors: self.sequence_errors.load(Ordering::Acquire),
            malformed: self.malformed.load(Ordering::Acquire),
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}
