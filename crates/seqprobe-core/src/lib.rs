//! Core logic for the seqprobe broker resilience harness.
//!
//! Publishers emit a cyclic integer sequence (`0..MODULUS`, repeating) on their
//! own topic, and a single subscriber checks that every topic's received
//! sequence advances by exactly one, modulo [`MODULUS`]. A gap, a skip or a
//! malformed payload is evidence that the broker lost or mangled a message.
//!
//! # Architecture
//!
//! This crate holds the Sans-IO half of the harness. Nothing in here performs
//! network I/O or spawns tasks; the runner crate drives these types from its
//! async agents.
//!
//! # Components
//!
//! - [`SequenceTracker`]: per-topic two-slot history and validator
//! - [`ErrorPolicy`]: abort-or-tally decision for every anomaly
//! - [`SequenceVerifier`]: inbound message handler (decode, track, count, decide)
//! - [`RunCounters`]: run-scoped atomic counters
//! - [`CancellationSignal`]: idempotent stop token shared by every agent
//! - [`RunConfig`]: validated, immutable run configuration
//! - [`RunReport`]: final outcome of a run
//! - [`broker`]: capability traits a broker client must provide

#![forbid(unsafe_code)]

pub mod broker;
mod config;
mod counters;
mod error;
mod policy;
mod report;
mod signal;
mod tracker;
mod verifier;

pub use broker::{Broker, BrokerSession, InboundMessage};
pub use config::{QosLevel, RunConfig};
pub use counters::{CounterSnapshot, RunCounters};
pub use error::{BrokerError, ConfigError};
pub use policy::{AnomalyContext, AnomalyKind, ErrorPolicy, PolicyDecision};
pub use report::{Outcome, RunReport};
pub use signal::{CancellationSignal, StopCause};
pub use tracker::{MODULUS, Observation, SequenceTracker, TopicSequenceState, Verdict, successor};
pub use verifier::{MessageOutcome, SequenceVerifier};
