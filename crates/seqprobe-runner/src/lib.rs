//! Async runtime for the seqprobe broker resilience harness.
//!
//! Drives the Sans-IO types from [`seqprobe_core`] with tokio tasks and a real
//! MQTT client.
//!
//! # Architecture
//!
//! ```text
//! RunCoordinator ── spawns ──> SubscriberAgent ── spawns ──> N × PublisherAgent
//!       │                         │   ▲                            │
//!       │ deadline                │   └────── broker ◄─────────────┘
//!       ▼                         ▼
//! CancellationSignal ◄── abort ── handler workers (SequenceVerifier)
//! ```
//!
//! Every agent is generic over [`seqprobe_core::Broker`]: production uses
//! [`MqttBroker`], tests use the in-memory broker from `seqprobe-harness`.
//!
//! # Components
//!
//! - [`RunCoordinator`]: run lifetime, deadline and report
//! - [`SubscriberAgent`]: subscribe, spawn publishers, route to handler workers
//! - [`PublisherAgent`]: one cyclic sequence per topic
//! - [`MqttBroker`]: rumqttc-backed broker capability
//! - [`cli`] and [`prompt`]: how run parameters reach the binary

#![forbid(unsafe_code)]

pub mod cli;
mod coordinator;
mod error;
mod mqtt;
pub mod prompt;
mod publisher;
mod subscriber;

pub use coordinator::RunCoordinator;
pub use error::{RunError, UsageError};
pub use mqtt::{MqttBroker, MqttSession};
pub use publisher::PublisherAgent;
pub use subscriber::SubscriberAgent;
