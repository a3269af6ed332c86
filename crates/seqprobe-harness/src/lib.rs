//! Test harness for seqprobe.
//!
//! [`MemoryBroker`] is an in-process publish/subscribe broker implementing the
//! [`seqprobe_core::Broker`] capability. It lets the real publisher, subscriber
//! and coordinator run end to end without a network, under tokio's paused
//! clock, while injecting the failures the harness exists to detect.
//!
//! # Fault injection
//!
//! - drop the n-th publish on a topic
//! - replace the n-th payload on a topic (e.g. with garbage)
//! - refuse connections for a client id
//! - sever a connected client (inbound stream ends, publishes fail)
//! - seeded random message loss
//!
//! # Journal
//!
//! Every broker-side event is appended to a [`JournalEntry`] log, which tests
//! use to check ordering properties such as "no publish on a topic before the
//! subscriber's subscription to it".

#![forbid(unsafe_code)]

mod memory_broker;
mod topic;

pub use memory_broker::{Fault, JournalEntry, MemoryBroker, MemorySession};
pub use topic::topic_matches;
