//! Broker client capability.
//!
//! The harness never speaks the broker protocol itself. It needs a client that
//! can connect, publish text payloads, subscribe to a set of topics and hand
//! back inbound messages. Production uses an MQTT client over TCP; tests use an
//! in-process broker with fault injection.
//!
//! # Invariants
//!
//! Implementations MUST guarantee:
//!
//! - `subscribe()` returns only after the broker acknowledged every filter, so
//!   a message published afterwards on a matching topic is delivered
//! - `recv()` is cancel-safe: dropping its future loses no message
//! - `recv()` returns `None` once the inbound stream has ended for good
//! - dropping a session releases its connection even without `disconnect()`

use std::future::Future;

use bytes::Bytes;

use crate::error::BrokerError;

/// Message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create a message from a topic and payload.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

/// Factory for broker sessions.
///
/// The broker value carries the endpoint (host and port) and transport
/// options; `connect` opens one client connection to it.
pub trait Broker: Clone + Send + Sync + 'static {
    /// Connected client handle.
    type Session: BrokerSession;

    /// Open a connection identified by `client_id`.
    fn connect(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Result<Self::Session, BrokerError>> + Send;
}

/// One connected broker client.
pub trait BrokerSession: Send + 'static {
    /// Publish a text payload to `topic`.
    fn publish(
        &mut self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribe to every topic in `topics` and wait for the acknowledgement.
    fn subscribe(
        &mut self,
        topics: &[String],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Next inbound message, or `None` once the connection is gone.
    fn recv(&mut self) -> impl Future<Output = Option<InboundMessage>> + Send;

    /// Close the connection.
    fn disconnect(self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}
