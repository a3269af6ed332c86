//! MQTT transport via rumqttc.
//!
//! rumqttc splits a connection into an [`AsyncClient`] (requests) and an
//! [`EventLoop`] that must be polled for anything to happen. [`MqttSession`]
//! polls the event loop in a background task, forwarding PUBLISH packets and
//! SUBACKs over channels, so callers only ever deal with the session.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use seqprobe_core::{Broker, BrokerError, BrokerSession, InboundMessage, QosLevel, RunConfig};
use tokio::{sync::mpsc, task::JoinHandle};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// Smallest keep-alive rumqttc accepts.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// MQTT 3.1.1 broker endpoint.
#[derive(Debug, Clone)]
pub struct MqttBroker {
    host: String,
    port: u16,
    qos: QoS,
    keep_alive: Duration,
    connect_timeout: Duration,
}

impl MqttBroker {
    /// Endpoint and transport options taken from a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            qos: qos(config.qos),
            keep_alive: config.keep_alive.max(MIN_KEEP_ALIVE),
            connect_timeout: config.connect_timeout,
        }
    }
}

impl Broker for MqttBroker {
    type Session = MqttSession;

    async fn connect(&self, client_id: &str) -> Result<MqttSession, BrokerError> {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        match tokio::time::timeout(self.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                return Err(BrokerError::Connect {
                    client_id: client_id.to_string(),
                    reason: e.to_string(),
                });
            },
            Err(_) => {
                return Err(BrokerError::Timeout { operation: "connect", after: self.connect_timeout });
            },
        }

        tracing::debug!(client_id, host = %self.host, port = self.port, "mqtt connected");

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(eventloop, inbound_tx, ack_tx, client_id.to_string()));

        Ok(MqttSession {
            client,
            qos: self.qos,
            ack_timeout: self.connect_timeout,
            inbound: inbound_rx,
            acks: ack_rx,
            driver,
        })
    }
}

/// One MQTT connection.
///
/// Dropping the session aborts its event loop task, which closes the socket.
pub struct MqttSession {
    client: AsyncClient,
    qos: QoS,
    ack_timeout: Duration,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    acks: mpsc::UnboundedReceiver<Result<(), BrokerError>>,
    driver: JoinHandle<()>,
}

impl BrokerSession for MqttSession {
    async fn publish(&mut self, topic: &str, payload: String) -> Result<(), BrokerError> {
        let result = self.client.publish(topic, self.qos, false, payload.into_bytes()).await;

        // The request channel only fails once the event loop task is gone.
        result.map_err(|e| {
            if self.driver.is_finished() {
                BrokerError::Closed
            } else {
                BrokerError::Publish { topic: topic.to_string(), reason: e.to_string() }
            }
        })
    }

    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let filters: Vec<SubscribeFilter> =
            topics.iter().map(|topic| SubscribeFilter::new(topic.clone(), self.qos)).collect();

        self.client.subscribe_many(filters).await.map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        match tokio::time::timeout(self.ack_timeout, self.acks.recv()).await {
            Ok(Some(ack)) => ack,
            Ok(None) => Err(BrokerError::Closed),
            Err(_) => Err(BrokerError::Timeout { operation: "subscribe", after: self.ack_timeout }),
        }
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn disconnect(mut self) -> Result<(), BrokerError> {
        self.client.disconnect().await.map_err(|e| BrokerError::Disconnect(e.to_string()))?;

        // The driver exits once the DISCONNECT packet went out.
        if tokio::time::timeout(self.ack_timeout, &mut self.driver).await.is_err() {
            tracing::debug!("mqtt disconnect not flushed in time");
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

/// Poll the event loop until the connection ends.
///
/// Dropping `inbound` on exit is what tells the session's `recv` that the
/// stream is gone. rumqttc would reconnect on the next poll; a reconnected
/// session could have missed messages, so the driver stops instead.
async fn drive(
    mut eventloop: EventLoop,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    acks: mpsc::UnboundedSender<Result<(), BrokerError>>,
    client_id: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if inbound.send(InboundMessage::new(publish.topic, publish.payload)).is_err() {
                    break;
                }
            },
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let refused = suback
                    .return_codes
                    .iter()
                    .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                    .count();
                let ack = if refused == 0 {
                    Ok(())
                } else {
                    Err(BrokerError::Subscribe(format!("broker refused {refused} filter(s)")))
                };
                if acks.send(ack).is_err() {
                    break;
                }
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!(client_id = %client_id, "mqtt disconnected");
                break;
            },
            Ok(_) => {},
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "mqtt connection lost");
                break;
            },
        }
    }
}

fn qos(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}
