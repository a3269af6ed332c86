//! In-process broker with fault injection.
//!
//! All state lives behind one `Arc<Mutex<>>`, so `MemoryBroker` is `Clone` and
//! every clone is the same broker. Deliveries are pushed into unbounded
//! per-session channels while the lock is held, which keeps per-topic delivery
//! order identical to publish order. The lock is never held across an await.

use std::{
    collections::{HashMap, HashSet},
    future::{Future, ready},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use seqprobe_core::{Broker, BrokerError, BrokerSession, InboundMessage};
use tokio::sync::mpsc;

use crate::topic::topic_matches;

/// Deterministic fault applied to one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Silently discard the `nth` (0-based) publish on `topic`.
    Drop {
        /// Topic to act on
        topic: String,
        /// Publish index on that topic
        nth: u64,
    },
    /// Deliver `payload` instead of the `nth` (0-based) publish on `topic`.
    Replace {
        /// Topic to act on
        topic: String,
        /// Publish index on that topic
        nth: u64,
        /// Payload delivered instead
        payload: String,
    },
    /// Fail the `nth` (0-based) publish on `topic` with a non-fatal
    /// [`BrokerError::Publish`]. The session stays connected.
    Reject {
        /// Topic to act on
        topic: String,
        /// Publish index on that topic
        nth: u64,
    },
}

/// Broker-side event, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A client connected.
    Connected {
        /// Client id
        client_id: String,
    },
    /// A connection attempt was refused.
    Refused {
        /// Client id
        client_id: String,
    },
    /// A subscription filter was registered.
    Subscribed {
        /// Client id
        client_id: String,
        /// Topic filter
        filter: String,
    },
    /// A client published.
    Published {
        /// Client id
        client_id: String,
        /// Topic
        topic: String,
        /// Payload as published
        payload: String,
    },
    /// A message was handed to a subscriber.
    Delivered {
        /// Receiving client id
        client_id: String,
        /// Topic
        topic: String,
        /// Payload as delivered
        payload: String,
    },
    /// A publish was refused by fault injection.
    Rejected {
        /// Publishing client id
        client_id: String,
        /// Topic
        topic: String,
        /// Payload as offered
        payload: String,
    },
    /// A publish was discarded by fault injection.
    Dropped {
        /// Topic
        topic: String,
        /// Payload as published
        payload: String,
    },
    /// A client disconnected or was severed.
    Disconnected {
        /// Client id
        client_id: String,
    },
}

struct SessionEntry {
    client_id: String,
    filters: Vec<String>,
    sender: mpsc::UnboundedSender<InboundMessage>,
}

struct RandomLoss {
    rate: f64,
    rng: ChaCha8Rng,
}

#[derive(Default)]
struct BrokerState {
    next_session_id: u64,
    sessions: HashMap<u64, SessionEntry>,
    publish_counts: HashMap<String, u64>,
    faults: Vec<Fault>,
    refused: HashSet<String>,
    loss: Option<RandomLoss>,
    journal: Vec<JournalEntry>,
}

impl BrokerState {
    fn fault_for(&self, topic: &str, nth: u64) -> Option<&Fault> {
        self.faults.iter().find(|fault| match fault {
            Fault::Drop { topic: t, nth: n }
            | Fault::Replace { topic: t, nth: n, .. }
            | Fault::Reject { topic: t, nth: n } => t == topic && *n == nth,
        })
    }

    /// Apply faults to the publish at index `nth` on `topic`.
    ///
    /// Returns the payload to deliver, or `None` if the message is dropped.
    fn apply_faults(&mut self, topic: &str, nth: u64, payload: &str) -> Option<String> {
        match self.fault_for(topic, nth) {
            Some(Fault::Drop { .. }) => return None,
            Some(Fault::Replace { payload, .. }) => return Some(payload.clone()),
            Some(Fault::Reject { .. }) | None => {},
        }

        if let Some(loss) = &mut self.loss
            && loss.rng.gen_bool(loss.rate)
        {
            return None;
        }

        Some(payload.to_string())
    }
}

/// In-process publish/subscribe broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create a broker with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deterministic fault.
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push(fault);
    }

    /// Drop the `nth` (0-based) publish on `topic`.
    pub fn drop_message(&self, topic: &str, nth: u64) {
        self.inject(Fault::Drop { topic: topic.to_string(), nth });
    }

    /// Replace the `nth` (0-based) publish on `topic` with `payload`.
    pub fn replace_payload(&self, topic: &str, nth: u64, payload: &str) {
        self.inject(Fault::Replace { topic: topic.to_string(), nth, payload: payload.to_string() });
    }

    /// Fail the `nth` (0-based) publish on `topic` without closing the session.
    pub fn reject_publish(&self, topic: &str, nth: u64) {
        self.inject(Fault::Reject { topic: topic.to_string(), nth });
    }

    /// Refuse every future connection attempt by `client_id`.
    pub fn refuse_client(&self, client_id: &str) {
        self.state().refused.insert(client_id.to_string());
    }

    /// Drop each publish with probability `rate`, reproducibly for a `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is not in [0.0, 1.0].
    pub fn set_random_loss(&self, rate: f64, seed: u64) {
        assert!((0.0..=1.0).contains(&rate), "loss rate must be between 0.0 and 1.0, got {rate}");
        self.state().loss = Some(RandomLoss { rate, rng: ChaCha8Rng::seed_from_u64(seed) });
    }

    /// Forcibly disconnect every session of `client_id`.
    ///
    /// Their inbound streams end and further publishes fail with
    /// [`BrokerError::Closed`].
    pub fn sever_client(&self, client_id: &str) {
        let mut state = self.state();
        let severed: Vec<u64> = state
            .sessions
            .iter()
            .filter(|(_, entry)| entry.client_id == client_id)
            .map(|(id, _)| *id)
            .collect();

        for id in severed {
            state.sessions.remove(&id);
            state.journal.push(JournalEntry::Disconnected { client_id: client_id.to_string() });
        }
    }

    /// Copy of the event journal.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state().journal.clone()
    }

    /// Number of currently connected sessions.
    pub fn connected_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Payloads published on `topic`, in publish order.
    pub fn published_payloads(&self, topic: &str) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Published { topic: t, payload, .. } if t == topic => {
                    Some(payload.clone())
                },
                _ => None,
            })
            .collect()
    }

    /// Payloads delivered to `client_id` on `topic`, in delivery order.
    pub fn delivered_payloads(&self, client_id: &str, topic: &str) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Delivered { client_id: c, topic: t, payload }
                    if c == client_id && t == topic =>
                {
                    Some(payload.clone())
                },
                _ => None,
            })
            .collect()
    }

    /// Topics that saw a publish before any matching subscription existed.
    ///
    /// Empty when every topic was subscribed to before its first publish.
    pub fn published_before_subscribed(&self) -> Vec<String> {
        let state = self.state();
        let mut filters: Vec<&str> = Vec::new();
        let mut violations: Vec<String> = Vec::new();

        for entry in &state.journal {
            match entry {
                JournalEntry::Subscribed { filter, .. } => filters.push(filter),
                JournalEntry::Published { topic, .. } => {
                    let covered = filters.iter().any(|filter| topic_matches(filter, topic));
                    if !covered && !violations.contains(topic) {
                        violations.push(topic.clone());
                    }
                },
                _ => {},
            }
        }

        violations
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_session(&self, client_id: &str) -> Result<MemorySession, BrokerError> {
        let mut state = self.state();

        if state.refused.contains(client_id) {
            state.journal.push(JournalEntry::Refused { client_id: client_id.to_string() });
            return Err(BrokerError::Connect {
                client_id: client_id.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let session_id = state.next_session_id;
        state.next_session_id += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        state
            .sessions
            .insert(session_id, SessionEntry { client_id: client_id.to_string(), filters: Vec::new(), sender });
        state.journal.push(JournalEntry::Connected { client_id: client_id.to_string() });

        tracing::debug!(client_id, session_id, "memory broker: connected");

        Ok(MemorySession {
            session_id,
            client_id: client_id.to_string(),
            broker: self.clone(),
            inbound: receiver,
        })
    }

    fn publish(&self, session_id: u64, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut state = self.state();

        let client_id = match state.sessions.get(&session_id) {
            Some(entry) => entry.client_id.clone(),
            None => return Err(BrokerError::Closed),
        };

        let count = state.publish_counts.entry(topic.to_string()).or_insert(0);
        let nth = *count;
        *count += 1;

        if matches!(state.fault_for(topic, nth), Some(Fault::Reject { .. })) {
            tracing::debug!(topic, nth, "memory broker: rejected publish");
            state.journal.push(JournalEntry::Rejected {
                client_id,
                topic: topic.to_string(),
                payload: payload.to_string(),
            });
            return Err(BrokerError::Publish { topic: topic.to_string(), reason: "rejected".to_string() });
        }

        state.journal.push(JournalEntry::Published {
            client_id,
            topic: topic.to_string(),
            payload: payload.to_string(),
        });

        let Some(delivered) = state.apply_faults(topic, nth, payload) else {
            tracing::debug!(topic, nth, "memory broker: dropped publish");
            state.journal.push(JournalEntry::Dropped {
                topic: topic.to_string(),
                payload: payload.to_string(),
            });
            return Ok(());
        };

        let mut deliveries = Vec::new();
        for entry in state.sessions.values() {
            if entry.filters.iter().any(|filter| topic_matches(filter, topic)) {
                let message = InboundMessage::new(topic, delivered.clone().into_bytes());
                if entry.sender.send(message).is_ok() {
                    deliveries.push(entry.client_id.clone());
                }
            }
        }

        for client_id in deliveries {
            state.journal.push(JournalEntry::Delivered {
                client_id,
                topic: topic.to_string(),
                payload: delivered.clone(),
            });
        }

        Ok(())
    }

    fn subscribe(&self, session_id: u64, topics: &[String]) -> Result<(), BrokerError> {
        let mut state = self.state();

        let Some(entry) = state.sessions.get_mut(&session_id) else {
            return Err(BrokerError::Closed);
        };
        entry.filters.extend(topics.iter().cloned());
        let client_id = entry.client_id.clone();

        for filter in topics {
            state
                .journal
                .push(JournalEntry::Subscribed { client_id: client_id.clone(), filter: filter.clone() });
        }

        Ok(())
    }

    fn close_session(&self, session_id: u64) {
        let mut state = self.state();
        if let Some(entry) = state.sessions.remove(&session_id) {
            state.journal.push(JournalEntry::Disconnected { client_id: entry.client_id });
        }
    }
}

impl Broker for MemoryBroker {
    type Session = MemorySession;

    fn connect(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Result<MemorySession, BrokerError>> + Send {
        ready(self.open_session(client_id))
    }
}

/// Connection to a [`MemoryBroker`].
///
/// Dropping the session disconnects it.
pub struct MemorySession {
    session_id: u64,
    client_id: String,
    broker: MemoryBroker,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl MemorySession {
    /// Client id this session connected with.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl BrokerSession for MemorySession {
    fn publish(
        &mut self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send {
        ready(self.broker.publish(self.session_id, topic, &payload))
    }

    fn subscribe(
        &mut self,
        topics: &[String],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send {
        ready(self.broker.subscribe(self.session_id, topics))
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    fn disconnect(self) -> impl Future<Output = Result<(), BrokerError>> + Send {
        self.broker.close_session(self.session_id);
        ready(Ok(()))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.broker.close_session(self.session_id);
    }
}
