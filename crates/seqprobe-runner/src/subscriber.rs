//! Verifying subscriber.
//!
//! The subscriber owns the publishers: it subscribes to every publisher topic,
//! waits for the broker's acknowledgement and only then spawns them, so no
//! publish can race ahead of its subscription.
//!
//! Inbound messages are routed to a fixed pool of handler workers by a stable
//! hash of the topic. Each topic therefore has exactly one writer, and its
//! delivery order is preserved, while different topics are verified in
//! parallel.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use seqprobe_core::{
    Broker, BrokerError, BrokerSession, CancellationSignal, InboundMessage, RunConfig,
    SequenceVerifier, StopCause,
};
use tokio::{sync::mpsc, task::JoinSet};

use crate::{error::RunError, publisher::PublisherAgent};

/// Per-worker queue depth. The receive loop waits when a worker falls behind.
const WORKER_QUEUE: usize = 256;

/// Why the receive loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    Cancelled,
    StreamEnded,
    WorkerLost,
}

/// The single subscriber of a run.
pub struct SubscriberAgent<B: Broker> {
    broker: B,
    config: Arc<RunConfig>,
    signal: CancellationSignal,
    verifier: Arc<SequenceVerifier>,
}

impl<B: Broker> SubscriberAgent<B> {
    /// Create the subscriber for a run.
    pub fn new(
        broker: B,
        config: Arc<RunConfig>,
        signal: CancellationSignal,
        verifier: Arc<SequenceVerifier>,
    ) -> Self {
        Self { broker, config, signal, verifier }
    }

    /// Subscribe, start the publishers and verify until the run is cancelled.
    ///
    /// # Errors
    ///
    /// - [`RunError::SubscriberUnavailable`] if the subscriber cannot connect
    ///   or subscribe, or its inbound stream ends before cancellation; the
    ///   signal carries [`StopCause::ConnectionFailure`]
    /// - [`RunError::VerificationFailed`] if a handler worker dies; the signal
    ///   carries [`StopCause::HandlerFailure`] unless another cause won first
    pub async fn run(self) -> Result<(), RunError> {
        let client_id = self.config.subscriber_client_id();

        let mut session = match self.connect(&client_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "subscriber connect failed");
                self.signal.trigger(StopCause::ConnectionFailure);
                return Err(RunError::SubscriberUnavailable(e));
            },
        };

        let topics = self.config.topics();
        if let Err(e) = self.subscribe(&mut session, &topics).await {
            tracing::error!(client_id = %client_id, error = %e, "subscribe failed");
            self.signal.trigger(StopCause::ConnectionFailure);
            disconnect(session, &client_id).await;
            return Err(RunError::SubscriberUnavailable(e));
        }

        tracing::info!(client_id = %client_id, topics = topics.len(), "subscribed");

        let mut publishers = self.spawn_publishers();
        let (senders, mut workers) = self.spawn_workers();

        let end = self.pump(&mut session, &senders).await;
        if end == PumpEnd::StreamEnded {
            tracing::error!(client_id = %client_id, "subscriber connection lost");
            self.signal.trigger(StopCause::ConnectionFailure);
        }

        // Workers skip everything still queued once cancelled, so closing
        // their queues lets them finish promptly.
        drop(senders);
        let mut failed_workers = 0usize;
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "handler worker failed");
                failed_workers += 1;
            }
        }
        if failed_workers > 0 {
            self.signal.trigger(StopCause::HandlerFailure);
        }

        self.stop_publishers(&mut publishers).await;
        disconnect(session, &client_id).await;

        match end {
            PumpEnd::StreamEnded => Err(RunError::SubscriberUnavailable(BrokerError::Closed)),
            PumpEnd::WorkerLost => {
                Err(RunError::VerificationFailed("handler worker stopped receiving".to_string()))
            },
            PumpEnd::Cancelled if failed_workers > 0 => {
                Err(RunError::VerificationFailed(format!("{failed_workers} handler worker(s) failed")))
            },
            PumpEnd::Cancelled => Ok(()),
        }
    }

    async fn connect(&self, client_id: &str) -> Result<B::Session, BrokerError> {
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, self.broker.connect(client_id))
            .await
            .map_err(|_| BrokerError::Timeout { operation: "connect", after: timeout })?
    }

    async fn subscribe(&self, session: &mut B::Session, topics: &[String]) -> Result<(), BrokerError> {
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, session.subscribe(topics))
            .await
            .map_err(|_| BrokerError::Timeout { operation: "subscribe", after: timeout })?
    }

    fn spawn_publishers(&self) -> JoinSet<u64> {
        let mut publishers = JoinSet::new();

        for client in 1..=self.config.client_count {
            let agent = PublisherAgent::new(
                self.broker.clone(),
                self.config.publisher_client_id(client),
                self.config.topic_for(client),
                self.config.publish_interval,
                self.signal.clone(),
                Arc::clone(self.verifier.counters()),
            );
            publishers.spawn(agent.run());
        }

        publishers
    }

    fn spawn_workers(&self) -> (Vec<mpsc::Sender<InboundMessage>>, JoinSet<()>) {
        let mut senders = Vec::with_capacity(self.config.handler_workers);
        let mut workers = JoinSet::new();

        for _ in 0..self.config.handler_workers {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE);
            senders.push(tx);
            workers.spawn(handle_messages(rx, Arc::clone(&self.verifier), self.signal.clone()));
        }

        (senders, workers)
    }

    /// Forward inbound messages to the workers until cancelled, the inbound
    /// stream ends or a worker is gone. A lost worker stops the run.
    async fn pump(
        &self,
        session: &mut B::Session,
        senders: &[mpsc::Sender<InboundMessage>],
    ) -> PumpEnd {
        loop {
            tokio::select! {
                biased;
                () = self.signal.cancelled() => return PumpEnd::Cancelled,
                message = session.recv() => {
                    let Some(message) = message else { return PumpEnd::StreamEnded };
                    tracing::trace!(topic = %message.topic, "received");

                    let worker = worker_for(&message.topic, senders.len());
                    if senders[worker].send(message).await.is_err() {
                        tracing::error!(worker, "handler worker gone");
                        self.signal.trigger(StopCause::HandlerFailure);
                        return PumpEnd::WorkerLost;
                    }
                },
            }
        }
    }

    async fn stop_publishers(&self, publishers: &mut JoinSet<u64>) {
        let drain = async {
            let mut published = 0;
            while let Some(result) = publishers.join_next().await {
                match result {
                    Ok(count) => published += count,
                    Err(e) => tracing::error!(error = %e, "publisher task failed"),
                }
            }
            published
        };

        let drained = tokio::time::timeout(self.config.shutdown_grace, drain).await;
        match drained {
            Ok(published) => tracing::debug!(published, "all publishers stopped"),
            Err(_) => {
                tracing::warn!(
                    remaining = publishers.len(),
                    "publishers did not stop within grace period, aborting"
                );
                publishers.abort_all();
            },
        }
    }
}

/// Handler worker loop.
async fn handle_messages(
    mut inbound: mpsc::Receiver<InboundMessage>,
    verifier: Arc<SequenceVerifier>,
    signal: CancellationSignal,
) {
    while let Some(message) = inbound.recv().await {
        if signal.is_cancelled() {
            continue;
        }

        if verifier.handle(&message.topic, &message.payload).requires_abort() {
            signal.trigger(StopCause::Abort);
        }
    }
}

/// Worker index for `topic`. Stable for the lifetime of the process.
fn worker_for(topic: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

async fn disconnect<S: BrokerSession>(session: S, client_id: &str) {
    if let Err(e) = session.disconnect().await {
        tracing::warn!(client_id = %client_id, error = %e, "subscriber disconnect failed");
    }
}
