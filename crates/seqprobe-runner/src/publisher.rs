//! Publishing client.
//!
//! One agent per simulated client. It publishes `0, 1, …, 9, 0, 1, …` on its
//! own topic at a fixed cadence until the run is cancelled.

use std::{sync::Arc, time::Duration};

use seqprobe_core::{Broker, BrokerSession, CancellationSignal, MODULUS, RunCounters};

/// One publisher.
pub struct PublisherAgent<B: Broker> {
    broker: B,
    client_id: String,
    topic: String,
    interval: Duration,
    signal: CancellationSignal,
    counters: Arc<RunCounters>,
}

impl<B: Broker> PublisherAgent<B> {
    /// Create a publisher for `topic`.
    pub fn new(
        broker: B,
        client_id: String,
        topic: String,
        interval: Duration,
        signal: CancellationSignal,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self { broker, client_id, topic, interval, signal, counters }
    }

    /// Publish until cancelled.
    ///
    /// A failed connect or any publish error ends this publisher only; the
    /// rest of the run carries on. A payload is never sent twice.
    ///
    /// Returns the number of successful publishes.
    pub async fn run(self) -> u64 {
        let mut session = match self.broker.connect(&self.client_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(client_id = %self.client_id, error = %e, "publisher connect failed");
                return 0;
            },
        };

        tracing::info!(client_id = %self.client_id, topic = %self.topic, "publisher started");

        let mut counter: u64 = 0;
        while !self.signal.is_cancelled() {
            let payload = (counter % MODULUS as u64).to_string();

            if let Err(e) = session.publish(&self.topic, payload).await {
                tracing::error!(
                    client_id = %self.client_id,
                    error = %e,
                    fatal = e.is_fatal(),
                    "publish failed, stopping publisher"
                );
                break;
            }
            self.counters.record_published();
            counter += 1;

            tokio::select! {
                () = self.signal.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {},
            }
        }

        if let Err(e) = session.disconnect().await {
            tracing::warn!(client_id = %self.client_id, error = %e, "publisher disconnect failed");
        }

        tracing::info!(client_id = %self.client_id, published = counter, "publisher stopped");
        counter
    }
}
