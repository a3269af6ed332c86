//! Run lifetime.
//!
//! The coordinator starts the subscriber (which starts the publishers), runs
//! the deadline timer and, once any stop cause fires, waits a bounded time for
//! an orderly shutdown before reading the counters into a [`RunReport`].

use std::sync::Arc;

use seqprobe_core::{
    Broker, CancellationSignal, RunConfig, RunCounters, RunReport, SequenceVerifier, StopCause,
};
use tokio::time::Instant;

use crate::{error::RunError, subscriber::SubscriberAgent};

/// Owns one run.
pub struct RunCoordinator<B: Broker> {
    config: Arc<RunConfig>,
    broker: B,
    signal: CancellationSignal,
    counters: Arc<RunCounters>,
}

impl<B: Broker> RunCoordinator<B> {
    /// Create a coordinator. The configuration is validated by [`Self::run`].
    pub fn new(config: RunConfig, broker: B) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            signal: CancellationSignal::new(),
            counters: Arc::new(RunCounters::new()),
        }
    }

    /// Handle to the run's stop signal, e.g. for wiring Ctrl-C.
    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Execute the run to completion.
    ///
    /// # Errors
    ///
    /// - [`RunError::Config`] if the configuration is invalid (nothing starts)
    /// - [`RunError::SubscriberUnavailable`] if the subscriber could not
    ///   connect, subscribe or keep its connection
    /// - [`RunError::VerificationFailed`] if a handler worker or the
    ///   subscriber task died before the run ended
    pub async fn run(self) -> Result<RunReport, RunError> {
        self.config.validate()?;

        let started = Instant::now();
        tracing::info!(
            broker = %format!("{}:{}", self.config.host, self.config.port),
            topic_prefix = %self.config.topic_prefix,
            clients = self.config.client_count,
            interval_ms = self.config.publish_interval.as_millis() as u64,
            duration_s = self.config.run_duration.as_secs_f64(),
            policy = %self.config.policy,
            "run starting"
        );

        let verifier = Arc::new(SequenceVerifier::new(self.config.policy, Arc::clone(&self.counters)));
        let subscriber = SubscriberAgent::new(
            self.broker.clone(),
            Arc::clone(&self.config),
            self.signal.clone(),
            verifier,
        );
        let mut handle = tokio::spawn(subscriber.run());

        // The subscriber only returns after a stop cause fired, unless its task
        // died.
        let finished_early = tokio::select! {
            () = tokio::time::sleep(self.config.run_duration) => {
                if self.signal.trigger(StopCause::Deadline) {
                    tracing::info!("run duration elapsed");
                }
                None
            },
            () = self.signal.cancelled() => None,
            joined = &mut handle => Some(joined),
        };

        tracing::info!(cause = ?self.signal.cause(), "stopping");

        // The subscriber spends at most the grace period on its publishers,
        // plus one connect timeout on its own disconnect.
        let bound = self.config.shutdown_grace + self.config.connect_timeout;
        let joined = match finished_early {
            Some(joined) => Ok(joined),
            None => tokio::time::timeout(bound, &mut handle).await,
        };
        match joined {
            Ok(Ok(Ok(()))) => {},
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "subscriber task failed");
                self.signal.trigger(StopCause::HandlerFailure);
                return Err(RunError::VerificationFailed(e.to_string()));
            },
            Err(_) => {
                tracing::warn!("subscriber did not stop within {bound:?}, aborting");
                handle.abort();
            },
        }

        let report = RunReport::new(started.elapsed(), self.counters.snapshot(), self.signal.cause());
        tracing::info!(
            errors = report.error_count,
            published = report.published,
            received = report.received,
            malformed = report.malformed,
            "run finished"
        );

        Ok(report)
    }
}
