//! Run-wide cooperative cancellation.
//!
//! The deadline, the error policy or a fatal subscriber failure can end a run
//! (plus Ctrl-C from the binary).
//! Whichever triggers first wins; later triggers are no-ops.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a run was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Configured run duration elapsed.
    Deadline,
    /// Error policy asked to abort.
    Abort,
    /// Subscriber lost (or never got) its broker connection.
    ConnectionFailure,
    /// A handler worker died, so messages went unverified.
    HandlerFailure,
    /// Operator interrupted the run.
    Interrupted,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => f.write_str("deadline reached"),
            Self::Abort => f.write_str("aborted by error policy"),
            Self::ConnectionFailure => f.write_str("subscriber connection failure"),
            Self::HandlerFailure => f.write_str("handler worker failure"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Shared, idempotent stop signal.
///
/// Clones observe and trigger the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
    cause: Arc<OnceLock<StopCause>>,
}

impl CancellationSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    ///
    /// Returns `true` only for the call whose cause was recorded. The token is
    /// cancelled after the cause is set, so any task woken by the token sees
    /// the winning cause.
    pub fn trigger(&self, cause: StopCause) -> bool {
        let won = self.cause.set(cause).is_ok();
        self.token.cancel();

        if won {
            tracing::debug!(%cause, "stop requested");
        }

        won
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Future that resolves once a stop has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Cause recorded by the winning trigger, if any.
    pub fn cause(&self) -> Option<StopCause> {
        self.cause.get().copied()
    }
}
