//! Final run report.

use std::{fmt, time::Duration};

use crate::{counters::CounterSnapshot, signal::StopCause};

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No anomalies were observed.
    Clean,
    /// At least one anomaly was observed.
    Faulted,
}

/// Summary produced by the coordinator once every agent has stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Time from start of orchestration to completed shutdown
    pub elapsed: Duration,
    /// Anomalies of any kind
    pub error_count: u64,
    /// `Clean` iff `error_count == 0`
    pub outcome: Outcome,
    /// Trigger that ended the run
    pub stop_cause: Option<StopCause>,
    /// Successful publishes across all publishers
    pub published: u64,
    /// Messages handled by the verifier
    pub received: u64,
    /// Malformed payloads (included in `error_count`)
    pub malformed: u64,
}

impl RunReport {
    /// Build a report from the final counter values.
    pub fn new(elapsed: Duration, counters: CounterSnapshot, stop_cause: Option<StopCause>) -> Self {
        let outcome = if counters.sequence_errors == 0 { Outcome::Clean } else { Outcome::Faulted };

        Self {
            elapsed,
            error_count: counters.sequence_errors,
            outcome,
            stop_cause,
            published: counters.published,
            received: counters.received,
            malformed: counters.malformed,
        }
    }

    /// Whether the run saw no anomalies.
    pub fn is_clean(&self) -> bool {
        self.outcome == Outcome::Clean
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Clean => write!(f, "Finished with no payload lost.")?,
            Outcome::Faulted => {
                write!(f, "Finished with a total of {} payload loss.", self.error_count)?;
            },
        }
        write!(f, " Elapsed time: {:.3}s", self.elapsed.as_secs_f64())
    }
}
