//! Command line handling.
//!
//! The run parameters are positional (`<broker> <port> <topic_prefix>
//! <clients> <publish_ms> <run_s> [behaviour]`), or prompted for when none are
//! given. Tuning knobs are flags.

use std::time::Duration;

use clap::Parser;
use seqprobe_core::{ErrorPolicy, QosLevel, RunConfig};

use crate::error::UsageError;

const PROGRAM: &str = "seqprobe";

/// Positional parameters without the optional behaviour.
const REQUIRED_PARAMS: usize = 6;

/// Positional parameters including the behaviour.
const ALL_PARAMS: usize = 7;

/// MQTT broker cluster resilience probe
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = PROGRAM)]
#[command(about = "Detects lost or reordered MQTT messages across a broker cluster")]
#[command(version)]
pub struct Args {
    /// <broker> <port> <topic_prefix> <clients> <publish_ms> <run_s>
    /// [behaviour]. Omit all of them to be prompted.
    #[arg(value_name = "PARAMS")]
    pub params: Vec<String>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// MQTT QoS for publishes and subscriptions
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: u8,

    /// Number of subscriber handler workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// How long to wait for clients to stop after the run ends (ms)
    #[arg(long, default_value_t = 5000)]
    pub shutdown_grace_ms: u64,

    /// Connect and subscribe timeout (ms)
    #[arg(long, default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// MQTT keep-alive interval (s)
    #[arg(long, default_value_t = 30)]
    pub keep_alive_secs: u64,

    /// Exit without waiting for Enter
    #[arg(long)]
    pub no_pause: bool,
}

/// How the run parameters are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Ask for every parameter on the terminal.
    Interactive,
    /// Parameters were given on the command line.
    Direct(RunParams),
}

/// The run parameters an operator chooses per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    /// Broker host name or IP address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Topic prefix
    pub topic_prefix: String,
    /// Number of publishers
    pub client_count: u32,
    /// Publish interval in milliseconds
    pub publish_ms: u64,
    /// Run duration in seconds
    pub run_secs: u64,
    /// Reaction to anomalies
    pub policy: ErrorPolicy,
}

impl Args {
    /// Decide between interactive and direct mode.
    ///
    /// # Errors
    ///
    /// Any positional count other than 0, 6 or 7, or a positional that does
    /// not parse.
    pub fn invocation(&self) -> Result<Invocation, UsageError> {
        if self.params.is_empty() {
            return Ok(Invocation::Interactive);
        }
        parse_params(&self.params).map(Invocation::Direct)
    }

    /// Combine run parameters with the flags into a run configuration.
    ///
    /// `client_id_prefix` must be unique among runs sharing a broker.
    pub fn run_config(&self, params: RunParams, client_id_prefix: String) -> Result<RunConfig, UsageError> {
        let qos = QosLevel::try_from(self.qos).map_err(|e| usage_error(e.to_string()))?;

        Ok(RunConfig {
            host: params.host,
            port: params.port,
            topic_prefix: params.topic_prefix,
            client_count: params.client_count,
            publish_interval: Duration::from_millis(params.publish_ms),
            run_duration: Duration::from_secs(params.run_secs),
            policy: params.policy,
            qos,
            client_id_prefix,
            handler_workers: self.workers,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        })
    }
}

/// Parse the positional parameters.
pub fn parse_params(params: &[String]) -> Result<RunParams, UsageError> {
    if params.len() != REQUIRED_PARAMS && params.len() != ALL_PARAMS {
        return Err(usage_error(format!(
            "Error starting the program. Invalid arguments: expected {REQUIRED_PARAMS} or {ALL_PARAMS}, got {}.",
            params.len()
        )));
    }

    let policy = match params.get(6) {
        Some(raw) => parse_behaviour(raw)
            .ok_or_else(|| usage_error(format!("Invalid behaviour option {raw:?}: expected 1 or 2.")))?,
        None => ErrorPolicy::default(),
    };

    Ok(RunParams {
        host: params[0].clone(),
        port: parse_field(&params[1], "port")?,
        topic_prefix: params[2].clone(),
        client_count: parse_field(&params[3], "number of clients")?,
        publish_ms: parse_field(&params[4], "publish time (ms)")?,
        run_secs: parse_field(&params[5], "run time (s)")?,
        policy,
    })
}

/// Behaviour option: `1` stops at the first anomaly, `2` counts them.
pub fn parse_behaviour(raw: &str) -> Option<ErrorPolicy> {
    raw.trim().parse().ok().and_then(ErrorPolicy::from_behaviour)
}

fn parse_field<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, UsageError> {
    raw.trim().parse().map_err(|_| usage_error(format!("Invalid value for {name}: {raw:?}.")))
}

fn usage_error(reason: String) -> UsageError {
    UsageError { reason, usage: usage() }
}

/// Usage text for Linux and Windows invocations.
pub fn usage() -> String {
    let params = "<broker_ip> <port> <topic_prefix> <nmr_of_clients> <publish_time_ms> <run_time_s> [behaviour]";
    format!(
        "Usage:\n-linux:\n{PROGRAM} {params}\n\n-windows:\n{PROGRAM}.exe {params}\n\n\
         behaviour: 1 = stop at the first missed payload, 2 = count the missed payload (default)"
    )
}
