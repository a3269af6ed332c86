//! seqprobe binary.
//!
//! # Usage
//!
//! ```bash
//! # Prompt for every parameter
//! seqprobe
//!
//! # 5 publishers, one publish per 100 ms each, 60 s run, stop at first loss
//! seqprobe 10.0.0.1 1883 cluster/probe/ 5 100 60 1
//!
//! # Same, counting every loss, without the closing prompt
//! seqprobe --no-pause 10.0.0.1 1883 cluster/probe/ 5 100 60
//! ```
//!
//! Exit status is 0 for a clean run, 1 if payloads were lost or the run could
//! not be carried out, 2 for invalid arguments.

use std::{
    io::{self, Write},
    process::ExitCode,
};

use clap::Parser;
use seqprobe_core::{RunReport, StopCause};
use seqprobe_runner::{
    MqttBroker, RunCoordinator,
    cli::{Args, Invocation, RunParams},
    prompt::Prompter,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_FAULTED: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let code = execute(&args).await;

    if !args.no_pause {
        let mut prompter = Prompter::new(io::stdin().lock(), io::stdout());
        if let Err(e) = prompter.pause() {
            tracing::debug!(error = %e, "pause skipped");
        }
    }

    code
}

async fn execute(args: &Args) -> ExitCode {
    let params = match args.invocation() {
        Ok(Invocation::Direct(params)) => params,
        Ok(Invocation::Interactive) => match prompt_params() {
            Ok(params) => params,
            Err(e) => {
                tracing::error!(error = %e, "could not read parameters");
                return ExitCode::from(EXIT_USAGE);
            },
        },
        Err(e) => {
            say(&e.to_string());
            return ExitCode::from(EXIT_USAGE);
        },
    };

    let client_id_prefix = format!("seqprobe-{}", std::process::id());
    let config = match args.run_config(params, client_id_prefix) {
        Ok(config) => config,
        Err(e) => {
            say(&e.to_string());
            return ExitCode::from(EXIT_USAGE);
        },
    };

    let broker = MqttBroker::from_config(&config);
    let coordinator = RunCoordinator::new(config, broker);

    let signal = coordinator.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && signal.trigger(StopCause::Interrupted) {
            tracing::warn!("interrupted, shutting down");
        }
    });

    match coordinator.run().await {
        Ok(report) => summarize(&report),
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::from(EXIT_FAULTED)
        },
    }
}

fn prompt_params() -> io::Result<RunParams> {
    let mut prompter = Prompter::new(io::stdin().lock(), io::stdout());
    let params = prompter.run_params()?;
    say("");
    Ok(params)
}

fn summarize(report: &RunReport) -> ExitCode {
    say("");
    say(&report.to_string());

    if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::from(EXIT_FAULTED) }
}

/// Write a line to stdout. A closed stdout is not worth failing the run over.
fn say(line: &str) {
    if let Err(e) = writeln!(io::stdout().lock(), "{line}") {
        tracing::debug!(error = %e, "stdout write skipped");
    }
}
