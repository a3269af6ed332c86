//! End-to-end runs against the in-memory broker.
//!
//! All tests run on tokio's paused clock: timers fire in virtual time, so a
//! 10 s run takes microseconds and every schedule is reproducible.

use std::time::Duration;

use seqprobe_core::{ErrorPolicy, Outcome, RunConfig, StopCause};
use seqprobe_harness::MemoryBroker;
use seqprobe_runner::RunCoordinator;

const SUBSCRIBER: &str = "seqprobe-sub";

fn config(clients: u32, policy: ErrorPolicy, run_duration: Duration) -> RunConfig {
    RunConfig {
        topic_prefix: "prefix".to_string(),
        client_count: clients,
        publish_interval: Duration::from_millis(100),
        run_duration,
        policy,
        shutdown_grace: Duration::from_secs(1),
        connect_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn cycle(len: usize) -> Vec<String> {
    (0..len).map(|i| (i % 10).to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn clean_run_reports_no_loss() {
    let broker = MemoryBroker::new();
    let coordinator =
        RunCoordinator::new(config(1, ErrorPolicy::Count, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 0);
    assert_eq!(report.outcome, Outcome::Clean);
    assert_eq!(report.stop_cause, Some(StopCause::Deadline));
    assert!(report.elapsed >= Duration::from_secs(2));
    assert!(report.elapsed < Duration::from_secs(3));
    assert!(report.published >= 20);
    assert!(report.received >= 20);
    assert!(report.to_string().starts_with("Finished with no payload lost. Elapsed time: "));

    let delivered = broker.delivered_payloads(SUBSCRIBER, "prefix1");
    assert_eq!(delivered[..20], cycle(20)[..]);
    assert_eq!(broker.connected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_message_is_one_anomaly() {
    let broker = MemoryBroker::new();
    // Payload "3" is the fourth publish.
    broker.drop_message("prefix1", 3);
    let coordinator =
        RunCoordinator::new(config(1, ErrorPolicy::Count, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 1);
    assert_eq!(report.outcome, Outcome::Faulted);
    assert_eq!(report.stop_cause, Some(StopCause::Deadline));
    assert!(report.to_string().starts_with("Finished with a total of 1 payload loss."));
    assert_eq!(broker.delivered_payloads(SUBSCRIBER, "prefix1")[..5], ["0", "1", "2", "4", "5"]);
}

#[tokio::test(start_paused = true)]
async fn lost_second_message_is_one_anomaly() {
    let broker = MemoryBroker::new();
    broker.drop_message("prefix1", 1);
    let coordinator =
        RunCoordinator::new(config(1, ErrorPolicy::Count, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(broker.delivered_payloads(SUBSCRIBER, "prefix1")[..4], ["0", "2", "3", "4"]);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.outcome, Outcome::Faulted);
}

#[tokio::test(start_paused = true)]
async fn huge_integer_payload_is_counted_not_fatal() {
    let broker = MemoryBroker::new();
    broker.replace_payload("prefix1", 1, "9223372036854775807");
    let mut config = config(1, ErrorPolicy::Count, Duration::from_secs(2));
    config.handler_workers = 1;

    let report = RunCoordinator::new(config, broker.clone()).run().await.unwrap();

    // The replaced value is one anomaly; the gap it leaves is caught once
    // the history is seeded.
    assert_eq!(report.error_count, 2);
    assert_eq!(report.malformed, 0);
    assert_eq!(report.stop_cause, Some(StopCause::Deadline));
    assert!(report.received >= 20);
}

#[tokio::test(start_paused = true)]
async fn stop_at_first_ends_run_early() {
    let broker = MemoryBroker::new();
    broker.drop_message("prefix1", 3);
    let run_duration = Duration::from_secs(10);
    let coordinator =
        RunCoordinator::new(config(1, ErrorPolicy::StopAtFirst, run_duration), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 1);
    assert_eq!(report.stop_cause, Some(StopCause::Abort));
    assert!(report.elapsed < run_duration);
    // "4" is published at 400 ms and triggers the abort.
    assert!(report.elapsed < Duration::from_secs(1));
    assert!(report.published < 10);
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_counted() {
    let broker = MemoryBroker::new();
    broker.replace_payload("prefix1", 5, "abc");
    let coordinator =
        RunCoordinator::new(config(1, ErrorPolicy::Count, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    // The garbage payload is one anomaly. The "5" it replaced never arrived,
    // so "6" is a second one.
    assert_eq!(report.malformed, 1);
    assert_eq!(report.error_count, 2);
    assert_eq!(broker.delivered_payloads(SUBSCRIBER, "prefix1")[..7], ["0", "1", "2", "3", "4", "abc", "6"]);
}

#[tokio::test(start_paused = true)]
async fn loss_on_one_topic_leaves_others_clean() {
    let broker = MemoryBroker::new();
    broker.drop_message("prefix3", 7);
    let coordinator =
        RunCoordinator::new(config(5, ErrorPolicy::Count, Duration::from_secs(3)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 1);
    for client in [1, 2, 4, 5] {
        let topic = format!("prefix{client}");
        let delivered = broker.delivered_payloads(SUBSCRIBER, &topic);
        assert_eq!(delivered[..30], cycle(30)[..], "{topic}");
    }
}

#[tokio::test(start_paused = true)]
async fn stop_at_first_with_many_topics_counts_one() {
    let broker = MemoryBroker::new();
    broker.drop_message("prefix2", 4);
    let mut config = config(4, ErrorPolicy::StopAtFirst, Duration::from_secs(10));
    config.handler_workers = 1;
    let coordinator = RunCoordinator::new(config, broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 1);
    assert_eq!(report.stop_cause, Some(StopCause::Abort));
}
