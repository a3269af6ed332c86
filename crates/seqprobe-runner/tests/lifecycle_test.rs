//! Connection failures, cancellation and shutdown.

use std::time::Duration;

use seqprobe_core::{BrokerError, ConfigError, ErrorPolicy, RunConfig, StopCause, successor};
use seqprobe_harness::{JournalEntry, MemoryBroker};
use seqprobe_runner::{RunCoordinator, RunError};

fn config(clients: u32, run_duration: Duration) -> RunConfig {
    RunConfig {
        topic_prefix: "t/".to_string(),
        client_count: clients,
        publish_interval: Duration::from_millis(100),
        run_duration,
        policy: ErrorPolicy::Count,
        shutdown_grace: Duration::from_secs(1),
        connect_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Anomalies the tracker must report for one topic's delivered payloads.
fn expected_anomalies(delivered: &[String]) -> u64 {
    let values: Vec<i64> = delivered.iter().map(|p| p.parse().unwrap()).collect();
    let seed_gap = values.len() > 2 && values[1] != successor(values[0]);
    (2..values.len())
        .filter(|&i| values[i] != successor(values[i - 1]) || (i == 2 && seed_gap))
        .count() as u64
}

#[tokio::test(start_paused = true)]
async fn invalid_config_starts_nothing() {
    let broker = MemoryBroker::new();
    let coordinator = RunCoordinator::new(config(0, Duration::from_secs(1)), broker.clone());

    let result = coordinator.run().await;

    assert!(matches!(result, Err(RunError::Config(ConfigError::NoClients))));
    assert!(broker.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_subscriber_fails_the_run() {
    let broker = MemoryBroker::new();
    broker.refuse_client("seqprobe-sub");
    let coordinator = RunCoordinator::new(config(3, Duration::from_secs(5)), broker.clone());
    let signal = coordinator.signal();

    let result = coordinator.run().await;

    assert!(matches!(result, Err(RunError::SubscriberUnavailable(BrokerError::Connect { .. }))));
    assert_eq!(signal.cause(), Some(StopCause::ConnectionFailure));
    // Publishers are only started after a successful subscribe.
    assert!(
        !broker.journal().iter().any(|entry| matches!(entry, JournalEntry::Published { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn refused_publisher_does_not_stop_the_run() {
    let broker = MemoryBroker::new();
    broker.refuse_client("seqprobe-pub-2");
    let coordinator = RunCoordinator::new(config(3, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.error_count, 0);
    assert_eq!(report.stop_cause, Some(StopCause::Deadline));
    assert!(broker.published_payloads("t/2").is_empty());
    assert!(broker.published_payloads("t/1").len() >= 20);
    assert!(broker.published_payloads("t/3").len() >= 20);
}

#[tokio::test(start_paused = true)]
async fn rejected_publish_ends_that_publisher_without_resend() {
    let broker = MemoryBroker::new();
    broker.reject_publish("t/1", 4);
    let coordinator = RunCoordinator::new(config(2, Duration::from_secs(2)), broker.clone());

    let report = coordinator.run().await.unwrap();

    assert_eq!(broker.delivered_payloads("seqprobe-sub", "t/1"), vec!["0", "1", "2", "3"]);
    assert!(broker.published_payloads("t/2").len() >= 20);
    assert_eq!(report.error_count, 0);
    assert_eq!(report.stop_cause, Some(StopCause::Deadline));
}

#[tokio::test(start_paused = true)]
async fn lost_subscriber_connection_fails_the_run() {
    let broker = MemoryBroker::new();
    let coordinator = RunCoordinator::new(config(2, Duration::from_secs(10)), broker.clone());
    let signal = coordinator.signal();

    let run = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(550)).await;
    broker.sever_client("seqprobe-sub");

    let result = run.await.unwrap();

    assert!(matches!(result, Err(RunError::SubscriberUnavailable(BrokerError::Closed))));
    assert_eq!(signal.cause(), Some(StopCause::ConnectionFailure));
    assert_eq!(broker.connected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupt_stops_early_with_report() {
    let broker = MemoryBroker::new();
    let coordinator = RunCoordinator::new(config(2, Duration::from_secs(60)), broker.clone());
    let signal = coordinator.signal();

    let run = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(750)).await;
    assert!(signal.trigger(StopCause::Interrupted));
    assert!(!signal.trigger(StopCause::Abort));
    assert!(!signal.trigger(StopCause::Deadline));

    let report = run.await.unwrap().unwrap();

    assert_eq!(report.stop_cause, Some(StopCause::Interrupted));
    assert_eq!(report.error_count, 0);
    assert!(report.elapsed < Duration::from_secs(2));
    assert_eq!(broker.connected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn all_clients_disconnect_after_deadline() {
    let broker = MemoryBroker::new();
    let coordinator = RunCoordinator::new(config(4, Duration::from_secs(1)), broker.clone());

    coordinator.run().await.unwrap();

    let journal = broker.journal();
    let connected =
        journal.iter().filter(|entry| matches!(entry, JournalEntry::Connected { .. })).count();
    let disconnected =
        journal.iter().filter(|entry| matches!(entry, JournalEntry::Disconnected { .. })).count();
    assert_eq!(connected, 5);
    assert_eq!(disconnected, 5);
}

#[tokio::test(start_paused = true)]
async fn random_loss_is_counted_per_topic() {
    let broker = MemoryBroker::new();
    broker.set_random_loss(0.15, 0x5eed);
    let coordinator = RunCoordinator::new(config(3, Duration::from_secs(5)), broker.clone());

    let report = coordinator.run().await.unwrap();

    let topics = ["t/1", "t/2", "t/3"];
    let oracle: u64 = topics
        .iter()
        .map(|topic| expected_anomalies(&broker.delivered_payloads("seqprobe-sub", topic)))
        .sum();

    // Messages delivered exactly at the deadline may be skipped by the
    // handlers, at most one per topic.
    assert!(oracle > 0);
    assert!(report.error_count <= oracle);
    assert!(report.error_count + topics.len() as u64 >= oracle);
    assert_eq!(report.is_clean(), report.error_count == 0);
}
