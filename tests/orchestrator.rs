//! Orchestrator Integration Tests
//!
//! End-to-end runs from a source through filters to the sink.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{collect_sink, payload, record, wait_for, APP};
use slackpulse::adapters::{BusEvent, LocalBus, MemoryStore};
use slackpulse::ingest::store_time_now;
use slackpulse::{Config, DetectorKind, EventSource, Orchestrator, Sources};

fn fast_config(detectors: Vec<DetectorKind>) -> Config {
    let mut config = Config::default();
    config.monitor.detectors = detectors;
    config.monitor.poll_interval_secs = 0.02;
    config
}

#[tokio::test]
async fn test_database_run_delivers_once() {
    let store = Arc::new(MemoryStore::new());
    let future = store_time_now() + 60.0;
    store.push(APP, record(1, future, payload("Carol", "", "ping")));
    store.push(APP, record(2, future + 1.0, payload("Carol", "", "ping")));
    store.push(APP, record(3, future + 2.0, payload("deploy-bot", "", "build passed")));

    let sink = collect_sink();
    let shutdown = CancellationToken::new();
    let sources = Sources {
        store: Some(store.clone()),
        ..Sources::default()
    };

    let mut orchestrator = Orchestrator::new(
        fast_config(vec![DetectorKind::Database]),
        sources,
        sink.clone(),
        shutdown.clone(),
    )
    .unwrap();

    assert_eq!(orchestrator.start().unwrap(), 1);
    assert_eq!(orchestrator.active_detectors(), vec!["DatabaseDetector"]);

    let delivered = wait_for(Duration::from_secs(3), || orchestrator.stats().filtered == 2).await;
    assert!(delivered, "expected bot and duplicate to be filtered");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sender(), "Carol");
    assert_eq!(events[0].message(), "ping");
    assert_eq!(events[0].source(), EventSource::Database);
    assert_eq!(orchestrator.stats().processed, 1);

    orchestrator.stop().await;
    orchestrator.stop().await;
    assert!(orchestrator.active_detectors().is_empty());
}

#[tokio::test]
async fn test_run_returns_after_shutdown() {
    let bus = LocalBus::new();
    let sink = collect_sink();
    let shutdown = CancellationToken::new();
    let sources = Sources {
        bus: Some(Arc::new(bus.clone())),
        ..Sources::default()
    };

    let mut orchestrator = Orchestrator::new(
        fast_config(vec![DetectorKind::Distributed]),
        sources,
        sink.clone(),
        shutdown.clone(),
    )
    .unwrap();

    let runner = tokio::spawn(async move {
        orchestrator.run().await.unwrap();
        orchestrator.stats()
    });

    assert!(wait_for(Duration::from_secs(2), || bus.subscriber_count() == 1).await);
    bus.publish(
        BusEvent::new("com.tinyspeck.slackmacgap.Message", "")
            .with_info("title", "Dana")
            .with_info("body", "lunch?"),
    );
    bus.publish(BusEvent::new("com.apple.screenIsLocked", "").with_info("title", "x"));

    assert!(wait_for(Duration::from_secs(2), || sink.len() == 1).await);
    shutdown.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run() did not return after shutdown")
        .unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(bus.subscriber_count(), 0);

    let events = sink.events();
    assert_eq!(events[0].sender(), "Dana");
    assert_eq!(events[0].source(), EventSource::Distributed);
}

#[tokio::test]
async fn test_missing_sources_skip_detectors() {
    let shutdown = CancellationToken::new();
    let mut orchestrator = Orchestrator::new(
        fast_config(vec![DetectorKind::Database, DetectorKind::Distributed]),
        Sources::default(),
        collect_sink(),
        shutdown,
    )
    .unwrap();

    assert_eq!(orchestrator.start().unwrap(), 0);
    assert!(orchestrator.start().is_err());
    orchestrator.stop().await;
}

#[tokio::test]
async fn test_discovery_logs_instead_of_reporting() {
    let bus = LocalBus::new();
    let sink = collect_sink();
    let mut config = fast_config(vec![DetectorKind::Database]);
    config.monitor.discovery = true;

    let mut orchestrator = Orchestrator::new(
        config,
        Sources {
            bus: Some(Arc::new(bus.clone())),
            ..Sources::default()
        },
        sink.clone(),
        CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(orchestrator.start().unwrap(), 1);
    assert_eq!(orchestrator.active_detectors(), vec!["DistributedDetector"]);

    bus.publish(
        BusEvent::new("com.tinyspeck.slackmacgap.Message", "")
            .with_info("title", "Dana")
            .with_info("body", "lunch?"),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.len(), 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_custom_bot_pattern_before_start() {
    let store = Arc::new(MemoryStore::new());
    let future = store_time_now() + 60.0;
    store.push(APP, record(1, future, payload("Release Announcer", "", "v2 is out")));
    store.push(APP, record(2, future + 1.0, payload("Erin", "", "nice")));

    let sink = collect_sink();
    let mut orchestrator = Orchestrator::new(
        fast_config(vec![DetectorKind::Database]),
        Sources {
            store: Some(store),
            ..Sources::default()
        },
        sink.clone(),
        CancellationToken::new(),
    )
    .unwrap();

    orchestrator
        .bot_filter_mut()
        .expect("pipeline is not shared before start")
        .add_pattern("announcer")
        .unwrap();

    orchestrator.start().unwrap();
    assert!(wait_for(Duration::from_secs(3), || orchestrator.stats().filtered == 1).await);
    assert!(orchestrator.bot_filter_mut().is_none());

    orchestrator.stop().await;
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sender(), "Erin");
}
