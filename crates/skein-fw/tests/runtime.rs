//! Runtime integration tests
//!
//! Runs a consumer and a producer against a forwarder hosted on the tokio
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_test::assert_ok;

use skein_core::{FaceScope, LinkType, Name, SystemClock};
use skein_fw::app::{Consumer, Producer};
use skein_fw::{Forwarder, ForwarderConfig, ForwarderRuntime};

fn create_runtime() -> (ForwarderRuntime, watch::Sender<bool>, watch::Receiver<bool>) {
    skein_logging::init_testing();
    let forwarder = Forwarder::new(ForwarderConfig::default(), Arc::new(SystemClock)).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (ForwarderRuntime::new(forwarder, shutdown_rx.clone()), shutdown_tx, shutdown_rx)
}

#[tokio::test]
async fn test_consumer_retrieves_from_producer() {
    let (mut runtime, shutdown_tx, shutdown_rx) = create_runtime();
    let prefix: Name = "/video".parse().unwrap();

    let consumer_face = runtime.add_face(FaceScope::Local, LinkType::PointToPoint).unwrap();
    let producer_face = runtime.add_face(FaceScope::Local, LinkType::PointToPoint).unwrap();
    runtime
        .forwarder_mut()
        .add_next_hop(&prefix, producer_face.id(), 0)
        .unwrap();
    let forwarder_task = runtime.spawn();

    let producer = Producer::new(prefix.clone()).with_payload_size(64);
    let producer_shutdown = shutdown_rx.clone();
    let producer_task = tokio::spawn(async move { producer.run(producer_face, producer_shutdown).await });

    let mut consumer = Consumer::new(prefix).with_max_seq(5);
    let finished = tokio::time::timeout(
        Duration::from_secs(10),
        consumer.run(consumer_face, Duration::from_millis(10), shutdown_rx),
    )
    .await;
    assert_ok!(assert_ok!(finished));

    assert!(consumer.is_done());
    let retrievals = consumer.retrievals();
    assert_eq!(retrievals.len(), 5);
    assert!(retrievals.iter().all(|r| r.hop_count == 1));
    assert!(consumer.rtt().smoothed_rtt().is_some());

    shutdown_tx.send(true).unwrap();
    let served = assert_ok!(producer_task.await.unwrap());
    assert!(served >= 5);

    let forwarder = forwarder_task.await.unwrap();
    assert!(forwarder.counters().satisfied_interests >= 5);
    assert!(forwarder.counters().in_data >= 5);
}

#[tokio::test]
async fn test_consumer_sees_no_route_nack() {
    let (mut runtime, shutdown_tx, shutdown_rx) = create_runtime();
    let consumer_face = runtime.add_face(FaceScope::Local, LinkType::PointToPoint).unwrap();
    let forwarder_task = runtime.spawn();

    let mut consumer = Consumer::new("/nowhere".parse().unwrap()).with_max_seq(1);
    let result = tokio::time::timeout(
        Duration::from_millis(300),
        consumer.run(consumer_face, Duration::from_millis(10), shutdown_rx),
    )
    .await;

    // never answered, so the consumer is still waiting when the timeout hits
    assert!(result.is_err());
    assert!(consumer.stats().nacks_received >= 1);
    assert!(consumer.retrievals().is_empty());

    shutdown_tx.send(true).unwrap();
    let forwarder = forwarder_task.await.unwrap();
    assert!(forwarder.counters().out_nacks >= 1);
}
