//! Runtime tests with the production service factory.
//!
//! Every network is built by `HttpServiceFactory` against local mocks: the feed against a
//! [`MockWebSocketServer`], node info and indexer queries against one mockito server.
//! These verify:
//! - Start-up wiring: registry keyed by network name, protocol info fetched at connect
//! - Start-up failure: unreachable feed or missing protocol info aborts the start
//! - Shutdown coordination: idempotent, stops every distributor, notifies receivers

use crate::mock_infrastructure::{
    app_config, checkpoint_payload, network_config, node_info, IndexerMockBuilder,
    MockWebSocketServer,
};
use explorer_core::{
    feed::{ChannelSubscriber, FeedError, FeedPayload, FeedState},
    indexer::OutputCategory,
    resolver::{Address, AddressKind, AssociationType},
    runtime::{ExplorerRuntime, RuntimeError},
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn test_runtime_serves_feed_and_resolver_per_network() {
    let feed_server = MockWebSocketServer::new().await.unwrap();
    let mut rest = IndexerMockBuilder::new().await;
    rest.mock_node_info(&node_info("testnet", 41)).await;

    let address = Address::new(AddressKind::Ed25519, "rms1qowner", "0xowner");
    rest.mock_first_page(OutputCategory::Basic, "address", "rms1qowner", &["0xbasic1"], None).await;
    rest.mock_empty_associations(&address, &[AssociationType::BasicAddress]).await;

    let config = app_config(vec![network_config("testnet", &feed_server.url(), &rest.url())]);
    let runtime = ExplorerRuntime::builder().with_config(config).build().await.unwrap();

    assert_eq!(runtime.registry().names(), vec!["testnet"]);
    let network = runtime.registry().get("testnet").unwrap();

    let info = network.feed().protocol_info().expect("protocol info fetched at connect");
    assert_eq!(info.network_name, "testnet");
    assert_eq!(info.latest_checkpoint_index, Some(41));

    assert!(feed_server.wait_for_subscriptions(3, WAIT).await);
    let (subscriber, mut rx) = ChannelSubscriber::channel(8);
    network.subscribe("viewer", Arc::new(subscriber));

    feed_server.send_event("milestones", checkpoint_payload(42)).await;
    let update = timeout(WAIT, rx.recv()).await.expect("update within timeout").unwrap();
    assert!(matches!(update.payload, FeedPayload::Checkpoint(ref c) if c.index == 42));
    assert_eq!(network.recent_checkpoints().len(), 1);

    let associations = network.resolve(&address).await;
    assert_eq!(associations[0].output_ids, vec!["0xbasic1"]);

    runtime.shutdown().await;
    assert_eq!(network.feed().state(), FeedState::Stopped);
}

#[tokio::test]
async fn test_runtime_start_fails_for_unreachable_feed() {
    let mut rest = IndexerMockBuilder::new().await;
    rest.mock_node_info(&node_info("testnet", 1)).await;

    let config = app_config(vec![network_config("testnet", "ws://127.0.0.1:1", &rest.url())]);
    let result = ExplorerRuntime::builder().with_config(config).build().await;

    match result {
        Err(RuntimeError::FeedConnection { network, source }) => {
            assert_eq!(network, "testnet");
            assert!(matches!(source, FeedError::UpstreamUnavailable(_)));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("runtime must not start without a feed"),
    }
}

#[tokio::test]
async fn test_runtime_start_fails_without_protocol_info() {
    let feed_server = MockWebSocketServer::new().await.unwrap();
    let mut rest = IndexerMockBuilder::new().await;
    rest.mock_node_info_error(503).await;

    let config = app_config(vec![network_config("testnet", &feed_server.url(), &rest.url())]);
    let result = ExplorerRuntime::builder().with_config(config).build().await;

    assert!(matches!(
        result,
        Err(RuntimeError::FeedConnection { source: FeedError::ProtocolInfoUnavailable(_), .. })
    ));
}

#[tokio::test]
async fn test_runtime_rejects_duplicate_network_names() {
    let config = app_config(vec![
        network_config("testnet", "ws://127.0.0.1:1", "http://127.0.0.1:1"),
        network_config("testnet", "ws://127.0.0.1:2", "http://127.0.0.1:2"),
    ]);

    let result = ExplorerRuntime::builder().with_config(config).build().await;

    assert!(matches!(result, Err(RuntimeError::ConfigValidation(msg)) if msg.contains("Duplicate")));
}

#[tokio::test]
async fn test_shutdown_notifies_every_receiver_once() {
    let feed_server = MockWebSocketServer::new().await.unwrap();
    let mut rest = IndexerMockBuilder::new().await;
    rest.mock_node_info(&node_info("testnet", 1)).await;

    let config = app_config(vec![network_config("testnet", &feed_server.url(), &rest.url())]);
    let runtime = ExplorerRuntime::builder().with_config(config).build().await.unwrap();

    let receivers: Vec<_> = (0..3).map(|_| runtime.shutdown_receiver()).collect();
    let tasks: Vec<_> = receivers
        .into_iter()
        .map(|mut rx| tokio::spawn(async move { rx.recv().await.is_ok() }))
        .collect();

    runtime.shutdown().await;
    runtime.shutdown().await;
    assert!(runtime.is_shutting_down());

    for task in tasks {
        let notified = timeout(WAIT, task).await.expect("receiver notified").unwrap();
        assert!(notified);
    }
}
