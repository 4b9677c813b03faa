//! Live feed tests over a real websocket connection.
//!
//! These wire a [`WebSocketFeedSource`] to a [`MockWebSocketServer`] and drive a
//! [`FeedDistributor`] end to end: subscribe messages on the wire, upstream ordering across
//! topics, cache updates and reconnect with resubscription.

use crate::mock_infrastructure::{block_payload, checkpoint_payload, MockWebSocketServer};
use explorer_core::{
    feed::{
        ChannelSubscriber, FeedDistributor, FeedDistributorConfig, FeedPayload, FeedState,
        FeedUpdate,
    },
    metrics::MetricsCollector,
    upstream::{FeedSource, WebSocketFeedSource, WebSocketSourceConfig},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    server: MockWebSocketServer,
    source: Arc<WebSocketFeedSource>,
    feed: Arc<FeedDistributor>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Harness {
    async fn start() -> Self {
        let server = MockWebSocketServer::new().await.expect("bind mock feed");
        let (shutdown_tx, _) = broadcast::channel(4);

        let source = Arc::new(
            WebSocketFeedSource::connect(
                "testnet",
                server.url(),
                None,
                WebSocketSourceConfig {
                    initial_reconnect_delay: Duration::from_millis(50),
                    ..Default::default()
                },
                shutdown_tx.subscribe(),
            )
            .await
            .expect("connect to mock feed"),
        );

        let config = FeedDistributorConfig { require_protocol_info: false, ..Default::default() };
        let feed = FeedDistributor::connect(
            "testnet",
            config,
            Some(Arc::clone(&source) as Arc<dyn FeedSource>),
            Arc::new(MetricsCollector::new()),
            shutdown_tx.subscribe(),
        )
        .await
        .expect("distributor connects");

        assert!(server.wait_for_subscriptions(3, WAIT).await, "all topics subscribed");
        Self { server, source, feed, shutdown_tx }
    }

    fn viewer(&self, id: &str) -> mpsc::Receiver<FeedUpdate> {
        let (subscriber, rx) = ChannelSubscriber::channel(64);
        self.feed.subscribe(id, Arc::new(subscriber));
        rx
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        self.feed.join().await;
        self.source.join().await;
        self.server.shutdown();
    }
}

async fn next_update(rx: &mut mpsc::Receiver<FeedUpdate>) -> FeedUpdate {
    timeout(WAIT, rx.recv()).await.expect("update within timeout").expect("channel open")
}

#[tokio::test]
async fn test_subscribes_every_topic_on_the_wire() {
    let harness = Harness::start().await;

    let mut topics = harness.server.subscribed_topics().await;
    topics.sort();
    assert_eq!(topics, vec!["block-metadata", "blocks", "milestones"]);

    harness.stop().await;
}

#[tokio::test]
async fn test_checkpoints_reach_every_viewer_in_order() {
    let harness = Harness::start().await;
    let mut alice = harness.viewer("alice");
    let mut bob = harness.viewer("bob");

    for index in 1..=5 {
        harness.server.send_event("milestones", checkpoint_payload(index)).await;
    }

    for rx in [&mut alice, &mut bob] {
        for expected in 1..=5 {
            match next_update(rx).await.payload {
                FeedPayload::Checkpoint(checkpoint) => assert_eq!(checkpoint.index, expected),
                other => panic!("expected checkpoint, got {other:?}"),
            }
        }
    }

    let recent: Vec<u32> = harness.feed.recent_checkpoints().iter().map(|c| c.index).collect();
    assert_eq!(recent, vec![5, 4, 3, 2, 1]);

    harness.stop().await;
}

#[tokio::test]
async fn test_mixed_topics_arrive_in_upstream_order() {
    let harness = Harness::start().await;
    let mut viewer = harness.viewer("viewer");

    harness.server.send_event("blocks", block_payload("0xb1")).await;
    harness.server.send_event("block-metadata", json!({ "blockId": "0xb1", "isSolid": true })).await;
    harness.server.send_event("milestones", checkpoint_payload(1)).await;
    harness.server.send_event("blocks", block_payload("0xb2")).await;
    harness.server.send_event("milestones", checkpoint_payload(2)).await;

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(match next_update(&mut viewer).await.payload {
            FeedPayload::Block(block) => block.block_id,
            FeedPayload::RecordMetadata(entry) => format!("meta:{}", entry.record_id),
            FeedPayload::Checkpoint(checkpoint) => format!("checkpoint{}", checkpoint.index),
        });
    }
    assert_eq!(seen, vec!["0xb1", "meta:0xb1", "checkpoint1", "0xb2", "checkpoint2"]);

    harness.stop().await;
}

#[tokio::test]
async fn test_blocks_are_forwarded_with_subscription_id() {
    let harness = Harness::start().await;
    let mut viewer = harness.viewer("viewer-7");

    harness.server.send_event("blocks", block_payload("0xblock1")).await;

    let update = next_update(&mut viewer).await;
    assert_eq!(update.subscription_id, "viewer-7");
    match update.payload {
        FeedPayload::Block(block) => {
            assert_eq!(block.block_id, "0xblock1");
            assert_eq!(block.payload_type, Some(6));
        }
        other => panic!("expected block, got {other:?}"),
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_metadata_notifications_are_merged() {
    let harness = Harness::start().await;
    let mut viewer = harness.viewer("viewer");

    harness.server.send_event("block-metadata", json!({ "blockId": "0xb1", "isSolid": true })).await;
    harness
        .server
        .send_event(
            "block-metadata",
            json!({
                "blockId": "0xb1",
                "referencedByMilestoneIndex": 7,
                "ledgerInclusionState": "included"
            }),
        )
        .await;

    let _first = next_update(&mut viewer).await;
    let merged = match next_update(&mut viewer).await.payload {
        FeedPayload::RecordMetadata(entry) => entry,
        other => panic!("expected metadata, got {other:?}"),
    };

    assert!(merged.is_solid);
    assert!(merged.is_included);
    assert!(!merged.is_conflicting);
    assert_eq!(merged.referenced_by_checkpoint, Some(7));

    let cached = harness.feed.record_metadata("0xb1").expect("entry cached");
    assert_eq!(*cached, merged);

    harness.stop().await;
}

#[tokio::test]
async fn test_invalid_payload_is_skipped() {
    let harness = Harness::start().await;
    let mut viewer = harness.viewer("viewer");

    harness.server.send_event("milestones", json!({ "unexpected": true })).await;
    harness.server.send_event("milestones", checkpoint_payload(2)).await;

    match next_update(&mut viewer).await.payload {
        FeedPayload::Checkpoint(checkpoint) => assert_eq!(checkpoint.index, 2),
        other => panic!("expected checkpoint, got {other:?}"),
    }
    assert_eq!(harness.feed.stats().invalid_payloads, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_reconnect_resubscribes_and_resumes() {
    let harness = Harness::start().await;
    let mut viewer = harness.viewer("viewer");

    harness.server.send_close().await;
    assert!(harness.server.wait_for_subscriptions(6, WAIT).await, "topics resubscribed");

    harness.server.send_event("milestones", checkpoint_payload(9)).await;

    match next_update(&mut viewer).await.payload {
        FeedPayload::Checkpoint(checkpoint) => assert_eq!(checkpoint.index, 9),
        other => panic!("expected checkpoint, got {other:?}"),
    }
    assert_eq!(harness.feed.state(), FeedState::Connected);

    harness.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_the_distributor() {
    let harness = Harness::start().await;
    let feed = Arc::clone(&harness.feed);

    harness.stop().await;

    assert_eq!(feed.state(), FeedState::Stopped);
}
