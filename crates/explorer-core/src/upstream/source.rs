use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::UpstreamError;
use crate::feed::types::FeedTopic;

/// Node and network identity reported by the upstream node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolInfo {
    pub node_name: String,
    pub node_version: String,
    pub network_name: String,
    /// Human readable part used when rendering addresses.
    pub bech32_hrp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_checkpoint_index: Option<u32>,
}

/// One raw event from the upstream, tagged with the topic it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub topic: FeedTopic,
    pub payload: Value,
}

impl SourceEvent {
    #[must_use]
    pub fn new(topic: FeedTopic, payload: Value) -> Self {
        Self { topic, payload }
    }
}

/// Push upstream the feed distributor subscribes to.
///
/// [`subscribe`](FeedSource::subscribe) yields a single receiver carrying the events of
/// every requested topic, interleaved in the order the upstream produced them. The
/// receiver closing means the subscription is gone for good. A later call replaces the
/// earlier receiver.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the node cannot be reached or its response is malformed.
    async fn protocol_info(&self) -> Result<ProtocolInfo, UpstreamError>;

    /// # Errors
    ///
    /// Returns an error if any of the topic subscriptions cannot be established.
    async fn subscribe(
        &self,
        topics: &[FeedTopic],
    ) -> Result<mpsc::Receiver<SourceEvent>, UpstreamError>;
}
