//! Payload and configuration fixtures.

use explorer_core::{
    config::{AppConfig, NetworkConfig},
    feed::FeedDistributorConfig,
    resolver::ResolverConfig,
};
use serde_json::{json, Value};

/// Checkpoint notification as the node pushes it on the `milestones` topic.
#[must_use]
pub fn checkpoint_payload(index: u32) -> Value {
    json!({
        "blockId": format!("0x{:064x}", u64::from(index) * 7),
        "milestoneId": format!("0x{:064x}", index),
        "milestoneIndex": index,
        "timestamp": 1_700_000_000 + u64::from(index)
    })
}

/// Block notification on the `blocks` topic.
#[must_use]
pub fn block_payload(block_id: &str) -> Value {
    json!({
        "blockId": block_id,
        "payloadType": 6,
        "strongParents": [format!("{block_id}-parent")]
    })
}

/// Node info response body for `GET /api/core/v2/info`.
#[must_use]
pub fn node_info(network_name: &str, latest_milestone: u32) -> Value {
    json!({
        "name": "HORNET",
        "version": "2.0.1",
        "status": {
            "isHealthy": true,
            "latestMilestone": { "index": latest_milestone, "timestamp": 1_700_000_000 }
        },
        "protocol": {
            "networkName": network_name,
            "bech32Hrp": "rms",
            "version": 2
        }
    })
}

/// A network pointing its feed at `feed_url` and both REST clients at `rest_url`.
#[must_use]
pub fn network_config(name: &str, feed_url: &str, rest_url: &str) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        feed_url: feed_url.to_string(),
        node_url: rest_url.to_string(),
        indexer_url: rest_url.to_string(),
        node_timeout_ms: 2_000,
        feed: FeedDistributorConfig::default(),
        resolver: ResolverConfig { call_timeout_ms: 2_000, ..Default::default() },
    }
}

#[must_use]
pub fn app_config(networks: Vec<NetworkConfig>) -> AppConfig {
    AppConfig { networks, ..Default::default() }
}
