use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{HttpClient, ProtocolInfo, UpstreamError};

const NODE_INFO_PATH: &str = "/api/core/v2/info";

/// REST client for the ledger node's informational endpoints.
pub struct NodeClient {
    base_url: String,
    http: Arc<HttpClient>,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeInfo {
    name: String,
    version: String,
    #[serde(default)]
    status: Option<RawNodeStatus>,
    protocol: RawProtocol,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeStatus {
    #[serde(default)]
    latest_milestone: Option<RawMilestoneRef>,
}

#[derive(Deserialize)]
struct RawMilestoneRef {
    index: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProtocol {
    network_name: String,
    bech32_hrp: String,
}

impl From<RawNodeInfo> for ProtocolInfo {
    fn from(raw: RawNodeInfo) -> Self {
        Self {
            node_name: raw.name,
            node_version: raw.version,
            network_name: raw.protocol.network_name,
            bech32_hrp: raw.protocol.bech32_hrp,
            latest_checkpoint_index: raw
                .status
                .and_then(|s| s.latest_milestone)
                .map(|m| m.index),
        }
    }
}

impl NodeClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, http: Arc<HttpClient>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http, timeout }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches node identity and protocol parameters.
    ///
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if the request fails or the body is not node info.
    pub async fn info(&self) -> Result<ProtocolInfo, UpstreamError> {
        let url = format!("{}{NODE_INFO_PATH}", self.base_url);
        let raw: RawNodeInfo = self.http.get_json(&url, &[], self.timeout).await?;
        let info = ProtocolInfo::from(raw);

        debug!(
            node = %info.node_name,
            network = %info.network_name,
            latest_checkpoint = ?info.latest_checkpoint_index,
            "fetched node info"
        );

        Ok(info)
    }
}
