//! Clients for the ledger node, its push feed, and shared HTTP plumbing.
//!
//! - [`source`]: the [`FeedSource`] seam the distributor consumes
//! - [`websocket`]: [`WebSocketFeedSource`], a reconnecting websocket implementation
//! - [`node_client`]: REST client for node info / protocol parameters
//! - [`http_client`]: semaphore-bounded reqwest wrapper shared with the indexer client

pub mod errors;
pub mod http_client;
pub mod node_client;
pub mod source;
pub mod websocket;

pub use errors::UpstreamError;
pub use http_client::{HttpClient, HttpClientConfig};
pub use node_client::NodeClient;
pub use source::{FeedSource, ProtocolInfo, SourceEvent};
pub use websocket::{FeedFailureTracker, WebSocketFeedSource, WebSocketSourceConfig};
