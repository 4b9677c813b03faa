//! Mock infrastructure for testing the explorer services
//!
//! Reusable mocks so feed, resolver and runtime tests run without a real node.
//!
//! ## Components
//!
//! - `MockWebSocketServer`: push feed server speaking the topic protocol
//! - `IndexerMockBuilder`: mockito server for node info and paginated indexer queries
//! - Test helpers for payloads and configuration
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{checkpoint_payload, MockWebSocketServer};
//!
//! let server = MockWebSocketServer::new().await?;
//! server.send_event("milestones", checkpoint_payload(42)).await;
//! ```

pub mod indexer_mock;
pub mod test_helpers;
pub mod websocket_mock;

pub use indexer_mock::IndexerMockBuilder;
pub use test_helpers::*;
pub use websocket_mock::MockWebSocketServer;
