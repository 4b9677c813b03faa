//! Integration tests for the explorer services
//!
//! - `feed_tests`: websocket feed source and distributor end to end
//! - `resolver_tests`: association resolver over the HTTP indexer client
//! - `runtime_tests`: runtime start-up and shutdown with the production factory
//! - `mock_infrastructure`: reusable mock feed server and REST mocks
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! No external services are needed; every upstream is mocked on a local port.

#[cfg(test)]
mod feed_tests;

#[cfg(test)]
mod resolver_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
