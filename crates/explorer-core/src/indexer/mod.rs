//! Ledger indexer access.
//!
//! The resolver only depends on the [`IndexerClient`] trait; [`HttpIndexerClient`] is the
//! production implementation.

pub mod client;
pub mod http;

pub use client::{IndexerClient, OutputCategory, OutputPage, OutputQuery};
pub use http::HttpIndexerClient;
