//! # Explorer Core
//!
//! Core library for the ledger explorer backend.
//!
//! This crate provides the server-side components that have to stay correct under
//! continuous network input while serving many concurrent viewers:
//!
//! - **[`cache`]**: Bounded in-memory stores. A generic LRU [`cache::BoundedCache`], the
//!   recent checkpoint ring, and the record metadata cache with periodic trimming.
//!
//! - **[`feed`]**: The live [`feed::FeedDistributor`] that subscribes once to an upstream push
//!   source and fans every event out to an arbitrary number of downstream subscribers.
//!
//! - **[`resolver`]**: The [`resolver::AssociationResolver`] that pages through the indexer
//!   for every association between an address and a record category.
//!
//! - **[`upstream`]**: Node-facing clients. The websocket event source and the node info client.
//!
//! - **[`indexer`]**: Indexer query abstraction and its HTTP implementation.
//!
//! - **[`runtime`]**: Per-network service registry and lifecycle management.
//!
//! - **[`config`]** / **[`metrics`]**: Layered configuration and Prometheus metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         NetworkRegistry                          │
//! │    "mainnet" ──► NetworkServices    "testnet" ──► NetworkServices │
//! └───────────────────────┬──────────────────────────────────────────┘
//!                         │
//!          ┌──────────────┴───────────────┐
//!          ▼                              ▼
//! ┌─────────────────────┐       ┌──────────────────────┐
//! │   FeedDistributor   │       │  AssociationResolver │
//! │  CheckpointHistory  │       │  (N paginated pairs) │
//! │ RecordMetadataCache │       └──────────┬───────────┘
//! └──────────┬──────────┘                  │
//!            │                             ▼
//!            ▼                      IndexerClient (HTTP)
//!     FeedSource (WebSocket)
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! upstream push ──► topic pump ──► cache update ──► broadcast ──► FeedSubscriber::deliver
//!                                                        │
//!                                                        └─ errors/panics isolated per subscriber
//! ```

pub mod cache;
pub mod config;
pub mod feed;
pub mod indexer;
pub mod metrics;
pub mod resolver;
pub mod runtime;
pub mod upstream;
