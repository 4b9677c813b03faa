//! Bounded in-memory stores backing the live feed.
//!
//! All state in this crate is in-memory and rebuilt from the upstream source after a
//! restart, so every store here has a hard bound on the number of entries it keeps.
//!
//! ```text
//!   ┌──────────────────┐   ┌────────────────────┐   ┌──────────────────────┐
//!   │  BoundedCache    │   │ CheckpointHistory  │   │ RecordMetadataCache  │
//!   │                  │   │                    │   │                      │
//!   │ • strict LRU     │   │ • newest first     │   │ • shallow merge      │
//!   │ • O(1) get/put   │   │ • dedup by anchor  │   │ • periodic trim      │
//!   │ • slab-backed    │   │ • count bounded    │   │ • insertion or LRU   │
//!   └──────────────────┘   └────────────────────┘   └──────────────────────┘
//! ```
//!
//! # Error Handling Conventions
//!
//! - **`Option<T>`**: cache miss (expected, not an error)
//! - **`Result<T, E>`**: construction with an invalid bound
//!
//! Lookups and inserts never fail once a store is constructed.

pub mod bounded;
pub mod checkpoints;
pub mod metadata;

pub use bounded::{BoundedCache, BoundedCacheError};
pub use checkpoints::CheckpointHistory;
pub use metadata::{MetadataEvictionPolicy, RecordMetadataCache};
