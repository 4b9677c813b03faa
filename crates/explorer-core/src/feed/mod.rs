//! Live feed distribution.
//!
//! One [`FeedDistributor`] per network holds the only upstream subscription and fans each
//! event out to every registered [`FeedSubscriber`]. Subscribers are isolated from each
//! other: a slow, failing or panicking subscriber never affects delivery to the rest.

pub mod distributor;
pub mod errors;
pub mod subscriber;
pub mod types;

pub use distributor::{FeedDistributor, FeedDistributorConfig, FeedState, FeedStats};
pub use errors::FeedError;
pub use subscriber::{ChannelSubscriber, DeliveryError, FeedSubscriber};
pub use types::{
    BlockEvent, CheckpointEvent, FeedPayload, FeedTopic, FeedUpdate, RecordMetadataEntry,
    RecordMetadataUpdate,
};
