use thiserror::Error;

/// Errors raised by the feed distributor.
///
/// Only the construction variants ever reach callers. Per-event variants are logged and
/// absorbed inside the distributor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedError {
    /// No upstream source was supplied, or it refused a topic subscription.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The network requires protocol information before connecting and it could not be
    /// fetched.
    #[error("Protocol info unavailable: {0}")]
    ProtocolInfoUnavailable(String),

    /// A configured bound was rejected when building the distributor's stores.
    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),

    /// An upstream payload was malformed or missing required fields.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl FeedError {
    /// Returns `true` if this error prevents the distributor from being used at all.
    #[must_use]
    pub fn is_construction_fatal(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_) | Self::ProtocolInfoUnavailable(_) | Self::InvalidConfig(_)
        )
    }
}
