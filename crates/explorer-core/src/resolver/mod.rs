//! Address association resolution.
//!
//! For one address the resolver runs a fixed battery of indexer queries, one per
//! [`AssociationType`], and returns every result even when some queries fail. Each query
//! is paged until the indexer stops returning a cursor.
//!
//! ```text
//! resolve(address)
//!   ├─ BasicAddress ──────► page ─► page ─► done      ─┐
//!   ├─ BasicStorageReturn ► page ─► error (keep page 1) ├─► Vec<Association> (battery order)
//!   ├─ ...                                              │
//!   └─ NftSender ─────────► timeout (empty)            ─┘
//! ```
//!
//! Queries run concurrently. A failure or timeout ends only its own association, which
//! keeps whatever ids were collected before the failure.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    indexer::{IndexerClient, OutputCategory, OutputQuery},
    metrics::MetricsCollector,
    upstream::UpstreamError,
};

/// Address kinds, with their protocol type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Ed25519,
    Alias,
    Nft,
}

impl AddressKind {
    #[must_use]
    pub fn from_type_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Ed25519),
            8 => Some(Self::Alias),
            16 => Some(Self::Nft),
            _ => None,
        }
    }

    #[must_use]
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Ed25519 => 0,
            Self::Alias => 8,
            Self::Nft => 16,
        }
    }
}

/// An address as the indexer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub kind: AddressKind,
    /// Bech32 rendering, used by every address filter.
    pub bech32: String,
    /// Hex id of the address body. For alias addresses this is the alias id.
    pub id: String,
}

impl Address {
    #[must_use]
    pub fn new(kind: AddressKind, bech32: impl Into<String>, id: impl Into<String>) -> Self {
        Self { kind, bech32: bech32.into(), id: id.into() }
    }
}

/// One (record category, filter) pair of the query battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssociationType {
    BasicAddress,
    BasicStorageReturn,
    BasicExpirationReturn,
    BasicSender,
    AliasStateController,
    AliasGovernor,
    AliasIssuer,
    AliasSender,
    /// The alias output this alias address identifies.
    AliasIdentity,
    FoundryAlias,
    NftAddress,
    NftStorageReturn,
    NftExpirationReturn,
    NftIssuer,
    NftSender,
}

impl AssociationType {
    /// The full battery, in result order.
    pub const ALL: [AssociationType; 15] = [
        Self::BasicAddress,
        Self::BasicStorageReturn,
        Self::BasicExpirationReturn,
        Self::BasicSender,
        Self::AliasStateController,
        Self::AliasGovernor,
        Self::AliasIssuer,
        Self::AliasSender,
        Self::AliasIdentity,
        Self::FoundryAlias,
        Self::NftAddress,
        Self::NftStorageReturn,
        Self::NftExpirationReturn,
        Self::NftIssuer,
        Self::NftSender,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicAddress => "basic_address",
            Self::BasicStorageReturn => "basic_storage_return",
            Self::BasicExpirationReturn => "basic_expiration_return",
            Self::BasicSender => "basic_sender",
            Self::AliasStateController => "alias_state_controller",
            Self::AliasGovernor => "alias_governor",
            Self::AliasIssuer => "alias_issuer",
            Self::AliasSender => "alias_sender",
            Self::AliasIdentity => "alias_identity",
            Self::FoundryAlias => "foundry_alias",
            Self::NftAddress => "nft_address",
            Self::NftStorageReturn => "nft_storage_return",
            Self::NftExpirationReturn => "nft_expiration_return",
            Self::NftIssuer => "nft_issuer",
            Self::NftSender => "nft_sender",
        }
    }

    #[must_use]
    pub fn category(&self) -> OutputCategory {
        match self {
            Self::BasicAddress |
            Self::BasicStorageReturn |
            Self::BasicExpirationReturn |
            Self::BasicSender => OutputCategory::Basic,
            Self::AliasStateController |
            Self::AliasGovernor |
            Self::AliasIssuer |
            Self::AliasSender |
            Self::AliasIdentity => OutputCategory::Alias,
            Self::FoundryAlias => OutputCategory::Foundry,
            Self::NftAddress |
            Self::NftStorageReturn |
            Self::NftExpirationReturn |
            Self::NftIssuer |
            Self::NftSender => OutputCategory::Nft,
        }
    }

    /// Indexer filter parameter this association queries by.
    #[must_use]
    pub fn filter(&self) -> &'static str {
        match self {
            Self::BasicAddress | Self::NftAddress => "address",
            Self::BasicStorageReturn | Self::NftStorageReturn => "storageDepositReturnAddress",
            Self::BasicExpirationReturn | Self::NftExpirationReturn => "expirationReturnAddress",
            Self::BasicSender | Self::AliasSender | Self::NftSender => "sender",
            Self::AliasStateController => "stateController",
            Self::AliasGovernor => "governor",
            Self::AliasIssuer | Self::NftIssuer => "issuer",
            Self::AliasIdentity => "aliasId",
            Self::FoundryAlias => "aliasAddress",
        }
    }

    /// Whether this pair is queried for an address of `kind`.
    #[must_use]
    pub fn applies_to(&self, kind: AddressKind) -> bool {
        match self {
            Self::FoundryAlias | Self::AliasIdentity => kind == AddressKind::Alias,
            _ => true,
        }
    }

    fn query(&self, address: &Address) -> OutputQuery {
        let value = match self {
            Self::AliasIdentity => address.id.as_str(),
            _ => address.bech32.as_str(),
        };
        OutputQuery::new().filter(self.filter(), value)
    }
}

impl std::fmt::Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record ids found for one association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    #[serde(rename = "type")]
    pub association_type: AssociationType,
    pub output_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on a single indexer page request, retries included.
    pub call_timeout_ms: u64,
    /// Pages fetched per association before giving up on the cursor.
    pub max_pages: u32,
    /// Requested page size; the indexer default when unset.
    pub page_size: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { call_timeout_ms: 5_000, max_pages: 1_000, page_size: None }
    }
}

pub struct AssociationResolver {
    network: String,
    indexer: Arc<dyn IndexerClient>,
    config: ResolverConfig,
    metrics: Arc<MetricsCollector>,
}

impl AssociationResolver {
    #[must_use]
    pub fn new(
        network: impl Into<String>,
        indexer: Arc<dyn IndexerClient>,
        config: ResolverConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { network: network.into(), indexer, config, metrics }
    }

    /// Resolves every applicable association for `address`.
    ///
    /// Never fails: an association whose query failed is returned with the ids collected
    /// before the failure, possibly none.
    pub async fn resolve(&self, address: &Address) -> Vec<Association> {
        let start = Instant::now();

        let pairs = AssociationType::ALL
            .into_iter()
            .filter(|association_type| association_type.applies_to(address.kind))
            .map(|association_type| self.resolve_pair(association_type, address));
        let associations = join_all(pairs).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_resolve(&self.network, associations.len(), duration_ms);
        debug!(
            network = %self.network,
            address = %address.bech32,
            associations = associations.len(),
            duration_ms,
            "resolved address associations"
        );

        associations
    }

    async fn resolve_pair(&self, association_type: AssociationType, address: &Address) -> Association {
        let query = association_type.query(address).page_size(self.config.page_size);
        let category = association_type.category();
        let call_timeout = Duration::from_millis(self.config.call_timeout_ms);

        let mut output_ids = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            if pages >= self.config.max_pages {
                warn!(
                    network = %self.network,
                    association = %association_type,
                    pages,
                    "page cap reached, truncating association"
                );
                break;
            }
            pages += 1;

            let call = self.indexer.outputs(category, &query, cursor.as_deref());
            let page = match tokio::time::timeout(call_timeout, call).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    self.record_failure(association_type, &e, output_ids.len());
                    break;
                }
                Err(_) => {
                    self.record_failure(association_type, &UpstreamError::Timeout, output_ids.len());
                    break;
                }
            };

            self.metrics.record_resolver_page(&self.network, association_type, page.items.len());
            output_ids.extend(page.items);

            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Association { association_type, output_ids }
    }

    fn record_failure(&self, association_type: AssociationType, error: &UpstreamError, kept: usize) {
        warn!(
            network = %self.network,
            association = %association_type,
            error = %error,
            kept,
            "indexer query failed, keeping partial association"
        );
        self.metrics.record_resolver_failure(&self.network, association_type, error);
    }
}
