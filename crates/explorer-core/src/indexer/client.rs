use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamError;

/// Record categories the indexer can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    Basic,
    Alias,
    Foundry,
    Nft,
}

impl OutputCategory {
    /// Path segment used by the indexer API.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Alias => "alias",
            Self::Foundry => "foundry",
            Self::Nft => "nft",
        }
    }
}

impl std::fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter set for one indexer query, sent as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputQuery {
    filters: Vec<(&'static str, String)>,
    page_size: Option<u32>,
}

impl OutputQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.filters.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn filters(&self) -> &[(&'static str, String)] {
        &self.filters
    }

    /// Query parameters for one page request.
    #[must_use]
    pub fn to_params(&self, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = self.filters.clone();
        if let Some(page_size) = self.page_size {
            params.push(("pageSize", page_size.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        params
    }
}

/// One page of record ids. `cursor` is absent on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPage {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Paginated queries against the ledger indexer, one per record category.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if the page cannot be fetched or decoded.
    async fn basic_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError>;

    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if the page cannot be fetched or decoded.
    async fn alias_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError>;

    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if the page cannot be fetched or decoded.
    async fn foundry_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError>;

    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if the page cannot be fetched or decoded.
    async fn nft_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError>;

    /// Dispatches to the category-specific query.
    ///
    /// # Errors
    ///
    /// Returns whatever the category query returns.
    async fn outputs(
        &self,
        category: OutputCategory,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        match category {
            OutputCategory::Basic => self.basic_outputs(query, cursor).await,
            OutputCategory::Alias => self.alias_outputs(query, cursor).await,
            OutputCategory::Foundry => self.foundry_outputs(query, cursor).await,
            OutputCategory::Nft => self.nft_outputs(query, cursor).await,
        }
    }
}
