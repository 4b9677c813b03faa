use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::trace;

use super::client::{IndexerClient, OutputCategory, OutputPage, OutputQuery};
use crate::upstream::{HttpClient, UpstreamError};

const OUTPUTS_PATH: &str = "/api/indexer/v1/outputs";

/// [`IndexerClient`] over the indexer REST API.
pub struct HttpIndexerClient {
    base_url: String,
    http: Arc<HttpClient>,
    timeout: Duration,
}

impl HttpIndexerClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, http: Arc<HttpClient>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http, timeout }
    }

    async fn fetch(
        &self,
        category: OutputCategory,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        let url = format!("{}{OUTPUTS_PATH}/{category}", self.base_url);
        let params = query.to_params(cursor);

        let page: OutputPage = self.http.get_json(&url, &params, self.timeout).await?;
        trace!(
            category = %category,
            items = page.items.len(),
            has_more = page.cursor.is_some(),
            "fetched indexer page"
        );
        Ok(page)
    }
}

#[async_trait]
impl IndexerClient for HttpIndexerClient {
    async fn basic_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        self.fetch(OutputCategory::Basic, query, cursor).await
    }

    async fn alias_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        self.fetch(OutputCategory::Alias, query, cursor).await
    }

    async fn foundry_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        self.fetch(OutputCategory::Foundry, query, cursor).await
    }

    async fn nft_outputs(
        &self,
        query: &OutputQuery,
        cursor: Option<&str>,
    ) -> Result<OutputPage, UpstreamError> {
        self.fetch(OutputCategory::Nft, query, cursor).await
    }
}
