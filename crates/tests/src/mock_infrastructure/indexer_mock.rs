//! Mockito wrapper standing in for the node and indexer REST APIs.

use explorer_core::{
    indexer::OutputCategory,
    resolver::{Address, AssociationType},
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

const OUTPUTS_PATH: &str = "/api/indexer/v1/outputs";
const NODE_INFO_PATH: &str = "/api/core/v2/info";

/// Builder for node info and paginated indexer responses.
///
/// First pages are matched on the exact query string (filter only), follow-up pages on the
/// filter plus cursor, so the two never compete for the same request.
pub struct IndexerMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl IndexerMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Base URL for both the node and the indexer clients.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    pub async fn mock_node_info(&mut self, info: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("GET", NODE_INFO_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(info.to_string())
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    pub async fn mock_node_info_error(&mut self, status: usize) -> &mut Self {
        let mock = self
            .server
            .mock("GET", NODE_INFO_PATH)
            .with_status(status)
            .with_body("node unavailable")
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Mocks the first page of `category` filtered by `filter=value`.
    pub async fn mock_first_page(
        &mut self,
        category: OutputCategory,
        filter: &str,
        value: &str,
        items: &[&str],
        next_cursor: Option<&str>,
    ) -> &mut Self {
        let mock = self
            .server
            .mock("GET", format!("{OUTPUTS_PATH}/{category}").as_str())
            .match_query(Matcher::Exact(format!("{filter}={value}")))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(page_body(items, next_cursor))
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Mocks the page of `category` requested with `cursor`.
    pub async fn mock_next_page(
        &mut self,
        category: OutputCategory,
        filter: &str,
        value: &str,
        cursor: &str,
        items: &[&str],
        next_cursor: Option<&str>,
    ) -> &mut Self {
        let mock = self
            .server
            .mock("GET", format!("{OUTPUTS_PATH}/{category}").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(filter.into(), value.into()),
                Matcher::UrlEncoded("cursor".into(), cursor.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(page_body(items, next_cursor))
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Mocks a failing first page of `category` filtered by `filter=value`.
    pub async fn mock_first_page_error(
        &mut self,
        category: OutputCategory,
        filter: &str,
        value: &str,
        status: usize,
    ) -> &mut Self {
        let mock = self
            .server
            .mock("GET", format!("{OUTPUTS_PATH}/{category}").as_str())
            .match_query(Matcher::Exact(format!("{filter}={value}")))
            .with_status(status)
            .with_body("indexer error")
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Mocks an empty single page for every association of `address` not in `except`.
    pub async fn mock_empty_associations(
        &mut self,
        address: &Address,
        except: &[AssociationType],
    ) -> &mut Self {
        for association in AssociationType::ALL {
            if !association.applies_to(address.kind) || except.contains(&association) {
                continue;
            }
            let value = match association {
                AssociationType::AliasIdentity => address.id.clone(),
                _ => address.bech32.clone(),
            };
            self.mock_first_page(association.category(), association.filter(), &value, &[], None)
                .await;
        }
        self
    }
}

fn page_body(items: &[&str], next_cursor: Option<&str>) -> String {
    let mut body = json!({ "ledgerIndex": 1, "pageSize": 1000, "items": items });
    if let Some(cursor) = next_cursor {
        body["cursor"] = json!(cursor);
    }
    body.to_string()
}
