//! Association resolver tests against a mockito indexer.
//!
//! Exercises the full HTTP path: query parameters, cursor pagination, and failure
//! isolation between association queries.

use crate::mock_infrastructure::IndexerMockBuilder;
use explorer_core::{
    indexer::{HttpIndexerClient, OutputCategory},
    metrics::MetricsCollector,
    resolver::{
        Address, AddressKind, Association, AssociationResolver, AssociationType, ResolverConfig,
    },
    upstream::HttpClient,
};
use std::{sync::Arc, time::Duration};

fn resolver(url: &str) -> AssociationResolver {
    let http = Arc::new(HttpClient::new().expect("http client"));
    let indexer = Arc::new(HttpIndexerClient::new(url, http, Duration::from_secs(2)));
    AssociationResolver::new(
        "testnet",
        indexer,
        ResolverConfig { call_timeout_ms: 2_000, ..Default::default() },
        Arc::new(MetricsCollector::new()),
    )
}

fn ids_for(associations: &[Association], association_type: AssociationType) -> Vec<String> {
    associations
        .iter()
        .find(|a| a.association_type == association_type)
        .map(|a| a.output_ids.clone())
        .unwrap_or_else(|| panic!("{association_type} missing from result"))
}

#[tokio::test]
async fn test_ed25519_address_pages_and_tolerates_failures() {
    let address = Address::new(AddressKind::Ed25519, "rms1qtest", "0xtest");
    let mut mock = IndexerMockBuilder::new().await;

    mock.mock_first_page(OutputCategory::Basic, "address", "rms1qtest", &["0xb1", "0xb2"], Some("c1"))
        .await;
    mock.mock_next_page(OutputCategory::Basic, "address", "rms1qtest", "c1", &["0xb3"], None)
        .await;
    mock.mock_first_page_error(OutputCategory::Nft, "issuer", "rms1qtest", 500).await;
    mock.mock_empty_associations(
        &address,
        &[AssociationType::BasicAddress, AssociationType::NftIssuer],
    )
    .await;

    let associations = resolver(&mock.url()).resolve(&address).await;

    assert_eq!(associations.len(), 13);
    assert_eq!(associations[0].association_type, AssociationType::BasicAddress);
    assert_eq!(associations[0].output_ids, vec!["0xb1", "0xb2", "0xb3"]);
    assert!(ids_for(&associations, AssociationType::NftIssuer).is_empty());
    assert!(associations
        .iter()
        .all(|a| !matches!(a.association_type, AssociationType::FoundryAlias | AssociationType::AliasIdentity)));
}

#[tokio::test]
async fn test_alias_address_runs_alias_only_queries() {
    let address = Address::new(AddressKind::Alias, "rms1palias", "0xaliasid");
    let mut mock = IndexerMockBuilder::new().await;

    mock.mock_first_page(OutputCategory::Foundry, "aliasAddress", "rms1palias", &["0xfoundry1"], None)
        .await;
    mock.mock_first_page(OutputCategory::Alias, "aliasId", "0xaliasid", &["0xaliasoutput"], None)
        .await;
    mock.mock_empty_associations(
        &address,
        &[AssociationType::FoundryAlias, AssociationType::AliasIdentity],
    )
    .await;

    let associations = resolver(&mock.url()).resolve(&address).await;

    assert_eq!(associations.len(), 15);
    assert_eq!(ids_for(&associations, AssociationType::FoundryAlias), vec!["0xfoundry1"]);
    assert_eq!(ids_for(&associations, AssociationType::AliasIdentity), vec!["0xaliasoutput"]);
    assert!(ids_for(&associations, AssociationType::AliasGovernor).is_empty());
}

#[tokio::test]
async fn test_failure_mid_pagination_keeps_earlier_pages() {
    let address = Address::new(AddressKind::Nft, "rms1znft", "0xnftid");
    let mut mock = IndexerMockBuilder::new().await;

    // The second page is never mocked, so the follow-up request fails with 501.
    mock.mock_first_page(OutputCategory::Nft, "address", "rms1znft", &["0xn1"], Some("c1")).await;
    mock.mock_empty_associations(&address, &[AssociationType::NftAddress]).await;

    let associations = resolver(&mock.url()).resolve(&address).await;

    assert_eq!(associations.len(), 13);
    assert_eq!(ids_for(&associations, AssociationType::NftAddress), vec!["0xn1"]);
}

#[tokio::test]
async fn test_unreachable_indexer_returns_every_association_empty() {
    let address = Address::new(AddressKind::Ed25519, "rms1qdown", "0xdown");

    let associations = resolver("http://127.0.0.1:1").resolve(&address).await;

    assert_eq!(associations.len(), 13);
    assert!(associations.iter().all(|a| a.output_ids.is_empty()));
}
