//! Per-network service container and the registry that owns them.

use ahash::RandomState;
use std::{collections::HashMap, sync::Arc};

use crate::{
    config::NetworkConfig,
    feed::{CheckpointEvent, FeedDistributor, FeedSubscriber},
    resolver::{Address, Association, AssociationResolver},
};

/// The live services of one network: its feed distributor and its association resolver.
pub struct NetworkServices {
    config: NetworkConfig,
    feed: Arc<FeedDistributor>,
    resolver: Arc<AssociationResolver>,
}

impl NetworkServices {
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        feed: Arc<FeedDistributor>,
        resolver: Arc<AssociationResolver>,
    ) -> Self {
        Self { config, feed, resolver }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn feed(&self) -> &Arc<FeedDistributor> {
        &self.feed
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<AssociationResolver> {
        &self.resolver
    }

    pub fn subscribe(&self, id: impl Into<String>, subscriber: Arc<dyn FeedSubscriber>) {
        self.feed.subscribe(id, subscriber);
    }

    pub fn unsubscribe(&self, id: &str) {
        self.feed.unsubscribe(id);
    }

    #[must_use]
    pub fn recent_checkpoints(&self) -> Vec<CheckpointEvent> {
        self.feed.recent_checkpoints()
    }

    pub async fn resolve(&self, address: &Address) -> Vec<Association> {
        self.resolver.resolve(address).await
    }
}

/// Services for every configured network, keyed by network name.
///
/// Built once at startup and read-only afterwards, so lookups take no locks.
#[derive(Default)]
pub struct NetworkRegistry {
    networks: HashMap<String, Arc<NetworkServices>, RandomState>,
}

impl NetworkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { networks: HashMap::with_hasher(RandomState::new()) }
    }

    /// Adds `services` under its network name, returning the entry it replaced.
    pub fn insert(&mut self, services: NetworkServices) -> Option<Arc<NetworkServices>> {
        self.networks.insert(services.name().to_string(), Arc::new(services))
    }

    #[must_use]
    pub fn get(&self, network: &str) -> Option<&Arc<NetworkServices>> {
        self.networks.get(network)
    }

    /// Network names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NetworkServices>> {
        self.networks.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
