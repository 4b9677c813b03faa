//! Builder wiring configuration, upstream clients and per-network services together.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{
    lifecycle::ExplorerRuntime,
    registry::{NetworkRegistry, NetworkServices},
};
use crate::{
    config::{AppConfig, FeedSourceConfig, NetworkConfig},
    feed::{FeedDistributor, FeedError},
    indexer::{HttpIndexerClient, IndexerClient},
    metrics::MetricsCollector,
    resolver::AssociationResolver,
    upstream::{FeedSource, HttpClient, NodeClient, UpstreamError, WebSocketFeedSource},
};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A network's feed could not be connected
    #[error("Feed for network {network} failed to connect: {source}")]
    FeedConnection {
        network: String,
        #[source]
        source: FeedError,
    },

    /// Shared upstream clients could not be built
    #[error("Runtime initialization failed: {0}")]
    Initialization(#[from] UpstreamError),
}

/// Creates the upstream clients for a network.
///
/// The runtime only talks to upstreams through this seam, so tests and embedders can
/// substitute in-memory sources and indexers.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    /// Returns the network's push source, or `None` if it cannot be reached.
    async fn feed_source(
        &self,
        network: &NetworkConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<Arc<dyn FeedSource>>;

    fn indexer(&self, network: &NetworkConfig) -> Arc<dyn IndexerClient>;
}

/// Production factory: websocket feed, REST node and indexer clients over one shared
/// HTTP client.
pub struct HttpServiceFactory {
    http: Arc<HttpClient>,
    feed_source: FeedSourceConfig,
}

impl HttpServiceFactory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, UpstreamError> {
        let http = Arc::new(HttpClient::with_config(config.http.client_config())?);
        Ok(Self { http, feed_source: config.feed_source.clone() })
    }
}

#[async_trait]
impl ServiceFactory for HttpServiceFactory {
    async fn feed_source(
        &self,
        network: &NetworkConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<Arc<dyn FeedSource>> {
        let node =
            Arc::new(NodeClient::new(&network.node_url, Arc::clone(&self.http), network.node_timeout()));

        match WebSocketFeedSource::connect(
            &network.name,
            &network.feed_url,
            Some(node),
            self.feed_source.websocket_config(),
            shutdown_rx,
        )
        .await
        {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                error!(network = %network.name, error = %e, "feed source unavailable");
                None
            }
        }
    }

    fn indexer(&self, network: &NetworkConfig) -> Arc<dyn IndexerClient> {
        Arc::new(HttpIndexerClient::new(
            &network.indexer_url,
            Arc::clone(&self.http),
            std::time::Duration::from_millis(network.resolver.call_timeout_ms),
        ))
    }
}

/// Builder for constructing an [`ExplorerRuntime`].
///
/// # Examples
///
/// ```no_run
/// use explorer_core::{config::AppConfig, runtime::ExplorerRuntime};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
/// let runtime = ExplorerRuntime::builder().with_config(config).build().await?;
///
/// if let Some(network) = runtime.registry().get("shimmer") {
///     let checkpoints = network.recent_checkpoints();
/// #   let _ = checkpoints;
/// }
///
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ExplorerRuntimeBuilder {
    config: Option<AppConfig>,
    factory: Option<Arc<dyn ServiceFactory>>,
}

const SHUTDOWN_CHANNEL_CAPACITY: usize = 16;

impl Default for ExplorerRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, factory: None }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the production [`HttpServiceFactory`].
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ServiceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validates the configuration and starts every network.
    ///
    /// Start-up is all or nothing: if any network's feed fails to connect, the networks
    /// already started are signalled to stop and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ConfigValidation`] if the configuration is invalid
    /// - [`RuntimeError::FeedConnection`] if a network's feed cannot be connected
    /// - [`RuntimeError::Initialization`] if the HTTP client cannot be built
    pub async fn build(self) -> Result<ExplorerRuntime, RuntimeError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let metrics = Arc::new(MetricsCollector::new());
        let factory: Arc<dyn ServiceFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(HttpServiceFactory::new(&config)?),
        };

        let (shutdown_tx, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        let mut registry = NetworkRegistry::new();

        for network in &config.networks {
            let source = factory.feed_source(network, shutdown_tx.subscribe()).await;

            let feed = match FeedDistributor::connect(
                &network.name,
                network.feed.clone(),
                source,
                Arc::clone(&metrics),
                shutdown_tx.subscribe(),
            )
            .await
            {
                Ok(feed) => feed,
                Err(e) => {
                    error!(network = %network.name, error = %e, "network failed to start");
                    let _ = shutdown_tx.send(());
                    for started in registry.iter() {
                        started.feed().join().await;
                    }
                    return Err(RuntimeError::FeedConnection { network: network.name.clone(), source: e });
                }
            };

            let resolver = Arc::new(AssociationResolver::new(
                &network.name,
                factory.indexer(network),
                network.resolver.clone(),
                Arc::clone(&metrics),
            ));

            registry.insert(NetworkServices::new(network.clone(), feed, resolver));
            debug!(network = %network.name, "network services registered");
        }

        info!(networks = ?registry.names(), "explorer runtime started");
        Ok(ExplorerRuntime::new(registry, metrics, shutdown_tx, config))
    }
}
