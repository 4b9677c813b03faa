//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and `set_default` entries
//! 2. **Config file**: TOML file named by the `EXPLORER_CONFIG` env var
//! 3. **Environment variables**: `EXPLORER__*` env vars override specific fields
//!
//! # Example
//!
//! ```toml
//! environment = "production"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [[networks]]
//! name = "shimmer"
//! feed_url = "wss://api.shimmer.network/api/feed/v1"
//! node_url = "https://api.shimmer.network"
//! indexer_url = "https://api.shimmer.network"
//!
//! [networks.feed]
//! checkpoint_history_size = 30
//! metadata_budget = 10000
//! metadata_policy = "insertion_order"
//!
//! [networks.resolver]
//! call_timeout_ms = 5000
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};

use crate::{
    feed::FeedDistributorConfig,
    resolver::ResolverConfig,
    upstream::{HttpClientConfig, WebSocketSourceConfig},
};

/// One ledger network served by the explorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Registry key, e.g. `"mainnet"`.
    pub name: String,

    /// Push feed websocket URL (`ws://` or `wss://`).
    pub feed_url: String,

    /// Node REST base URL, used for protocol info.
    pub node_url: String,

    /// Indexer REST base URL.
    pub indexer_url: String,

    /// Timeout for node REST calls in milliseconds. Defaults to `10000`.
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,

    #[serde(default)]
    pub feed: FeedDistributorConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

fn default_node_timeout_ms() -> u64 {
    10_000
}

impl NetworkConfig {
    #[must_use]
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Network name must not be empty".to_string());
        }
        validate_url(&self.name, "feed", &self.feed_url, &["ws", "wss"])?;
        validate_url(&self.name, "node", &self.node_url, &["http", "https"])?;
        validate_url(&self.name, "indexer", &self.indexer_url, &["http", "https"])?;
        if self.node_timeout_ms == 0 {
            return Err(format!("Node timeout must be greater than 0 for network {}", self.name));
        }
        if self.feed.checkpoint_history_size == 0 {
            return Err(format!(
                "Checkpoint history size must be greater than 0 for network {}",
                self.name
            ));
        }
        if self.feed.metadata_budget == 0 {
            return Err(format!("Metadata budget must be greater than 0 for network {}", self.name));
        }
        if self.feed.subscriber_queue_capacity == 0 {
            return Err(format!(
                "Subscriber queue capacity must be greater than 0 for network {}",
                self.name
            ));
        }
        if self.feed.trim_interval_secs == 0 {
            return Err(format!("Trim interval must be greater than 0 for network {}", self.name));
        }
        if self.resolver.call_timeout_ms == 0 {
            return Err(format!(
                "Resolver call timeout must be greater than 0 for network {}",
                self.name
            ));
        }
        if self.resolver.max_pages == 0 {
            return Err(format!(
                "Resolver page cap must be greater than 0 for network {}",
                self.name
            ));
        }
        Ok(())
    }
}

fn validate_url(network: &str, kind: &str, value: &str, schemes: &[&str]) -> Result<(), String> {
    let parsed = url::Url::parse(value)
        .map_err(|e| format!("Invalid {kind} URL for network {network}: {value} ({e})"))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(format!(
            "Invalid {kind} URL for network {network}: {value} (expected {})",
            schemes.join(" or ")
        ));
    }
    Ok(())
}

/// Upper bound for `http.max_retries`; retries share one call's timeout budget.
pub const MAX_HTTP_RETRIES: u32 = 10;

/// Shared HTTP client settings for node and indexer calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Maximum concurrent outbound requests. Defaults to `256`.
    pub max_concurrent_requests: usize,

    /// Retries for transient failures (5xx, 429, network errors). Defaults to `1`, at most
    /// [`MAX_HTTP_RETRIES`].
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { max_concurrent_requests: 256, max_retries: 1 }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            concurrent_limit: self.max_concurrent_requests,
            max_retries: self.max_retries,
            ..HttpClientConfig::default()
        }
    }
}

/// Feed websocket reconnect settings, shared by all networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    /// Buffered upstream events awaiting the distributor. Defaults to `1024`.
    pub channel_capacity: usize,

    /// Upper bound of the reconnect backoff in seconds. Defaults to `60`.
    pub max_reconnect_delay_secs: u64,
}

impl Default for FeedSourceConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024, max_reconnect_delay_secs: 60 }
    }
}

impl FeedSourceConfig {
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketSourceConfig {
        WebSocketSourceConfig {
            channel_capacity: self.channel_capacity,
            max_reconnect_delay: Duration::from_secs(self.max_reconnect_delay_secs),
            ..WebSocketSourceConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are recorded and reported. Defaults to `true`.
    pub enabled: bool,

    /// Interval between status reports in seconds. Defaults to `60`.
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, report_interval_secs: 60 }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment (e.g., "development", "production"). Defaults to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub feed_source: FeedSourceConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            networks: Vec::new(),
            http: HttpConfig::default(),
            feed_source: FeedSourceConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `EXPLORER__` prefix can override any configuration
    /// value. Use `__` as a separator for nested fields (e.g.,
    /// `EXPLORER__LOGGING__FORMAT=json`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("http.max_concurrent_requests", 256)?
            .set_default("http.max_retries", 1)?
            .set_default("feed_source.channel_capacity", 1024)?
            .set_default("feed_source.max_reconnect_delay_secs", 60)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.report_interval_secs", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("EXPLORER").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `EXPLORER_CONFIG` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("EXPLORER_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the configuration.
    ///
    /// - At least one network, with unique non-empty names
    /// - Feed URLs are websocket URLs, node and indexer URLs are HTTP(S)
    /// - Bounds, intervals and timeouts are greater than zero
    /// - HTTP retries do not exceed [`MAX_HTTP_RETRIES`]
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.networks.is_empty() {
            return Err("No networks configured".to_string());
        }

        let mut names = HashSet::new();
        for network in &self.networks {
            network.validate()?;
            if !names.insert(network.name.as_str()) {
                return Err(format!("Duplicate network name: {}", network.name));
            }
        }

        if self.http.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.http.max_retries > MAX_HTTP_RETRIES {
            return Err(format!("Max retries must be at most {MAX_HTTP_RETRIES}"));
        }

        if self.feed_source.channel_capacity == 0 {
            return Err("Feed channel capacity must be greater than 0".to_string());
        }

        if self.metrics.report_interval_secs == 0 {
            return Err("Metrics report interval must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }
}
