//! Prometheus metrics for the feed and resolver.
//!
//! All recording goes through the `metrics` facade macros, so every `record_*` call is a
//! lock-free atomic update. The recorder is installed once per process; later collectors
//! share the same handle.
//!
//! Network names are interned so labels do not allocate per event.

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::{feed::types::FeedTopic, resolver::AssociationType, upstream::UpstreamError};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static NETWORK_NAME_POOL: OnceLock<DashMap<String, &'static str>> = OnceLock::new();

/// Interns a network name. Networks come from configuration so the pool stays small.
#[inline]
fn network_to_static(network: &str) -> &'static str {
    let pool = NETWORK_NAME_POOL.get_or_init(DashMap::new);

    if let Some(interned) = pool.get(network) {
        return *interned;
    }

    let leaked: &'static str = Box::leak(network.to_string().into_boxed_str());
    pool.insert(network.to_string(), leaked);
    leaked
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to install primary Prometheus recorder, attempting fallback"
                );

                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "Using fallback Prometheus recorder (install error: {e}) - metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    // Feed Metrics

    /// Record an event received from the upstream feed
    pub fn record_feed_event(&self, network: &str, topic: FeedTopic) {
        counter!(
            "explorer_feed_events_total",
            "network" => network_to_static(network),
            "topic" => topic.as_str()
        )
        .increment(1);
    }

    /// Record an upstream payload that could not be parsed
    pub fn record_invalid_payload(&self, network: &str, topic: FeedTopic) {
        counter!(
            "explorer_feed_invalid_payloads_total",
            "network" => network_to_static(network),
            "topic" => topic.as_str()
        )
        .increment(1);
    }

    /// Record one fan-out of an update to `recipients` subscriber queues, `dropped` of which
    /// were full
    pub fn record_broadcast(&self, network: &str, topic: FeedTopic, recipients: usize, dropped: usize) {
        let network = network_to_static(network);
        counter!("explorer_feed_broadcasts_total", "network" => network, "topic" => topic.as_str())
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("explorer_feed_fanout_size", "network" => network).record(recipients as f64);

        if dropped > 0 {
            counter!(
                "explorer_feed_dropped_updates_total",
                "network" => network,
                "topic" => topic.as_str()
            )
            .increment(dropped as u64);
        }
    }

    /// Record an update a subscriber failed to accept
    pub fn record_delivery_failure(&self, network: &str, topic: FeedTopic, reason: &'static str) {
        counter!(
            "explorer_feed_delivery_failures_total",
            "network" => network_to_static(network),
            "topic" => topic.as_str(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn record_subscriber_count(&self, network: &str, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("explorer_feed_subscribers", "network" => network_to_static(network))
            .set(count as f64);
    }

    pub fn record_checkpoint_history(&self, network: &str, size: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("explorer_checkpoint_history_entries", "network" => network_to_static(network))
            .set(size as f64);
    }

    /// Record metadata cache size after a merge or trim, and any entries evicted by it
    pub fn record_metadata_cache(&self, network: &str, entries: usize, evicted: usize) {
        let network = network_to_static(network);
        #[allow(clippy::cast_precision_loss)]
        gauge!("explorer_metadata_cache_entries", "network" => network).set(entries as f64);

        if evicted > 0 {
            counter!("explorer_metadata_cache_evictions_total", "network" => network)
                .increment(evicted as u64);
        }
    }

    // Resolver Metrics

    /// Record a page fetched from the indexer for one association
    pub fn record_resolver_page(&self, network: &str, association: AssociationType, items: usize) {
        let network = network_to_static(network);
        counter!(
            "explorer_resolver_pages_total",
            "network" => network,
            "association" => association.as_str()
        )
        .increment(1);
        counter!("explorer_resolver_items_total", "network" => network).increment(items as u64);
    }

    /// Record an indexer call that ended an association early
    pub fn record_resolver_failure(
        &self,
        network: &str,
        association: AssociationType,
        error: &UpstreamError,
    ) {
        counter!(
            "explorer_resolver_failures_total",
            "network" => network_to_static(network),
            "association" => association.as_str(),
            "error_type" => error.as_metric_str()
        )
        .increment(1);
    }

    /// Record a whole association resolution
    pub fn record_resolve(&self, network: &str, associations: usize, duration_ms: u64) {
        let network = network_to_static(network);
        counter!("explorer_resolver_requests_total", "network" => network).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("explorer_resolver_associations", "network" => network).record(associations as f64);
        #[allow(clippy::cast_precision_loss)]
        histogram!("explorer_resolver_duration_seconds", "network" => network)
            .record(duration_ms as f64 / 1000.0);
    }

    /// Prometheus text exposition of everything recorded so far
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
