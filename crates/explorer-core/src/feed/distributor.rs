//! Per-network feed distributor.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──connect()──► Connected ──shutdown signal──► Stopped
//!        │
//!        └── missing source / protocol info / topic subscription ──► Err(FeedError)
//! ```
//!
//! A failed connect is not retried here; the caller decides whether the network can run
//! without a live feed. Reconnecting a dropped upstream is the source's job.
//!
//! # Ordering and isolation
//!
//! The source yields every topic on one stream, drained by a single pump task. The pump
//! applies an event to the caches and then pushes it onto each subscriber's bounded queue
//! without waiting. Each queue is drained by its own delivery task, so every subscriber
//! sees events in upstream order across all topics, and a slow subscriber only delays
//! itself. When a subscriber's queue is full the update is dropped for that subscriber and
//! counted.

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{
    errors::FeedError,
    subscriber::{DeliveryAccounting, FeedSubscriber, SubscriberQueue, SubscriberRegistry},
    types::{
        BlockEvent, CheckpointEvent, FeedPayload, FeedTopic, FeedUpdate, RecordMetadataEntry,
        RecordMetadataUpdate,
    },
};
use crate::{
    cache::{CheckpointHistory, MetadataEvictionPolicy, RecordMetadataCache},
    metrics::MetricsCollector,
    upstream::{FeedSource, ProtocolInfo, SourceEvent},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedDistributorConfig {
    /// Number of recent checkpoints kept for late joiners.
    pub checkpoint_history_size: usize,
    /// Maximum record metadata entries kept after each trim.
    pub metadata_budget: usize,
    pub metadata_policy: MetadataEvictionPolicy,
    /// Updates buffered per subscriber before further updates to it are dropped.
    pub subscriber_queue_capacity: usize,
    pub trim_interval_secs: u64,
    /// Fail `connect` when the node's protocol info cannot be fetched.
    pub require_protocol_info: bool,
}

impl Default for FeedDistributorConfig {
    fn default() -> Self {
        Self {
            checkpoint_history_size: 30,
            metadata_budget: 10_000,
            metadata_policy: MetadataEvictionPolicy::InsertionOrder,
            subscriber_queue_capacity: 256,
            trim_interval_secs: 60,
            require_protocol_info: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Uninitialized,
    Connected,
    Stopped,
}

/// Point-in-time view of a distributor, for status endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub network: String,
    pub state: FeedState,
    pub subscribers: usize,
    pub cached_checkpoints: usize,
    pub cached_metadata_entries: usize,
    pub events_received: u64,
    pub invalid_payloads: u64,
    pub broadcasts: u64,
    /// Updates dropped because a subscriber's queue was full.
    pub dropped_updates: u64,
    /// Deliveries that returned an error or panicked.
    pub delivery_failures: u64,
    pub metadata_evictions: u64,
}

#[derive(Default)]
struct FeedCounters {
    events_received: AtomicU64,
    invalid_payloads: AtomicU64,
    broadcasts: AtomicU64,
    dropped_updates: AtomicU64,
}

pub struct FeedDistributor {
    network: String,
    config: FeedDistributorConfig,
    source: Arc<dyn FeedSource>,
    subscribers: SubscriberRegistry,
    deliveries: Arc<DeliveryAccounting>,
    checkpoints: CheckpointHistory,
    metadata: RecordMetadataCache,
    protocol_info: ArcSwapOption<ProtocolInfo>,
    state: RwLock<FeedState>,
    counters: FeedCounters,
    metrics: Arc<MetricsCollector>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedDistributor {
    /// Subscribes to every upstream topic and starts the pump and trim tasks.
    ///
    /// # Errors
    ///
    /// - [`FeedError::UpstreamUnavailable`] if `source` is `None` or a topic subscription fails
    /// - [`FeedError::ProtocolInfoUnavailable`] if `config.require_protocol_info` is set and
    ///   the node info cannot be fetched
    /// - [`FeedError::InvalidConfig`] if a store bound or the subscriber queue capacity is
    ///   zero
    pub async fn connect(
        network: impl Into<String>,
        config: FeedDistributorConfig,
        source: Option<Arc<dyn FeedSource>>,
        metrics: Arc<MetricsCollector>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Arc<Self>, FeedError> {
        let network = network.into();

        let Some(source) = source else {
            return Err(FeedError::UpstreamUnavailable(format!(
                "no feed source available for network {network}"
            )));
        };

        let checkpoints = CheckpointHistory::new(config.checkpoint_history_size)
            .map_err(|e| FeedError::InvalidConfig(format!("checkpoint_history_size: {e}")))?;
        let metadata = RecordMetadataCache::new(config.metadata_budget, config.metadata_policy)
            .map_err(|e| FeedError::InvalidConfig(format!("metadata_budget: {e}")))?;
        if config.subscriber_queue_capacity == 0 {
            return Err(FeedError::InvalidConfig(
                "subscriber_queue_capacity must be greater than 0".to_string(),
            ));
        }

        let protocol_info = match source.protocol_info().await {
            Ok(info) => Some(Arc::new(info)),
            Err(e) if config.require_protocol_info => {
                error!(network = %network, error = %e, "protocol info unavailable");
                return Err(FeedError::ProtocolInfoUnavailable(e.to_string()));
            }
            Err(e) => {
                warn!(network = %network, error = %e, "protocol info unavailable, continuing");
                None
            }
        };

        let events = source.subscribe(&FeedTopic::ALL).await.map_err(|e| {
            error!(network = %network, error = %e, "topic subscription failed");
            FeedError::UpstreamUnavailable(format!("subscribe: {e}"))
        })?;

        let distributor = Arc::new(Self {
            deliveries: Arc::new(DeliveryAccounting::new(network.clone(), Arc::clone(&metrics))),
            network,
            config,
            source,
            subscribers: SubscriberRegistry::new(),
            checkpoints,
            metadata,
            protocol_info: ArcSwapOption::new(protocol_info),
            state: RwLock::new(FeedState::Uninitialized),
            counters: FeedCounters::default(),
            metrics,
            tasks: Mutex::new(Vec::with_capacity(2)),
        });

        let pump = tokio::spawn(Arc::clone(&distributor).run_pump(events, shutdown_rx.resubscribe()));
        let trim = distributor.spawn_trim_task(shutdown_rx);
        distributor.tasks.lock().extend([pump, trim]);

        *distributor.state.write() = FeedState::Connected;
        info!(
            network = %distributor.network,
            checkpoint_history_size = distributor.config.checkpoint_history_size,
            metadata_budget = distributor.config.metadata_budget,
            "feed distributor connected"
        );

        Ok(distributor)
    }

    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    #[must_use]
    pub fn state(&self) -> FeedState {
        *self.state.read()
    }

    /// Registers a subscriber, replacing any previous one with the same id.
    ///
    /// The subscriber receives events that arrive after registration, through its own
    /// queue and delivery task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn subscribe(&self, id: impl Into<String>, subscriber: Arc<dyn FeedSubscriber>) {
        let id = id.into();
        let queue = SubscriberQueue::spawn(
            id.clone(),
            subscriber,
            self.config.subscriber_queue_capacity,
            Arc::clone(&self.deliveries),
        );
        let replaced = self.subscribers.insert(queue);
        debug!(network = %self.network, subscription_id = %id, replaced, "subscriber registered");
        self.metrics.record_subscriber_count(&self.network, self.subscribers.len());
    }

    /// Removes a subscriber and stops its delivery task. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &str) {
        if self.subscribers.remove(id) {
            debug!(network = %self.network, subscription_id = %id, "subscriber removed");
            self.metrics.record_subscriber_count(&self.network, self.subscribers.len());
        }
    }

    /// Recent checkpoints, newest first.
    #[must_use]
    pub fn recent_checkpoints(&self) -> Vec<CheckpointEvent> {
        self.checkpoints.recent()
    }

    #[must_use]
    pub fn record_metadata(&self, record_id: &str) -> Option<Arc<RecordMetadataEntry>> {
        self.metadata.get(record_id)
    }

    #[must_use]
    pub fn protocol_info(&self) -> Option<Arc<ProtocolInfo>> {
        self.protocol_info.load_full()
    }

    /// Re-fetches protocol info from the source and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ProtocolInfoUnavailable`] if the fetch fails; the previous value
    /// is kept.
    pub async fn refresh_protocol_info(&self) -> Result<Arc<ProtocolInfo>, FeedError> {
        let info = Arc::new(
            self.source
                .protocol_info()
                .await
                .map_err(|e| FeedError::ProtocolInfoUnavailable(e.to_string()))?,
        );
        self.protocol_info.store(Some(Arc::clone(&info)));
        Ok(info)
    }

    #[must_use]
    pub fn stats(&self) -> FeedStats {
        FeedStats {
            network: self.network.clone(),
            state: self.state(),
            subscribers: self.subscribers.len(),
            cached_checkpoints: self.checkpoints.len(),
            cached_metadata_entries: self.metadata.len(),
            events_received: self.counters.events_received.load(Ordering::Relaxed),
            invalid_payloads: self.counters.invalid_payloads.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            dropped_updates: self.counters.dropped_updates.load(Ordering::Relaxed),
            delivery_failures: self.deliveries.failures(),
            metadata_evictions: self.metadata.eviction_count(),
        }
    }

    /// Trims the metadata cache to its budget. Returns the number of evicted entries.
    pub fn trim_metadata(&self) -> usize {
        let removed = self.metadata.trim();
        self.metrics.record_metadata_cache(&self.network, self.metadata.len(), removed);
        removed
    }

    /// Waits for the background tasks to exit after the shutdown signal was sent, then stops
    /// every subscriber's delivery task.
    pub async fn join(&self) {
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(network = %self.network, error = %e, "feed task terminated abnormally");
            }
        }
        self.subscribers.clear();
        *self.state.write() = FeedState::Stopped;
        info!(network = %self.network, "feed distributor stopped");
    }

    async fn run_pump(
        self: Arc<Self>,
        mut events: mpsc::Receiver<SourceEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    debug!(network = %self.network, "feed pump received shutdown signal");
                    break;
                }

                event = events.recv() => {
                    let Some(SourceEvent { topic, payload }) = event else {
                        warn!(network = %self.network, "upstream feed closed");
                        break;
                    };
                    self.handle_event(topic, &payload);
                }
            }
        }
    }

    fn handle_event(&self, topic: FeedTopic, payload: &Value) {
        self.counters.events_received.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_feed_event(&self.network, topic);

        let outgoing = match topic {
            FeedTopic::Blocks => BlockEvent::from_payload(payload).map(|b| Some(FeedPayload::Block(b))),
            FeedTopic::RecordMetadata => RecordMetadataUpdate::from_payload(payload)
                .map(|update| Some(FeedPayload::RecordMetadata(self.apply_metadata(&update)))),
            FeedTopic::Checkpoints => {
                CheckpointEvent::from_payload(payload).map(|event| self.apply_checkpoint(event))
            }
        };

        match outgoing {
            Ok(Some(payload)) => self.broadcast(&payload),
            Ok(None) => {}
            Err(e) => {
                self.counters.invalid_payloads.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_invalid_payload(&self.network, topic);
                warn!(network = %self.network, topic = %topic, error = %e, "skipping feed payload");
            }
        }
    }

    fn apply_metadata(&self, update: &RecordMetadataUpdate) -> RecordMetadataEntry {
        let evictions_before = self.metadata.eviction_count();
        let merged = self.metadata.merge(update);
        let evicted = self.metadata.eviction_count().saturating_sub(evictions_before);

        self.metrics.record_metadata_cache(
            &self.network,
            self.metadata.len(),
            usize::try_from(evicted).unwrap_or(usize::MAX),
        );

        (*merged).clone()
    }

    /// Stores a new checkpoint. Duplicates are dropped without a broadcast.
    fn apply_checkpoint(&self, event: CheckpointEvent) -> Option<FeedPayload> {
        if !self.checkpoints.insert(event.clone()) {
            return None;
        }

        self.metrics.record_checkpoint_history(&self.network, self.checkpoints.len());
        debug!(network = %self.network, index = event.index, "new checkpoint");
        Some(FeedPayload::Checkpoint(event))
    }

    /// Queues `payload` for a snapshot of the current subscribers without waiting on any of
    /// them.
    fn broadcast(&self, payload: &FeedPayload) {
        let queues = self.subscribers.snapshot();
        if queues.is_empty() {
            return;
        }

        let topic = payload.topic();
        let recipients = queues.len();
        let mut dropped = 0;

        for queue in queues {
            if !queue.offer(payload.clone()) {
                dropped += 1;
            }
        }

        if dropped > 0 {
            warn!(network = %self.network, topic = %topic, dropped, "subscriber queues full, update dropped");
        }

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters.dropped_updates.fetch_add(dropped as u64, Ordering::Relaxed);
        self.metrics.record_broadcast(&self.network, topic, recipients, dropped);
    }

    fn spawn_trim_task(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let distributor = Arc::clone(self);
        let period = Duration::from_secs(self.config.trim_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(network = %distributor.network, "trim task received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = distributor.trim_metadata();
                        if removed > 0 {
                            info!(
                                network = %distributor.network,
                                removed,
                                remaining = distributor.metadata.len(),
                                "trimmed record metadata"
                            );
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for FeedDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedDistributor")
            .field("network", &self.network)
            .field("state", &self.state())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}
