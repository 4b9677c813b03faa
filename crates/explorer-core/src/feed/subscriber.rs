//! Downstream subscribers and their delivery queues.
//!
//! Transports (websocket, SSE, ...) implement [`FeedSubscriber`] and register one instance
//! per connection. Each registered subscriber gets a bounded queue drained by its own
//! delivery task, so a slow or stuck subscriber only ever delays itself. The distributor
//! enqueues without waiting; a full queue drops the update for that subscriber alone.

use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

use super::types::{FeedPayload, FeedTopic, FeedUpdate};
use crate::metrics::MetricsCollector;

/// Errors a subscriber may return from [`FeedSubscriber::deliver`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The downstream connection is gone.
    #[error("Subscriber closed")]
    Closed,

    /// The downstream buffer is full and the update was not accepted.
    #[error("Subscriber lagging, update not accepted")]
    Lagged,

    /// The subscriber rejected the update for another reason.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    #[must_use]
    pub fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Lagged => "lagged",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Receives feed updates for a single downstream subscription.
#[async_trait]
pub trait FeedSubscriber: Send + Sync {
    /// Delivers one update.
    ///
    /// Calls for one subscriber never overlap and arrive in upstream order.
    ///
    /// # Errors
    ///
    /// Any error is logged by the distributor and otherwise ignored. The subscriber stays
    /// registered until its owner unsubscribes it.
    async fn deliver(&self, update: FeedUpdate) -> Result<(), DeliveryError>;
}

/// Subscriber backed by a bounded channel, for transports that run their own writer task.
///
/// When the channel is full the update is refused with [`DeliveryError::Lagged`].
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::Sender<FeedUpdate>,
}

impl ChannelSubscriber {
    /// Creates a subscriber and the receiver its transport should drain.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<FeedUpdate>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl FeedSubscriber for ChannelSubscriber {
    async fn deliver(&self, update: FeedUpdate) -> Result<(), DeliveryError> {
        self.sender.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagged,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Failure accounting shared by one distributor's delivery tasks.
pub(crate) struct DeliveryAccounting {
    network: String,
    metrics: Arc<MetricsCollector>,
    failures: AtomicU64,
}

impl DeliveryAccounting {
    pub(crate) fn new(network: impl Into<String>, metrics: Arc<MetricsCollector>) -> Self {
        Self { network: network.into(), metrics, failures: AtomicU64::new(0) }
    }

    fn record(&self, topic: FeedTopic, reason: &'static str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_delivery_failure(&self.network, topic, reason);
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Bounded queue in front of one subscriber, drained by a dedicated task.
///
/// Dropping the queue aborts the task; updates still queued are discarded.
pub(crate) struct SubscriberQueue {
    id: String,
    sender: mpsc::Sender<FeedPayload>,
    task: JoinHandle<()>,
}

impl SubscriberQueue {
    /// Starts the delivery task for `subscriber`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub(crate) fn spawn(
        id: impl Into<String>,
        subscriber: Arc<dyn FeedSubscriber>,
        capacity: usize,
        accounting: Arc<DeliveryAccounting>,
    ) -> Self {
        let id = id.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_delivery(id.clone(), subscriber, receiver, accounting));
        Self { id, sender, task }
    }

    /// Queues `payload` without waiting. Returns `false` if the queue is full.
    pub(crate) fn offer(&self, payload: FeedPayload) -> bool {
        self.sender.try_send(payload).is_ok()
    }
}

impl Drop for SubscriberQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_delivery(
    id: String,
    subscriber: Arc<dyn FeedSubscriber>,
    mut receiver: mpsc::Receiver<FeedPayload>,
    accounting: Arc<DeliveryAccounting>,
) {
    while let Some(payload) = receiver.recv().await {
        let topic = payload.topic();
        let update = FeedUpdate { subscription_id: id.clone(), payload };

        match AssertUnwindSafe(subscriber.deliver(update)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(network = %accounting.network, subscription_id = %id, error = %e, "delivery failed");
                accounting.record(topic, e.as_metric_str());
            }
            Err(_) => {
                error!(network = %accounting.network, subscription_id = %id, "subscriber panicked during delivery");
                accounting.record(topic, "panic");
            }
        }
    }
}

/// Concurrent map from subscription id to delivery queue.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    queues: DashMap<String, Arc<SubscriberQueue>, RandomState>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self { queues: DashMap::with_hasher(RandomState::new()) }
    }

    /// Registers `queue` under its id, returning `true` if it replaced an existing one.
    pub(crate) fn insert(&self, queue: SubscriberQueue) -> bool {
        self.queues.insert(queue.id.clone(), Arc::new(queue)).is_some()
    }

    /// Removes `id`, returning `true` if it was registered.
    pub(crate) fn remove(&self, id: &str) -> bool {
        self.queues.remove(id).is_some()
    }

    /// Stable copy of the current queues for one broadcast.
    pub(crate) fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        self.queues.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Removes every queue, stopping their delivery tasks.
    pub(crate) fn clear(&self) {
        self.queues.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.queues.len()
    }
}
