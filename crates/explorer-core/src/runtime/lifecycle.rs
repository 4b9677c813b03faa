//! Runtime lifecycle: status reporting and graceful shutdown.

use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::ExplorerRuntimeBuilder, registry::NetworkRegistry};
use crate::{config::AppConfig, metrics::MetricsCollector};

/// Owns every network's services and coordinates their shutdown.
///
/// All background tasks (feed pumps, trim jobs, feed readers, the status reporter)
/// listen on one broadcast channel. [`shutdown`](Self::shutdown) signals it and waits
/// for the distributors to stop.
pub struct ExplorerRuntime {
    registry: Arc<NetworkRegistry>,
    metrics: Arc<MetricsCollector>,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    report_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_initiated: AtomicBool,
}

impl ExplorerRuntime {
    #[must_use]
    pub fn builder() -> ExplorerRuntimeBuilder {
        ExplorerRuntimeBuilder::new()
    }

    pub(super) fn new(
        registry: NetworkRegistry,
        metrics: Arc<MetricsCollector>,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
    ) -> Self {
        let registry = Arc::new(registry);

        let report_task = if config.metrics.enabled {
            let task = Self::start_status_reporter(
                Arc::clone(&registry),
                Duration::from_secs(config.metrics.report_interval_secs.max(1)),
                shutdown_tx.subscribe(),
            );
            debug!("status reporter task started");
            Some(task)
        } else {
            None
        };

        Self {
            registry,
            metrics,
            shutdown_tx,
            config,
            report_task: Mutex::new(report_task),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Signals every background task to stop and waits for the distributors to finish.
    ///
    /// Idempotent: only the first call does anything.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating explorer runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "Failed to send shutdown signal (no receivers)");
        }

        for network in self.registry.iter() {
            network.feed().join().await;
        }

        let report_task = self.report_task.lock().take();
        if let Some(task) = report_task {
            match task.await {
                Ok(()) => debug!("status reporter completed"),
                Err(e) if e.is_cancelled() => debug!("status reporter cancelled"),
                Err(e) => error!(error = %e, "status reporter failed"),
            }
        }

        info!("Explorer runtime shutdown complete");
    }

    /// Resolves once shutdown has been initiated, immediately if it already was.
    ///
    /// Lets tasks that only hold a reference to the runtime park until another caller runs
    /// [`shutdown`](Self::shutdown).
    pub async fn wait_for_shutdown(&self) {
        // Subscribe before checking the flag so a signal sent in between is not missed.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = shutdown_rx.recv().await;
        debug!("Shutdown signal received");
    }

    /// Periodically logs each network's feed statistics.
    fn start_status_reporter(
        registry: Arc<NetworkRegistry>,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        for network in registry.iter() {
                            let stats = network.feed().stats();
                            info!(
                                network = %stats.network,
                                subscribers = stats.subscribers,
                                checkpoints = stats.cached_checkpoints,
                                metadata_entries = stats.cached_metadata_entries,
                                events = stats.events_received,
                                dropped_updates = stats.dropped_updates,
                                delivery_failures = stats.delivery_failures,
                                "feed status"
                            );
                        }
                    }
                }
            }
        })
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<ExplorerRuntime>;
    let _ = assert_sync::<ExplorerRuntime>;
};
