use anyhow::Result;
use explorer_core::{config::AppConfig, runtime::ExplorerRuntime};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system based on the configuration.
fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") => EnvFilter::new("warn,explorer_core=debug,server=debug"),
        Ok("trace") => EnvFilter::new("warn,explorer_core=trace,server=trace"),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn,explorer_core=debug,server=debug")),
        Err(_) => EnvFilter::new(format!(
            "warn,explorer_core={level},server={level}",
            level = config.logging.level
        )),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    init_logging(&config);
    info!(environment = %config.environment, "Starting explorer backend");
    debug!(
        networks = config.networks.len(),
        metrics_enabled = config.metrics.enabled,
        "Configuration loaded"
    );

    let runtime = ExplorerRuntime::builder()
        .with_config(config)
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?;

    for network in runtime.registry().iter() {
        match network.feed().protocol_info() {
            Some(info) => info!(
                network = %network.name(),
                node = %info.node_name,
                version = %info.node_version,
                hrp = %info.bech32_hrp,
                "Network ready"
            ),
            None => info!(network = %network.name(), "Network ready without protocol info"),
        }
    }

    shutdown_signal().await;
    runtime.shutdown().await;

    if runtime.config().metrics.enabled {
        debug!(metrics = %runtime.metrics_collector().get_prometheus_metrics(), "Final metrics");
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, stopping networks");
}
