use anyhow::Result;
use gpu_telemetry::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use gpu_telemetry::aggregator::MetricsAggregator;
use gpu_telemetry::broadcaster::SubscriptionBroadcaster;
use gpu_telemetry::config::{AppConfig, LedgerBackend};
use gpu_telemetry::ledger::{FixtureLedger, LedgerClient, LedgerSource};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Builds the configured ledger backend. A node that cannot be reached is
/// logged and left disconnected; the aggregator serves simulated data.
async fn build_ledger(config: &AppConfig) -> Arc<dyn LedgerSource> {
    match config.ledger.backend {
        LedgerBackend::Fixture => {
            tracing::info!("using fixture ledger backend");
            Arc::new(FixtureLedger::new())
        }
        LedgerBackend::Rpc => {
            let client = LedgerClient::new(config.ledger_client_config());
            if let Err(e) = client.initialize(config.ledger.network, None).await {
                tracing::error!(
                    error = %e,
                    operation = "initialize",
                    "failed to connect to ledger; continuing with simulated data"
                );
            }
            Arc::new(client)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    let ledger = build_ledger(&app_config).await;
    let aggregator = Arc::new(MetricsAggregator::new(
        ledger,
        app_config.aggregator_config(),
    ));
    let broadcaster = Arc::new(SubscriptionBroadcaster::new());

    aggregator.start();
    let stats_token = tokio_util::sync::CancellationToken::new();
    let stats_handle = worker::spawn_stats_logger(
        aggregator.clone(),
        broadcaster.clone(),
        std::time::Duration::from_secs(app_config.monitoring.stats_log_interval_secs),
        stats_token.clone(),
    );

    let app = routes::app(aggregator.clone(), broadcaster, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
        }
    }

    stats_token.cancel();
    aggregator.stop().await;
    let _ = stats_handle.await;
    Ok(())
}
