// Long-lived background loops: one per collection tier, the ledger event
// poller and the periodic app stats logger.
// Each pass runs in its own task so a panic inside it is reported and backed
// off instead of killing the loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::aggregator::{MetricsAggregator, Tier};
use crate::broadcaster::SubscriptionBroadcaster;

/// Waits out the error backoff unless shutdown arrives first. Returns `false`
/// on shutdown.
async fn back_off(token: &CancellationToken, backoff: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(backoff) => true,
    }
}

pub fn spawn_tier_loop(
    aggregator: Arc<MetricsAggregator>,
    tier: Tier,
    token: CancellationToken,
) -> JoinHandle<()> {
    let every = aggregator.config().update_interval;
    let backoff = aggregator.config().error_backoff;
    let span = tracing::span!(tracing::Level::DEBUG, "tier_loop", tier = tier.as_str());

    tokio::spawn(
        async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("tier loop shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        let agg = Arc::clone(&aggregator);
                        let pass = tokio::spawn(async move { agg.run_tier(tier).await });
                        if let Err(e) = pass.await {
                            tracing::warn!(
                                error = %e,
                                operation = "run_tier",
                                tier = tier.as_str(),
                                "tier pass failed"
                            );
                            if !back_off(&token, backoff).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}

pub fn spawn_event_loop(aggregator: Arc<MetricsAggregator>, token: CancellationToken) -> JoinHandle<()> {
    let every = aggregator.config().event_poll_interval;
    let backoff = aggregator.config().error_backoff;
    let span = tracing::span!(tracing::Level::DEBUG, "event_loop");

    tokio::spawn(
        async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("event loop shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        let agg = Arc::clone(&aggregator);
                        let pass = tokio::spawn(async move { agg.poll_events().await });
                        if let Err(e) = pass.await {
                            tracing::warn!(
                                error = %e,
                                operation = "poll_events",
                                "event processing failed"
                            );
                            if !back_off(&token, backoff).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}

/// Logs device/group counts and live connection counts at INFO.
pub fn spawn_stats_logger(
    aggregator: Arc<MetricsAggregator>,
    broadcaster: Arc<SubscriptionBroadcaster>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; nothing worth reporting yet.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    let stats = broadcaster.connection_stats();
                    tracing::info!(
                        devices = aggregator.device_count(),
                        groups = aggregator.group_count(),
                        source = ?aggregator.current_source(),
                        ws_connections = stats.total_connections,
                        system_subscribers = stats.system_subscribers,
                        "app stats"
                    );
                }
            }
        }
    })
}
