//! In-memory device, group and system metrics kept fresh by independent
//! collection loops.
//!
//! The three maps are guarded separately. Every reader gets a clone, and every
//! tier pass builds its writes outside the lock and commits them in a single
//! write-lock section, so readers never see a half-applied pass. The group tier
//! aggregates over a cloned device snapshot for the same reason.

mod collect;
mod events;
pub mod simulation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::health::{self, DeviceHealth, GroupHealth, SystemHealth};
use crate::ledger::LedgerSource;
use crate::models::{DataSource, DeviceMetrics, DeviceMetricsPatch, GroupMetrics, SystemMetrics, now_millis};
use crate::worker;

/// Loop timing for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Device, group and system tiers all use this interval.
    pub update_interval: Duration,
    pub event_poll_interval: Duration,
    /// Extra wait after a pass that panicked.
    pub error_backoff: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(30),
            event_poll_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// The collection cycles run by [`MetricsAggregator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Device,
    Group,
    System,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Device, Tier::Group, Tier::System];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Device => "device",
            Tier::Group => "group",
            Tier::System => "system",
        }
    }
}

struct Running {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct MetricsAggregator {
    ledger: Arc<dyn LedgerSource>,
    config: AggregatorConfig,
    devices: RwLock<HashMap<String, DeviceMetrics>>,
    groups: RwLock<HashMap<String, GroupMetrics>>,
    system: RwLock<Option<SystemMetrics>>,
    source: RwLock<DataSource>,
    running: Mutex<Option<Running>>,
}

impl MetricsAggregator {
    pub fn new(ledger: Arc<dyn LedgerSource>, config: AggregatorConfig) -> Self {
        Self {
            ledger,
            config,
            devices: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            system: RwLock::new(None),
            source: RwLock::new(DataSource::Simulated),
            running: Mutex::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerSource> {
        &self.ledger
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the three tier loops and the event loop. Returns `false` and does
    /// nothing if they are already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("aggregator already running");
            return false;
        }
        let token = CancellationToken::new();
        let mut handles: Vec<JoinHandle<()>> = Tier::ALL
            .into_iter()
            .map(|tier| worker::spawn_tier_loop(Arc::clone(self), tier, token.clone()))
            .collect();
        handles.push(worker::spawn_event_loop(Arc::clone(self), token.clone()));
        *running = Some(Running { token, handles });
        info!(
            update_interval_secs = self.config.update_interval.as_secs(),
            event_poll_interval_secs = self.config.event_poll_interval.as_secs(),
            network = self.ledger.network_name(),
            "metrics aggregator started"
        );
        true
    }

    /// Token cancelled by [`stop`](Self::stop); `None` when not running.
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.running.lock().as_ref().map(|r| r.token.clone())
    }

    /// Signals every loop and waits for them. In-flight passes finish first.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running { token, handles }) = running else {
            return;
        };
        token.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, operation = "stop", "aggregator loop ended abnormally");
            }
        }
        info!("metrics aggregator stopped");
    }

    // Read accessors. All return copies.

    pub fn device_metrics(&self, device_id: &str) -> Option<DeviceMetrics> {
        self.devices.read().get(device_id).cloned()
    }

    pub fn all_device_metrics(&self) -> HashMap<String, DeviceMetrics> {
        self.devices.read().clone()
    }

    pub fn group_metrics(&self, group_id: &str) -> Option<GroupMetrics> {
        self.groups.read().get(group_id).cloned()
    }

    pub fn all_group_metrics(&self) -> HashMap<String, GroupMetrics> {
        self.groups.read().clone()
    }

    pub fn system_metrics(&self) -> Option<SystemMetrics> {
        self.system.read().clone()
    }

    /// Source of the last device tier pass.
    pub fn current_source(&self) -> DataSource {
        *self.source.read()
    }

    pub fn device_health(&self, device_id: &str) -> DeviceHealth {
        health::device_health(device_id, self.device_metrics(device_id).as_ref())
    }

    pub fn group_health(&self, group_id: &str) -> GroupHealth {
        health::group_health(group_id, self.group_metrics(group_id).as_ref())
    }

    pub fn system_health(&self) -> SystemHealth {
        let devices = self.all_device_metrics();
        let system = self.system_metrics();
        health::system_health(devices.values(), system.as_ref(), now_millis())
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Overwrites the supplied fields of one known device and bumps its
    /// timestamp. Unknown ids are ignored; returns whether a record changed.
    pub fn simulate_update(&self, device_id: &str, patch: &DeviceMetricsPatch) -> bool {
        let mut devices = self.devices.write();
        let Some(device) = devices.get_mut(device_id) else {
            debug!(device_id, "simulate_update for unknown device");
            return false;
        };
        patch.apply(device);
        device.last_updated = now_millis();
        true
    }

    /// Runs one pass of the given tier.
    pub async fn run_tier(&self, tier: Tier) {
        match tier {
            Tier::Device => {
                self.update_device_metrics().await;
            }
            Tier::Group => self.update_group_metrics().await,
            Tier::System => self.update_system_metrics().await,
        }
    }

    /// One pass of every tier in dependency order.
    pub async fn refresh_all(&self) {
        for tier in Tier::ALL {
            self.run_tier(tier).await;
        }
    }
}
