// Pool-wide metrics and the ledger-reported counters that may override them

use serde::{Deserialize, Serialize};

use super::{DeviceMetrics, GroupMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub total_devices: u64,
    pub rented_devices: u64,
    pub available_devices: u64,
    pub active_groups: u64,
    pub total_compute: f64,
    pub total_memory: f64,
    pub avg_utilization: f64,
    pub ledger_connected: bool,
    /// Epoch millis.
    pub last_updated: u64,
}

/// Aggregate counters as reported by the ledger. Fields are absent when the
/// ledger could not answer (degraded record).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_devices: Option<u64>,
    pub rented_devices: Option<u64>,
    pub available_devices: Option<u64>,
    pub active_groups: Option<u64>,
    pub total_compute: Option<f64>,
    pub ledger_connected: bool,
    pub latest_block: u64,
    pub network: String,
}

impl LedgerStats {
    /// Builds a full record from the registry's aggregate counters.
    pub fn from_counters(
        total: u64,
        rented: u64,
        active_groups: u64,
        total_compute: f64,
        latest_block: u64,
        network: &str,
    ) -> Self {
        Self {
            total_devices: Some(total),
            rented_devices: Some(rented),
            available_devices: Some(total.saturating_sub(rented)),
            active_groups: Some(active_groups),
            total_compute: Some(total_compute),
            ledger_connected: true,
            latest_block,
            network: network.to_string(),
        }
    }

    /// Only connectivity, block height and network name.
    pub fn degraded(ledger_connected: bool, latest_block: u64, network: &str) -> Self {
        Self {
            ledger_connected,
            latest_block,
            network: network.to_string(),
            ..Default::default()
        }
    }
}

impl SystemMetrics {
    /// Computes pool totals from local snapshots.
    pub fn from_local<'a, D, G>(devices: D, groups: G, ledger_connected: bool, now_ms: u64) -> Self
    where
        D: IntoIterator<Item = &'a DeviceMetrics>,
        G: IntoIterator<Item = &'a GroupMetrics>,
    {
        let mut total = 0u64;
        let mut rented = 0u64;
        let mut compute = 0.0;
        let mut memory = 0.0;
        let mut util_sum = 0.0;
        for d in devices {
            total += 1;
            if d.is_rented {
                rented += 1;
            }
            compute += d.compute_capacity;
            memory += d.memory_total;
            util_sum += d.utilization;
        }
        let avg_utilization = if total > 0 {
            util_sum / total as f64
        } else {
            0.0
        };
        Self {
            total_devices: total,
            rented_devices: rented,
            available_devices: total - rented,
            active_groups: groups.into_iter().count() as u64,
            total_compute: compute,
            total_memory: memory,
            avg_utilization,
            ledger_connected,
            last_updated: now_ms,
        }
    }

    /// Ledger-reported totals win over local ones where present.
    pub fn overlay(&mut self, stats: &LedgerStats) {
        if let Some(v) = stats.total_devices {
            self.total_devices = v;
        }
        if let Some(v) = stats.rented_devices {
            self.rented_devices = v;
        }
        if let Some(v) = stats.available_devices {
            self.available_devices = v;
        } else if stats.total_devices.is_some() || stats.rented_devices.is_some() {
            self.available_devices = self.total_devices.saturating_sub(self.rented_devices);
        }
        if let Some(v) = stats.active_groups {
            self.active_groups = v;
        }
        if let Some(v) = stats.total_compute {
            self.total_compute = v;
        }
    }
}
