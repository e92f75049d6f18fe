// Scripted in-memory ledger for tests and offline runs.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{EventKind, LedgerEvent, LedgerSource, RawDevice, RawGroup};
use crate::models::LedgerStats;

#[derive(Default)]
struct FixtureState {
    connected: bool,
    failing: bool,
    devices: HashMap<String, RawDevice>,
    groups: HashMap<String, RawGroup>,
    stats: Option<LedgerStats>,
    events: VecDeque<LedgerEvent>,
    latest_block: u64,
}

/// Starts disconnected and empty. While disconnected every read returns
/// empty or degraded data, the same as an unreachable node.
#[derive(Default)]
pub struct FixtureLedger {
    state: Mutex<FixtureState>,
}

impl FixtureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected() -> Self {
        let ledger = Self::default();
        ledger.set_connected(true);
        ledger
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// While failing the node answers liveness probes but every read comes
    /// back empty or degraded, like a registry call that keeps reverting.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().latest_block = block;
    }

    pub fn insert_device(&self, device: RawDevice) {
        self.state
            .lock()
            .devices
            .insert(device.device_id.clone(), device);
    }

    pub fn remove_device(&self, device_id: &str) -> Option<RawDevice> {
        self.state.lock().devices.remove(device_id)
    }

    /// Inactive groups are stored but never returned.
    pub fn insert_group(&self, group: RawGroup) {
        self.state.lock().groups.insert(group.group_id.clone(), group);
    }

    /// Overrides the counters otherwise derived from the stored devices.
    pub fn set_stats(&self, stats: Option<LedgerStats>) {
        self.state.lock().stats = stats;
    }

    /// Queues an event; its block number becomes the latest block if higher.
    pub fn push_event(&self, event: LedgerEvent) {
        let mut state = self.state.lock();
        state.latest_block = state.latest_block.max(event.block_number);
        state.events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }
}

#[async_trait]
impl LedgerSource for FixtureLedger {
    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn get_all_device_data(&self) -> HashMap<String, RawDevice> {
        let state = self.state.lock();
        if !state.connected || state.failing {
            return HashMap::new();
        }
        state.devices.clone()
    }

    async fn get_all_group_data(&self) -> HashMap<String, RawGroup> {
        let state = self.state.lock();
        if !state.connected || state.failing {
            return HashMap::new();
        }
        state
            .groups
            .iter()
            .filter(|(_, g)| g.active)
            .map(|(id, g)| (id.clone(), g.clone()))
            .collect()
    }

    async fn get_system_stats(&self) -> LedgerStats {
        let state = self.state.lock();
        let network = self.network_name();
        if !state.connected || state.failing {
            return LedgerStats::degraded(state.connected, state.latest_block, network);
        }
        if let Some(stats) = &state.stats {
            return stats.clone();
        }
        let total = state.devices.len() as u64;
        let rented = state.devices.values().filter(|d| d.is_rented).count() as u64;
        let active_groups = state.groups.values().filter(|g| g.active).count() as u64;
        let compute = state.devices.values().map(|d| d.compute_capacity).sum();
        LedgerStats::from_counters(
            total,
            rented,
            active_groups,
            compute,
            state.latest_block,
            network,
        )
    }

    async fn get_recent_events(&self, kinds: Option<&[EventKind]>) -> Vec<LedgerEvent> {
        let mut state = self.state.lock();
        if !state.connected || state.failing {
            return vec![];
        }
        let (mut taken, kept): (Vec<_>, Vec<_>) = state
            .events
            .drain(..)
            .partition(|e| kinds.is_none_or(|ks| ks.contains(&e.kind)));
        state.events = kept.into();
        taken.sort_by_key(|e| e.block_number);
        taken
    }

    fn network_name(&self) -> &str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(kind: EventKind, block: u64) -> LedgerEvent {
        LedgerEvent {
            kind,
            block_number: block,
            transaction_hash: String::new(),
            args: BTreeMap::new(),
            observed_at: 0,
        }
    }

    #[tokio::test]
    async fn disconnected_fixture_returns_nothing() {
        let ledger = FixtureLedger::new();
        ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0));
        assert!(!ledger.is_connected().await);
        assert!(ledger.get_all_device_data().await.is_empty());
        let stats = ledger.get_system_stats().await;
        assert!(!stats.ledger_connected);
        assert_eq!(stats.total_devices, None);
    }

    #[tokio::test]
    async fn stats_are_derived_from_devices() {
        let ledger = FixtureLedger::connected();
        ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).rented_by("0xabc", 10));
        ledger.insert_device(RawDevice::new("gpu_b", 60.0, 16.0));
        let stats = ledger.get_system_stats().await;
        assert_eq!(stats.total_devices, Some(2));
        assert_eq!(stats.rented_devices, Some(1));
        assert_eq!(stats.available_devices, Some(1));
        assert_eq!(stats.total_compute, Some(140.0));
    }

    #[tokio::test]
    async fn failing_reads_stay_connected_but_degraded() {
        let ledger = FixtureLedger::connected();
        ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0));
        ledger.set_failing(true);
        assert!(ledger.is_connected().await);
        assert!(ledger.get_all_device_data().await.is_empty());
        let stats = ledger.get_system_stats().await;
        assert!(stats.ledger_connected);
        assert_eq!(stats.total_devices, None);
    }

    #[tokio::test]
    async fn events_drain_once_in_block_order_and_respect_kind_filter() {
        let ledger = FixtureLedger::connected();
        ledger.push_event(event(EventKind::DeviceRented, 9));
        ledger.push_event(event(EventKind::GroupCreated, 3));
        ledger.push_event(event(EventKind::DeviceRegistered, 5));

        let rented = ledger
            .get_recent_events(Some(&[EventKind::DeviceRented]))
            .await;
        assert_eq!(rented.len(), 1);
        assert_eq!(ledger.pending_events(), 2);

        let rest = ledger.get_recent_events(None).await;
        let blocks: Vec<u64> = rest.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![3, 5]);
        assert!(ledger.get_recent_events(None).await.is_empty());
    }
}
