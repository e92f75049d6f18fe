// Tier passes: device, group and system collection.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, instrument, warn};

use super::MetricsAggregator;
use super::simulation::{self, DERIVED_GROUP_AGE_MS, PLACEHOLDER_COORDINATOR};
use crate::ledger::RawGroup;
use crate::models::{
    DataSource, DeviceMetrics, GroupMetrics, MemberAggregate, SystemMetrics, now_millis,
};

impl MetricsAggregator {
    /// Refreshes the device map from the ledger, or from the simulated catalog
    /// when the ledger is down or has nothing. Devices missing from the
    /// response keep their previous record; on a simulated pass they are
    /// re-marked simulated.
    #[instrument(skip(self), fields(tier = "device"))]
    pub async fn update_device_metrics(&self) -> DataSource {
        let now = now_millis();
        let from_ledger = if self.ledger.is_connected().await {
            let raw = self.ledger.get_all_device_data().await;
            if raw.is_empty() {
                warn!("no device data from ledger; using simulated catalog");
                None
            } else {
                Some(
                    raw.values()
                        .map(|r| simulation::blend(r, now))
                        .collect::<Vec<_>>(),
                )
            }
        } else {
            warn!("ledger not connected; using simulated device data");
            None
        };

        let (records, source) = match from_ledger {
            Some(records) => (records, DataSource::Ledger),
            None => (simulation::simulated_catalog(now), DataSource::Simulated),
        };
        let count = records.len();
        self.commit_devices(records, source);
        *self.source.write() = source;

        match source {
            DataSource::Ledger => info!(devices = count, "updated device metrics from ledger"),
            DataSource::Simulated => debug!(devices = count, "updated simulated device metrics"),
        }
        source
    }

    /// Refreshes one device from a full ledger read, writing back only that
    /// record. Returns `false` if the ledger does not know the id.
    #[instrument(skip(self), fields(tier = "device"))]
    pub async fn update_single_device(&self, device_id: &str) -> bool {
        let raw = self.ledger.get_all_device_data().await;
        let Some(device) = raw.get(device_id) else {
            debug!("device not reported by ledger; skipping refresh");
            return false;
        };
        let record = simulation::blend(device, now_millis());
        self.devices.write().insert(device_id.to_string(), record);
        debug!("refreshed single device");
        true
    }

    /// Rebuilds group records. Ledger groups keep their coordinator, status and
    /// purpose; every aggregate comes from one snapshot of the device map.
    /// Retained groups not rebuilt this pass are recomputed from the same
    /// snapshot.
    #[instrument(skip(self), fields(tier = "group"))]
    pub async fn update_group_metrics(&self) {
        let ledger_groups = if self.ledger.is_connected().await {
            self.ledger.get_all_group_data().await
        } else {
            HashMap::new()
        };

        let snapshot = self.all_device_metrics();
        let now = now_millis();
        let records = if ledger_groups.is_empty() {
            debug!("no ledger group data; deriving groups from device assignments");
            derive_groups(&snapshot, now)
        } else {
            ledger_groups
                .into_values()
                .map(|g| from_ledger_group(g, &snapshot))
                .collect()
        };

        let count = records.len();
        let retained = {
            let mut groups = self.groups.write();
            let rebuilt: BTreeSet<String> = records.iter().map(|g| g.group_id.clone()).collect();
            for g in records {
                groups.insert(g.group_id.clone(), g);
            }
            let mut retained = 0;
            for (id, g) in groups.iter_mut().filter(|(id, _)| !rebuilt.contains(*id)) {
                g.apply_aggregate(MemberAggregate::over(id, snapshot.values()));
                retained += 1;
            }
            retained
        };
        debug!(groups = count, retained, "updated group metrics");
    }

    /// Recomputes pool totals locally, then lets ledger counters win when the
    /// ledger answered this pass.
    #[instrument(skip(self), fields(tier = "system"))]
    pub async fn update_system_metrics(&self) {
        let connected = self.ledger.is_connected().await;
        let stats = if connected {
            Some(self.ledger.get_system_stats().await)
        } else {
            None
        };

        let devices = self.all_device_metrics();
        let groups = self.all_group_metrics();
        let mut metrics =
            SystemMetrics::from_local(devices.values(), groups.values(), connected, now_millis());
        if let Some(stats) = &stats {
            metrics.overlay(stats);
        }
        debug!(
            total_devices = metrics.total_devices,
            rented_devices = metrics.rented_devices,
            ledger_connected = connected,
            "updated system metrics"
        );
        *self.system.write() = Some(metrics);
    }

    fn commit_devices(&self, records: Vec<DeviceMetrics>, source: DataSource) {
        let mut devices = self.devices.write();
        for d in records {
            devices.insert(d.device_id.clone(), d);
        }
        if source == DataSource::Simulated {
            for d in devices.values_mut() {
                d.source = DataSource::Simulated;
            }
        }
    }
}

fn from_ledger_group(group: RawGroup, devices: &HashMap<String, DeviceMetrics>) -> GroupMetrics {
    let agg = MemberAggregate::over(&group.group_id, devices.values());
    if agg.member_count as usize != group.member_count() {
        debug!(
            group_id = %group.group_id,
            ledger_members = group.member_count(),
            local_members = agg.member_count,
            "member count differs from ledger"
        );
    }
    GroupMetrics::from_aggregate(
        group.group_id,
        group.coordinator,
        group.active,
        group.created_at.saturating_mul(1000),
        group.purpose,
        agg,
    )
}

/// One group per distinct `current_group` in the device map.
fn derive_groups(devices: &HashMap<String, DeviceMetrics>, now_ms: u64) -> Vec<GroupMetrics> {
    let ids: BTreeSet<&str> = devices
        .values()
        .filter_map(|d| d.current_group.as_deref())
        .collect();
    ids.into_iter()
        .map(|id| {
            GroupMetrics::from_aggregate(
                id.to_string(),
                PLACEHOLDER_COORDINATOR.to_string(),
                true,
                now_ms.saturating_sub(DERIVED_GROUP_AGE_MS),
                simulation::derived_purpose(id).to_string(),
                MemberAggregate::over(id, devices.values()),
            )
        })
        .collect()
}
