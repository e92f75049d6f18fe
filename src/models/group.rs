// Group (subnet) metrics: aggregated over member devices

use serde::{Deserialize, Serialize};

use super::DeviceMetrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetrics {
    pub group_id: String,
    pub coordinator: String,
    pub member_count: u32,
    pub total_compute: f64,
    pub total_memory: f64,
    pub avg_utilization: f64,
    pub avg_temperature: f64,
    pub total_power_draw: f64,
    pub active: bool,
    /// Epoch millis.
    pub created_at: u64,
    pub purpose: String,
}

/// Sums and means over one group's member set. Empty set yields all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemberAggregate {
    pub member_count: u32,
    pub total_compute: f64,
    pub total_memory: f64,
    pub avg_utilization: f64,
    pub avg_temperature: f64,
    pub total_power_draw: f64,
}

impl MemberAggregate {
    /// Aggregates the devices whose `current_group` is `group_id`.
    pub fn over<'a, I>(group_id: &str, devices: I) -> Self
    where
        I: IntoIterator<Item = &'a DeviceMetrics>,
    {
        let mut agg = MemberAggregate::default();
        let mut util_sum = 0.0;
        let mut temp_sum = 0.0;
        for d in devices
            .into_iter()
            .filter(|d| d.current_group.as_deref() == Some(group_id))
        {
            agg.member_count += 1;
            agg.total_compute += d.compute_capacity;
            agg.total_memory += d.memory_total;
            agg.total_power_draw += d.power_draw;
            util_sum += d.utilization;
            temp_sum += d.temperature;
        }
        if agg.member_count > 0 {
            agg.avg_utilization = util_sum / agg.member_count as f64;
            agg.avg_temperature = temp_sum / agg.member_count as f64;
        }
        agg
    }
}

impl GroupMetrics {
    pub fn from_aggregate(
        group_id: String,
        coordinator: String,
        active: bool,
        created_at: u64,
        purpose: String,
        agg: MemberAggregate,
    ) -> Self {
        let mut group = Self {
            group_id,
            coordinator,
            member_count: 0,
            total_compute: 0.0,
            total_memory: 0.0,
            avg_utilization: 0.0,
            avg_temperature: 0.0,
            total_power_draw: 0.0,
            active,
            created_at,
            purpose,
        };
        group.apply_aggregate(agg);
        group
    }

    /// Replaces the member-derived fields, keeping identity and status.
    pub fn apply_aggregate(&mut self, agg: MemberAggregate) {
        self.member_count = agg.member_count;
        self.total_compute = agg.total_compute;
        self.total_memory = agg.total_memory;
        self.avg_utilization = agg.avg_utilization;
        self.avg_temperature = agg.avg_temperature;
        self.total_power_draw = agg.total_power_draw;
    }
}
