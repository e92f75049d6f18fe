// Health classification over metrics snapshots. Pure functions; no state.

use serde::{Deserialize, Serialize};

use crate::models::{DeviceMetrics, GroupMetrics, SystemMetrics};

pub const DEVICE_CRITICAL_TEMP: f64 = 90.0;
pub const DEVICE_WARNING_TEMP: f64 = 85.0;
pub const DEVICE_HIGH_POWER: f64 = 400.0;
pub const GROUP_WARNING_TEMP: f64 = 80.0;
pub const GROUP_LOW_UTILIZATION: f64 = 10.0;
pub const GROUP_HIGH_UTILIZATION: f64 = 95.0;
/// Share of warning devices above which the whole pool is `warning`.
pub const SYSTEM_WARNING_SHARE: f64 = 0.3;

pub const WARN_CRITICAL_TEMP: &str = "Critical temperature";
pub const WARN_HIGH_TEMP: &str = "High temperature";
pub const WARN_IDLE_RENTED: &str = "No utilization despite being rented";
pub const WARN_HIGH_POWER: &str = "High power consumption";
pub const WARN_GROUP_HIGH_TEMP: &str = "High average temperature";
pub const WARN_GROUP_LOW_UTIL: &str = "Low utilization";
pub const WARN_GROUP_HIGH_UTIL: &str = "Very high utilization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealth {
    pub device_id: String,
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DeviceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupHealth {
    pub group_id: String,
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<GroupMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: u64,
    pub warning: u64,
    pub critical: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall_health: HealthStatus,
    pub ledger_connected: bool,
    pub device_health: HealthCounts,
    pub system_utilization: f64,
    pub active_groups: u64,
    pub last_updated: u64,
}

/// Status and warnings for one device. Temperature above 90 is critical; the
/// remaining rules only raise `warning`. Warnings accumulate independently.
pub fn classify_device(device: &DeviceMetrics) -> (HealthStatus, Vec<String>) {
    let mut status = HealthStatus::Healthy;
    let mut warnings = Vec::new();

    if device.temperature > DEVICE_CRITICAL_TEMP {
        status = HealthStatus::Critical;
        warnings.push(WARN_CRITICAL_TEMP.to_string());
    } else if device.temperature > DEVICE_WARNING_TEMP {
        status = HealthStatus::Warning;
        warnings.push(WARN_HIGH_TEMP.to_string());
    }

    if device.utilization == 0.0 && device.is_rented {
        status = status.max(HealthStatus::Warning);
        warnings.push(WARN_IDLE_RENTED.to_string());
    }

    if device.power_draw > DEVICE_HIGH_POWER {
        status = status.max(HealthStatus::Warning);
        warnings.push(WARN_HIGH_POWER.to_string());
    }

    (status, warnings)
}

pub fn device_health(device_id: &str, device: Option<&DeviceMetrics>) -> DeviceHealth {
    match device {
        Some(d) => {
            let (status, warnings) = classify_device(d);
            DeviceHealth {
                device_id: device_id.to_string(),
                status,
                warnings,
                metrics: Some(d.clone()),
            }
        }
        None => DeviceHealth {
            device_id: device_id.to_string(),
            status: HealthStatus::Unknown,
            warnings: vec![],
            metrics: None,
        },
    }
}

/// Only a high average temperature changes a group's status; utilization
/// bounds add informational warnings.
pub fn classify_group(group: &GroupMetrics) -> (HealthStatus, Vec<String>) {
    let mut status = HealthStatus::Healthy;
    let mut warnings = Vec::new();

    if group.avg_temperature > GROUP_WARNING_TEMP {
        status = HealthStatus::Warning;
        warnings.push(WARN_GROUP_HIGH_TEMP.to_string());
    }

    if group.avg_utilization < GROUP_LOW_UTILIZATION {
        warnings.push(WARN_GROUP_LOW_UTIL.to_string());
    } else if group.avg_utilization > GROUP_HIGH_UTILIZATION {
        warnings.push(WARN_GROUP_HIGH_UTIL.to_string());
    }

    (status, warnings)
}

pub fn group_health(group_id: &str, group: Option<&GroupMetrics>) -> GroupHealth {
    match group {
        Some(g) => {
            let (status, warnings) = classify_group(g);
            GroupHealth {
                group_id: group_id.to_string(),
                status,
                warnings,
                metrics: Some(g.clone()),
            }
        }
        None => GroupHealth {
            group_id: group_id.to_string(),
            status: HealthStatus::Unknown,
            warnings: vec![],
            metrics: None,
        },
    }
}

pub fn count_device_health<'a, I>(devices: I) -> HealthCounts
where
    I: IntoIterator<Item = &'a DeviceMetrics>,
{
    let mut counts = HealthCounts::default();
    for d in devices {
        counts.total += 1;
        match classify_device(d).0 {
            HealthStatus::Critical => counts.critical += 1,
            HealthStatus::Warning => counts.warning += 1,
            _ => counts.healthy += 1,
        }
    }
    counts
}

/// Critical if any device is critical; warning if more than 30% of devices warn.
pub fn overall_health(counts: &HealthCounts) -> HealthStatus {
    if counts.critical > 0 {
        HealthStatus::Critical
    } else if counts.warning as f64 > counts.total as f64 * SYSTEM_WARNING_SHARE {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

pub fn system_health<'a, I>(
    devices: I,
    system: Option<&SystemMetrics>,
    now_ms: u64,
) -> SystemHealth
where
    I: IntoIterator<Item = &'a DeviceMetrics>,
{
    let counts = count_device_health(devices);
    SystemHealth {
        overall_health: overall_health(&counts),
        ledger_connected: system.is_some_and(|s| s.ledger_connected),
        device_health: counts,
        system_utilization: system.map_or(0.0, |s| s.avg_utilization),
        active_groups: system.map_or(0, |s| s.active_groups),
        last_updated: now_ms,
    }
}
