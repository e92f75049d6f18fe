// Per-device (GPU) metrics record

use serde::{Deserialize, Serialize};

/// Where a record's values came from on its last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Ledger,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub device_id: String,
    /// 0-100 percent.
    pub utilization: f64,
    /// Celsius.
    pub temperature: f64,
    /// Watts.
    pub power_draw: f64,
    /// GB.
    pub memory_used: f64,
    /// GB.
    pub memory_total: f64,
    /// Throughput units (TFLOPS).
    pub compute_capacity: f64,
    pub is_rented: bool,
    pub current_group: Option<String>,
    /// Epoch millis.
    pub last_updated: u64,
    pub source: DataSource,
}

/// Partial overwrite for [`DeviceMetrics`]; only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetricsPatch {
    pub utilization: Option<f64>,
    pub temperature: Option<f64>,
    pub power_draw: Option<f64>,
    pub memory_used: Option<f64>,
}

impl DeviceMetricsPatch {
    pub fn apply(&self, device: &mut DeviceMetrics) {
        if let Some(v) = self.utilization {
            device.utilization = v;
        }
        if let Some(v) = self.temperature {
            device.temperature = v;
        }
        if let Some(v) = self.power_draw {
            device.power_draw = v;
        }
        if let Some(v) = self.memory_used {
            device.memory_used = v;
        }
    }
}
