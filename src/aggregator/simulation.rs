// Synthetic data used when the ledger cannot supply it: the fallback device
// catalog, per-minute performance samples and placeholder group fields.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ledger::RawDevice;
use crate::models::{DataSource, DeviceMetrics};

/// Coordinator reported for groups derived from device assignments.
pub const PLACEHOLDER_COORDINATOR: &str = "0x1234...5678";

/// Derived groups claim to have been created this long ago.
pub const DERIVED_GROUP_AGE_MS: u64 = 2 * 60 * 60 * 1000;

/// Performance fields the ledger does not carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub utilization: f64,
    pub temperature: f64,
    pub power_draw: f64,
    pub memory_used: f64,
}

struct CatalogEntry {
    id: &'static str,
    utilization: f64,
    temperature: f64,
    power_draw: f64,
    memory_used: f64,
    memory_total: f64,
    compute_capacity: f64,
    is_rented: bool,
    group: Option<&'static str>,
}

const CATALOG: [CatalogEntry; 3] = [
    CatalogEntry {
        id: "gpu_001",
        utilization: 85.5,
        temperature: 72.0,
        power_draw: 350.0,
        memory_used: 20.5,
        memory_total: 24.0,
        compute_capacity: 83.0,
        is_rented: true,
        group: Some("subnet_ml_training_001"),
    },
    CatalogEntry {
        id: "gpu_002",
        utilization: 45.2,
        temperature: 65.0,
        power_draw: 280.0,
        memory_used: 12.8,
        memory_total: 24.0,
        compute_capacity: 83.0,
        is_rented: true,
        group: Some("subnet_inference_001"),
    },
    CatalogEntry {
        id: "gpu_003",
        utilization: 0.0,
        temperature: 35.0,
        power_draw: 50.0,
        memory_used: 0.0,
        memory_total: 16.0,
        compute_capacity: 65.0,
        is_rented: false,
        group: None,
    },
];

/// Number of devices in the fallback catalog.
pub const CATALOG_SIZE: usize = CATALOG.len();

/// The fixed fallback catalog, stamped with `now_ms`.
pub fn simulated_catalog(now_ms: u64) -> Vec<DeviceMetrics> {
    CATALOG
        .iter()
        .map(|e| DeviceMetrics {
            device_id: e.id.to_string(),
            utilization: e.utilization,
            temperature: e.temperature,
            power_draw: e.power_draw,
            memory_used: e.memory_used,
            memory_total: e.memory_total,
            compute_capacity: e.compute_capacity,
            is_rented: e.is_rented,
            current_group: e.group.map(str::to_string),
            last_updated: now_ms,
            source: DataSource::Simulated,
        })
        .collect()
}

fn device_seed(device_id: &str) -> u64 {
    let digest = md5::compute(device_id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as u64
}

/// Deterministic sample for one device within one wall-clock minute.
pub fn performance_sample(device_id: &str, now_ms: u64) -> PerformanceSample {
    let minute = now_ms / 1000 / 60;
    let mut rng = StdRng::seed_from_u64(device_seed(device_id).wrapping_add(minute));
    let utilization = rng.gen_range(30.0..95.0);
    let temperature = rng.gen_range(55.0..85.0);
    let memory_used = rng.gen_range(8.0..22.0);
    PerformanceSample {
        utilization,
        temperature,
        power_draw: 250.0 + utilization * 2.5,
        memory_used,
    }
}

/// Ledger structure plus a synthesized performance sample.
pub fn blend(raw: &RawDevice, now_ms: u64) -> DeviceMetrics {
    let sample = performance_sample(&raw.device_id, now_ms);
    let memory_used = if raw.memory_size > 0.0 {
        sample.memory_used.min(raw.memory_size)
    } else {
        sample.memory_used
    };
    DeviceMetrics {
        device_id: raw.device_id.clone(),
        utilization: sample.utilization,
        temperature: sample.temperature,
        power_draw: sample.power_draw,
        memory_used,
        memory_total: raw.memory_size,
        compute_capacity: raw.compute_capacity,
        is_rented: raw.is_rented,
        current_group: raw.current_group.clone(),
        last_updated: now_ms,
        source: DataSource::Ledger,
    }
}

/// Purpose label guessed from a group id.
pub fn derived_purpose(group_id: &str) -> &'static str {
    if group_id.contains("training") {
        "ML Training"
    } else {
        "Inference"
    }
}
