// Shared test helpers
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use gpu_telemetry::aggregator::{AggregatorConfig, MetricsAggregator};
use gpu_telemetry::config::AppConfig;
use gpu_telemetry::ledger::{EventKind, FixtureLedger, LedgerEvent, RawDevice, RawGroup};
use gpu_telemetry::models::{DataSource, DeviceMetrics};

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"

[ledger]
backend = "fixture"
network = "local"

[monitoring]
update_interval_secs = 30
event_poll_interval_secs = 10
error_backoff_secs = 5
stats_log_interval_secs = 60

[publishing]
system_push_interval_secs = 10
device_push_interval_secs = 5
group_push_interval_secs = 10
subscriber_buffer = 8
"#;

pub fn test_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn aggregator_over(ledger: Arc<FixtureLedger>) -> Arc<MetricsAggregator> {
    Arc::new(MetricsAggregator::new(ledger, AggregatorConfig::default()))
}

/// `total` devices `gpu_l00..`, the first `rented` of them rented.
pub fn seed_devices(ledger: &FixtureLedger, total: usize, rented: usize) {
    for i in 0..total {
        let mut device = RawDevice::new(format!("gpu_l{i:02}"), 80.0, 24.0);
        if i < rented {
            device = device.rented_by("0x00000000000000000000000000000000000000aa", u64::MAX);
        }
        ledger.insert_device(device);
    }
}

pub fn raw_group(id: &str, members: &[&str]) -> RawGroup {
    RawGroup {
        group_id: id.to_string(),
        coordinator: "0x00000000000000000000000000000000000000c0".to_string(),
        member_ids: members.iter().map(|m| m.to_string()).collect(),
        total_compute: 0.0,
        total_memory: 0.0,
        created_at: 1_700_000_000,
        active: true,
        purpose: "ML Training".to_string(),
    }
}

pub fn device(id: &str, utilization: f64, temperature: f64, power_draw: f64, rented: bool) -> DeviceMetrics {
    DeviceMetrics {
        device_id: id.to_string(),
        utilization,
        temperature,
        power_draw,
        memory_used: 8.0,
        memory_total: 24.0,
        compute_capacity: 80.0,
        is_rented: rented,
        current_group: None,
        last_updated: 0,
        source: DataSource::Simulated,
    }
}

pub fn event(kind: EventKind, block: u64, args: &[(&str, &str)]) -> LedgerEvent {
    LedgerEvent {
        kind,
        block_number: block,
        transaction_hash: format!("0x{block:064x}"),
        args: args
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect::<BTreeMap<_, _>>(),
        observed_at: 0,
    }
}
