// Model serialization (JSON camelCase) and aggregation helpers

mod common;

use common::device;
use gpu_telemetry::models::*;

#[test]
fn test_device_metrics_serialization_camel_case() {
    let mut d = device("gpu_001", 85.5, 72.0, 350.0, true);
    d.current_group = Some("subnet_ml_training_001".into());
    let json = serde_json::to_string(&d).unwrap();
    assert!(json.contains("\"deviceId\""));
    assert!(json.contains("\"powerDraw\""));
    assert!(json.contains("\"currentGroup\""));
    assert!(json.contains("\"source\":\"simulated\""));
    let back: DeviceMetrics = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}

#[test]
fn test_patch_applies_only_supplied_fields() {
    let mut d = device("gpu_001", 50.0, 60.0, 300.0, false);
    let patch = DeviceMetricsPatch {
        temperature: Some(91.0),
        ..Default::default()
    };
    patch.apply(&mut d);
    assert_eq!(d.temperature, 91.0);
    assert_eq!(d.utilization, 50.0);
    assert_eq!(d.power_draw, 300.0);
}

#[test]
fn test_member_aggregate_over_assigned_devices() {
    let mut a = device("a", 40.0, 60.0, 300.0, true);
    a.current_group = Some("g".into());
    let mut b = device("b", 80.0, 70.0, 400.0, true);
    b.current_group = Some("g".into());
    let c = device("c", 10.0, 30.0, 50.0, false);

    let agg = MemberAggregate::over("g", [&a, &b, &c]);
    assert_eq!(agg.member_count, 2);
    assert!((agg.avg_utilization - 60.0).abs() < 1e-9);
    assert!((agg.avg_temperature - 65.0).abs() < 1e-9);
    assert_eq!(agg.total_power_draw, 700.0);
    assert_eq!(agg.total_compute, 160.0);
    assert_eq!(agg.total_memory, 48.0);
}

#[test]
fn test_member_aggregate_empty_is_all_zero() {
    let c = device("c", 10.0, 30.0, 50.0, false);
    let agg = MemberAggregate::over("nobody", [&c]);
    assert_eq!(agg, MemberAggregate::default());
    assert_eq!(agg.avg_utilization, 0.0);
    assert_eq!(agg.avg_temperature, 0.0);
}

#[test]
fn test_system_metrics_from_local_and_overlay() {
    let devices = [
        device("a", 30.0, 60.0, 300.0, true),
        device("b", 60.0, 60.0, 300.0, false),
        device("c", 90.0, 60.0, 300.0, true),
    ];
    let mut system = SystemMetrics::from_local(devices.iter(), std::iter::empty(), true, 7);
    assert_eq!(system.total_devices, 3);
    assert_eq!(system.rented_devices, 2);
    assert_eq!(system.available_devices, 1);
    assert_eq!(system.active_groups, 0);
    assert!((system.avg_utilization - 60.0).abs() < 1e-9);
    assert_eq!(system.last_updated, 7);

    system.overlay(&LedgerStats::from_counters(5, 2, 1, 400.0, 10, "fixture"));
    assert_eq!(system.total_devices, 5);
    assert_eq!(system.rented_devices, 2);
    assert_eq!(system.available_devices, 3);
    assert_eq!(system.active_groups, 1);
    assert_eq!(system.total_compute, 400.0);
}

#[test]
fn test_degraded_stats_do_not_override_local_totals() {
    let devices = [device("a", 30.0, 60.0, 300.0, true)];
    let mut system = SystemMetrics::from_local(devices.iter(), std::iter::empty(), true, 0);
    system.overlay(&LedgerStats::degraded(true, 99, "testnet"));
    assert_eq!(system.total_devices, 1);
    assert_eq!(system.rented_devices, 1);
    assert_eq!(system.available_devices, 0);
}

#[test]
fn test_envelope_shape() {
    let d = device("gpu_002", 45.2, 65.0, 280.0, true);
    let json = Envelope::new(
        EnvelopeKind::DeviceMetrics,
        Some("gpu_002".into()),
        d,
        DataSource::Ledger,
        1234,
    )
    .to_json()
    .unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["type"], "device_metrics");
    assert_eq!(v["id"], "gpu_002");
    assert_eq!(v["source"], "ledger");
    assert_eq!(v["timestamp"], 1234);
    assert_eq!(v["data"]["deviceId"], "gpu_002");
}

#[test]
fn test_system_envelope_omits_id() {
    let system = SystemMetrics::from_local(std::iter::empty(), std::iter::empty(), false, 0);
    let json = Envelope::new(EnvelopeKind::SystemMetrics, None, system, DataSource::Simulated, 1)
        .to_json()
        .unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["type"], "system_metrics");
    assert!(v.get("id").is_none());
    assert_eq!(v["data"]["ledgerConnected"], false);
}
