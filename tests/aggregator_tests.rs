// Aggregator tiers, fallback, event reaction and lifecycle against the fixture ledger

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{aggregator_over, event, raw_group, seed_devices};
use gpu_telemetry::aggregator::MetricsAggregator;
use gpu_telemetry::aggregator::simulation::CATALOG_SIZE;
use gpu_telemetry::health::HealthStatus;
use gpu_telemetry::ledger::{EventKind, FixtureLedger, RawDevice};
use gpu_telemetry::models::{DataSource, DeviceMetricsPatch};

/// Every stored group's aggregates equal those of its current members.
fn assert_group_aggregates(agg: &MetricsAggregator) {
    let devices = agg.all_device_metrics();
    for (id, g) in &agg.all_group_metrics() {
        let members: Vec<_> = devices
            .values()
            .filter(|d| d.current_group.as_deref() == Some(id.as_str()))
            .collect();
        assert_eq!(g.member_count as usize, members.len(), "group {id}");
        if members.is_empty() {
            assert_eq!(g.avg_utilization, 0.0, "group {id}");
            assert_eq!(g.avg_temperature, 0.0, "group {id}");
            assert_eq!(g.total_power_draw, 0.0, "group {id}");
            assert_eq!(g.total_compute, 0.0, "group {id}");
        } else {
            let n = members.len() as f64;
            let util = members.iter().map(|d| d.utilization).sum::<f64>() / n;
            let temp = members.iter().map(|d| d.temperature).sum::<f64>() / n;
            let power: f64 = members.iter().map(|d| d.power_draw).sum();
            let compute: f64 = members.iter().map(|d| d.compute_capacity).sum();
            assert!((g.avg_utilization - util).abs() < 1e-9, "group {id}");
            assert!((g.avg_temperature - temp).abs() < 1e-9, "group {id}");
            assert!((g.total_power_draw - power).abs() < 1e-9, "group {id}");
            assert!((g.total_compute - compute).abs() < 1e-9, "group {id}");
        }
    }
}

#[tokio::test]
async fn test_unreachable_then_reachable_ledger() {
    let ledger = Arc::new(FixtureLedger::new());
    let agg = aggregator_over(ledger.clone());

    for _ in 0..3 {
        agg.refresh_all().await;
    }
    let system = agg.system_metrics().expect("system metrics after a pass");
    assert_eq!(system.total_devices, CATALOG_SIZE as u64);
    assert_eq!(system.total_devices, 3);
    assert!(!system.ledger_connected);
    assert_eq!(agg.current_source(), DataSource::Simulated);
    assert!(
        agg.all_device_metrics()
            .values()
            .all(|d| d.source == DataSource::Simulated)
    );

    seed_devices(&ledger, 5, 2);
    ledger.set_connected(true);
    agg.refresh_all().await;

    let system = agg.system_metrics().unwrap();
    assert_eq!(system.total_devices, 5);
    assert_eq!(system.rented_devices, 2);
    assert_eq!(system.available_devices, 3);
    assert!(system.ledger_connected);
    assert_eq!(agg.current_source(), DataSource::Ledger);
}

#[tokio::test]
async fn test_connected_but_empty_ledger_falls_back_to_catalog() {
    let ledger = Arc::new(FixtureLedger::connected());
    let agg = aggregator_over(ledger.clone());
    let source = agg.update_device_metrics().await;
    assert_eq!(source, DataSource::Simulated);
    assert_eq!(agg.device_count(), CATALOG_SIZE);

    agg.update_group_metrics().await;
    // Derived from the catalog's assignments.
    assert_eq!(agg.group_count(), 2);
    let training = agg.group_metrics("subnet_ml_training_001").unwrap();
    assert_eq!(training.purpose, "ML Training");

    agg.update_system_metrics().await;
    assert!(agg.system_metrics().unwrap().ledger_connected);
}

#[tokio::test]
async fn test_failing_reads_degrade_to_simulation() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 4, 1);
    ledger.set_failing(true);
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;
    assert_eq!(agg.current_source(), DataSource::Simulated);
    let system = agg.system_metrics().unwrap();
    assert!(system.ledger_connected);
    assert_eq!(system.total_devices, CATALOG_SIZE as u64);
}

#[tokio::test]
async fn test_group_aggregates_match_member_set() {
    let ledger = Arc::new(FixtureLedger::connected());
    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("aa"));
    ledger.insert_device(RawDevice::new("gpu_b", 60.0, 16.0).in_group("aa"));
    ledger.insert_device(RawDevice::new("gpu_c", 40.0, 8.0).in_group("bb"));
    ledger.insert_device(RawDevice::new("gpu_d", 40.0, 8.0));
    ledger.insert_group(raw_group("aa", &["gpu_a", "gpu_b"]));
    ledger.insert_group(raw_group("bb", &["gpu_c"]));
    ledger.insert_group(raw_group("empty", &[]));
    let mut retired = raw_group("retired", &[]);
    retired.active = false;
    ledger.insert_group(retired);

    let agg = aggregator_over(ledger.clone());
    agg.update_device_metrics().await;
    agg.update_group_metrics().await;

    let groups = agg.all_group_metrics();
    assert_eq!(groups.len(), 3);
    assert!(!groups.contains_key("retired"));
    assert_group_aggregates(&agg);

    let aa = &groups["aa"];
    assert_eq!(aa.member_count, 2);
    assert_eq!(aa.total_compute, 140.0);
    assert_eq!(aa.created_at, 1_700_000_000_000);
}

#[tokio::test]
async fn test_derived_group_left_behind_is_recomputed() {
    let ledger = Arc::new(FixtureLedger::connected());
    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("aa"));
    ledger.insert_device(RawDevice::new("gpu_b", 60.0, 16.0).in_group("aa"));
    ledger.insert_device(RawDevice::new("gpu_c", 40.0, 8.0).in_group("bb"));
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;
    assert_eq!(agg.group_metrics("aa").unwrap().member_count, 2);
    assert_group_aggregates(&agg);

    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("bb"));
    agg.refresh_all().await;
    assert_eq!(agg.group_metrics("aa").unwrap().member_count, 1);
    assert_eq!(agg.group_metrics("bb").unwrap().member_count, 2);
    assert_group_aggregates(&agg);

    // Nothing left in aa: it is no longer derived but stays stored.
    ledger.insert_device(RawDevice::new("gpu_b", 60.0, 16.0).in_group("bb"));
    agg.refresh_all().await;
    let aa = agg.group_metrics("aa").unwrap();
    assert_eq!(aa.member_count, 0);
    assert_eq!(aa.total_compute, 0.0);
    assert_eq!(agg.group_metrics("bb").unwrap().member_count, 3);
    assert_group_aggregates(&agg);
}

#[tokio::test]
async fn test_deactivated_ledger_group_is_recomputed() {
    let ledger = Arc::new(FixtureLedger::connected());
    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("aa"));
    ledger.insert_device(RawDevice::new("gpu_b", 60.0, 16.0).in_group("aa"));
    ledger.insert_group(raw_group("aa", &["gpu_a", "gpu_b"]));
    ledger.insert_group(raw_group("cc", &[]));
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;
    assert_eq!(agg.group_metrics("aa").unwrap().member_count, 2);

    let mut retired = raw_group("aa", &["gpu_b"]);
    retired.active = false;
    ledger.insert_group(retired);
    ledger.insert_group(raw_group("cc", &["gpu_a"]));
    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("cc"));
    agg.refresh_all().await;

    let aa = agg.group_metrics("aa").unwrap();
    assert_eq!(aa.member_count, 1);
    assert_eq!(aa.total_compute, 60.0);
    assert_eq!(agg.group_metrics("cc").unwrap().member_count, 1);
    assert_group_aggregates(&agg);
}

#[tokio::test]
async fn test_disconnect_marks_retained_devices_simulated() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 5, 2);
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;
    assert!(
        agg.all_device_metrics()
            .values()
            .all(|d| d.source == DataSource::Ledger)
    );

    ledger.set_connected(false);
    agg.refresh_all().await;

    let devices = agg.all_device_metrics();
    assert_eq!(devices.len(), 5 + CATALOG_SIZE);
    assert!(devices.values().all(|d| d.source == DataSource::Simulated));
    assert_eq!(agg.current_source(), DataSource::Simulated);
    assert!(!agg.system_metrics().unwrap().ledger_connected);
}

#[tokio::test]
async fn test_reads_are_idempotent_between_passes() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 3, 1);
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;

    let first = agg.all_device_metrics();
    let second = agg.all_device_metrics();
    assert_eq!(first, second);
    let mut a: Vec<_> = first.values().map(|d| serde_json::to_string(d).unwrap()).collect();
    let mut b: Vec<_> = second.values().map(|d| serde_json::to_string(d).unwrap()).collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert_eq!(agg.system_metrics(), agg.system_metrics());
}

#[tokio::test]
async fn test_unknown_ids_are_absent_not_errors() {
    let agg = aggregator_over(Arc::new(FixtureLedger::new()));
    agg.refresh_all().await;
    assert!(agg.device_metrics("nope").is_none());
    assert!(agg.group_metrics("nope").is_none());
    assert_eq!(agg.device_health("nope").status, HealthStatus::Unknown);
    assert_eq!(agg.group_health("nope").status, HealthStatus::Unknown);
}

#[tokio::test]
async fn test_metrics_updated_event_touches_only_that_device() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 3, 0);
    let agg = aggregator_over(ledger.clone());
    agg.update_device_metrics().await;
    let before = agg.all_device_metrics();

    tokio::time::sleep(Duration::from_millis(5)).await;
    ledger.push_event(event(
        EventKind::DeviceMetricsUpdated,
        10,
        &[("gpuId", "gpu_l00")],
    ));
    assert_eq!(agg.poll_events().await, 1);

    let after = agg.all_device_metrics();
    assert!(after["gpu_l00"].last_updated > before["gpu_l00"].last_updated);
    for id in ["gpu_l01", "gpu_l02"] {
        assert_eq!(after[id], before[id], "{id} should be untouched");
    }
}

#[tokio::test]
async fn test_rental_event_refreshes_devices_and_system() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 2, 0);
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;
    assert_eq!(agg.system_metrics().unwrap().rented_devices, 0);

    ledger.insert_device(RawDevice::new("gpu_l01", 80.0, 24.0).rented_by("0xabc", u64::MAX));
    ledger.push_event(event(EventKind::DeviceRented, 11, &[("gpuId", "gpu_l01")]));
    agg.poll_events().await;

    assert!(agg.device_metrics("gpu_l01").unwrap().is_rented);
    assert_eq!(agg.system_metrics().unwrap().rented_devices, 1);
}

#[tokio::test]
async fn test_group_created_event_refreshes_groups() {
    let ledger = Arc::new(FixtureLedger::connected());
    ledger.insert_device(RawDevice::new("gpu_a", 80.0, 24.0).in_group("cc"));
    let agg = aggregator_over(ledger.clone());
    agg.refresh_all().await;

    ledger.insert_group(raw_group("cc", &["gpu_a"]));
    ledger.push_event(event(EventKind::GroupCreated, 12, &[("subnetId", "cc")]));
    agg.poll_events().await;

    let g = agg.group_metrics("cc").unwrap();
    assert_eq!(g.member_count, 1);
    assert_eq!(g.purpose, "ML Training");
    assert_eq!(agg.system_metrics().unwrap().active_groups, 1);
}

#[tokio::test]
async fn test_stale_devices_are_kept() {
    let ledger = Arc::new(FixtureLedger::connected());
    seed_devices(&ledger, 2, 0);
    let agg = aggregator_over(ledger.clone());
    agg.update_device_metrics().await;

    ledger.remove_device("gpu_l01");
    agg.update_device_metrics().await;
    assert!(agg.device_metrics("gpu_l01").is_some());
    assert_eq!(agg.device_count(), 2);
}

#[tokio::test]
async fn test_simulate_update_overwrites_supplied_fields() {
    let agg = aggregator_over(Arc::new(FixtureLedger::new()));
    agg.update_device_metrics().await;
    let before = agg.device_metrics("gpu_002").unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let patch = DeviceMetricsPatch {
        temperature: Some(93.0),
        utilization: Some(99.0),
        ..Default::default()
    };
    assert!(agg.simulate_update("gpu_002", &patch));

    let after = agg.device_metrics("gpu_002").unwrap();
    assert_eq!(after.temperature, 93.0);
    assert_eq!(after.utilization, 99.0);
    assert_eq!(after.power_draw, before.power_draw);
    assert!(after.last_updated > before.last_updated);
    assert_eq!(agg.device_health("gpu_002").status, HealthStatus::Critical);

    let snapshot = agg.all_device_metrics();
    assert!(!agg.simulate_update("gpu_999", &patch));
    assert_eq!(agg.all_device_metrics(), snapshot);
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_ends_loops() {
    let agg = aggregator_over(Arc::new(FixtureLedger::new()));
    assert!(agg.start());
    assert!(!agg.start());
    assert!(agg.is_running());

    // First tick of each loop fires immediately.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while agg.system_metrics().is_none() || agg.device_count() < CATALOG_SIZE {
        assert!(tokio::time::Instant::now() < deadline, "tiers never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let token = agg.shutdown_token().unwrap();
    agg.stop().await;
    assert!(token.is_cancelled());
    assert!(!agg.is_running());
    // Stopping twice is harmless.
    agg.stop().await;
}
