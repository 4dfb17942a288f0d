//! Contract Test: Push Registry
//!
//! Verifies that asserted plug state drives transitions directly.
//!
//! Constraints verified:
//! - Repeated identical reports are silent
//! - Each state change notifies once and stamps the matching power instant
//! - Transitions persist the device set
//! - Unresolvable complex keys evict known devices
//! - A device follows the complex of its latest report

mod common;

use common::*;
use presence_core::{DeviceReport, IngestOutcome, PushRegistry};
use std::sync::Arc;

fn registry(sink: Arc<RecordingSink>, store: Arc<CountingStore>) -> PushRegistry {
    PushRegistry::new(vec![complex("c1").with_direct_wire(true)], sink, store)
}

fn report(plugged: bool) -> DeviceReport {
    DeviceReport::push("d1", "Fridge", "c1", plugged)
}

#[tokio::test]
async fn repeated_plugged_reports_are_silent() {
    let sink = RecordingSink::new();
    let store = CountingStore::new();
    let registry = registry(sink.clone(), store.clone());

    assert_eq!(registry.handle_device_at(report(true), at(0)).await, IngestOutcome::Registered);
    for t in 1..10 {
        assert_eq!(registry.handle_device_at(report(true), at(t)).await, IngestOutcome::Refreshed);
    }

    assert_eq!(sink.count(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn unplug_notifies_once_with_fresh_power_off() {
    let sink = RecordingSink::new();
    let store = CountingStore::new();
    let registry = registry(sink.clone(), store.clone());

    registry.handle_device_at(report(true), at(0)).await;
    assert_eq!(registry.handle_device_at(report(false), at(50)).await, IngestOutcome::WentOffline);
    assert_eq!(registry.handle_device_at(report(false), at(60)).await, IngestOutcome::Refreshed);

    assert_eq!(sink.count(), 1);
    assert_eq!(store.write_count(), 1);

    let device = registry.device("d1").await.unwrap();
    assert_eq!(device.power_off_at, Some(at(50)));
    assert!(device.down_notified && !device.up_notified);
    assert!(!device.plugged_in);

    // Message is rendered from the record before the change
    let notification = &sink.received()[0];
    assert!(notification.device.plugged_in);
    assert!(notification.message.contains("Power was on for 50s"));
}

#[tokio::test]
async fn replug_notifies_online() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone(), CountingStore::new());

    registry.handle_device_at(report(false), at(0)).await;
    assert_eq!(registry.handle_device_at(report(true), at(3723)).await, IngestOutcome::WentOnline);

    let device = registry.device("d1").await.unwrap();
    assert_eq!(device.power_on_at, Some(at(3723)));
    assert!(device.up_notified && !device.down_notified);
    assert!(sink.received()[0].message.contains("Power was off for 1h2m3s"));
}

#[tokio::test]
async fn notification_override_survives_reports() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone(), CountingStore::new());

    registry
        .handle_device_at(report(true).with_notification_enabled(false), at(0))
        .await;
    assert!(!registry.device("d1").await.unwrap().notification_enabled);

    // Later reports do not reset the device's own switch
    registry.handle_device_at(report(true), at(1)).await;
    assert!(!registry.device("d1").await.unwrap().notification_enabled);

    registry.update_notification("d1", true).await;
    registry.handle_device_at(report(true), at(2)).await;
    assert!(registry.device("d1").await.unwrap().notification_enabled);
}

#[tokio::test]
async fn unresolved_complex_evicts() {
    let registry = registry(RecordingSink::new(), CountingStore::new());
    registry.handle_device_at(report(true), at(0)).await;

    registry.update_complexes(vec![complex("c2")]).await;
    assert_eq!(registry.handle_device_at(report(true), at(1)).await, IngestOutcome::Evicted);
    assert!(registry.devices().await.is_empty());

    // Unknown device with unknown complex is a no-op
    assert_eq!(registry.handle_device_at(report(true), at(2)).await, IngestOutcome::Ignored);
}

#[tokio::test]
async fn status_text_reflects_last_assertion() {
    let registry = registry(RecordingSink::new(), CountingStore::new());
    registry.handle_device_at(report(true), at(0)).await;
    registry
        .handle_device_at(DeviceReport::push("d2", "Heater", "c1", false), at(0))
        .await;

    let text = registry.status_text("c1").await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Fridge on since"));
    assert!(lines[1].starts_with("Heater off since"));

    assert_eq!(registry.status_text("nope").await, "");
}

#[tokio::test]
async fn device_follows_complex_of_latest_report() {
    let sink = RecordingSink::new();
    let registry = PushRegistry::new(
        vec![complex("c1"), complex("c2")],
        sink.clone(),
        CountingStore::new(),
    );

    registry.handle_device_at(report(true), at(0)).await;
    registry
        .handle_device_at(DeviceReport::push("d1", "Fridge", "c2", true), at(5))
        .await;

    assert_eq!(registry.device("d1").await.unwrap().complex_key, "c2");
    assert_eq!(registry.status_text("c1").await, "");
    assert!(registry.status_text("c2").await.starts_with("Fridge on since"));

    registry.update_complexes(vec![complex("c2")]).await;
    assert_eq!(
        registry
            .handle_device_at(DeviceReport::push("d1", "Fridge", "c2", false), at(10))
            .await,
        IngestOutcome::WentOffline
    );
    assert_eq!(sink.received()[0].complex.key, "c2");
}
