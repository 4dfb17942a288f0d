//! Contract Test: Heartbeat Transitions
//!
//! Verifies that silence-based offline detection produces exactly one
//! notification per transition.
//!
//! Constraints verified:
//! - A device within its timeout is reported online
//! - Repeated sweeps over a silent device notify once
//! - A device reporting after going offline notifies once
//! - First sight never notifies
//! - A device follows the complex of its latest report
//! - Oversized intervals from a payload are absorbed

mod common;

use common::*;
use presence_core::{
    DeviceReport, HeartbeatRegistry, IngestOutcome, MemorySnapshotStore, ScheduleIndex,
};
use std::sync::Arc;

fn registry(sink: Arc<RecordingSink>) -> HeartbeatRegistry {
    HeartbeatRegistry::new(
        vec![complex("c1")],
        sink,
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(ScheduleIndex::default()),
    )
}

fn report(id: &str) -> DeviceReport {
    DeviceReport::heartbeat(id, "Router", "c1", 10)
}

#[tokio::test]
async fn offline_then_online_scenario() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());

    assert_eq!(registry.ingest_at(report("d1"), at(0)).await, IngestOutcome::Registered);

    assert_eq!(registry.sweep_at(at(20)).await, 0, "t=20 is within the 30s timeout");
    assert_eq!(sink.count(), 0);

    assert_eq!(registry.sweep_at(at(31)).await, 1);
    assert_eq!(sink.count(), 1);
    let device = registry.device("d1").await.unwrap();
    assert!(device.down_notified);
    assert!(!device.up_notified);

    assert_eq!(registry.ingest_at(report("d1"), at(40)).await, IngestOutcome::WentOnline);
    assert_eq!(sink.count(), 2);

    let device = registry.device("d1").await.unwrap();
    assert!(device.up_notified);
    assert!(!device.down_notified);
    assert_eq!(device.power_on_at, Some(at(40)));
    assert_eq!(device.last_seen, at(40));

    let received = sink.received();
    assert!(received[0].message.contains("lost power"));
    assert!(received[1].message.contains("Power was off for 40s"));
}

#[tokio::test]
async fn repeated_sweeps_notify_once() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());
    registry.ingest_at(report("d1"), at(0)).await;

    for t in (31..200).step_by(10) {
        registry.sweep_at(at(t)).await;
    }

    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn timeout_boundary_counts_as_online() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());
    registry.ingest_at(report("d1"), at(0)).await;

    assert_eq!(registry.sweep_at(at(30)).await, 0);

    let report = registry.status_report_at(at(30)).await;
    assert_eq!(report[0].online_device_count, 1);
    assert!(report[0].devices[0].is_online);

    let report = registry.status_report_at(at(31)).await;
    assert_eq!(report[0].offline_device_count, 1);
}

#[tokio::test]
async fn regular_reports_never_notify() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());

    for t in (0..300).step_by(10) {
        registry.ingest_at(report("d1"), at(t)).await;
        registry.sweep_at(at(t + 5)).await;
    }

    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn report_without_prior_sweep_still_notifies_online() {
    // Silence long enough to time out, but the sweep never ran
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());
    registry.ingest_at(report("d1"), at(0)).await;

    assert_eq!(registry.ingest_at(report("d1"), at(100)).await, IngestOutcome::WentOnline);
    assert_eq!(sink.count(), 1);

    // Already latched up: a second long gap is silent
    assert_eq!(registry.ingest_at(report("d1"), at(200)).await, IngestOutcome::Refreshed);
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn schedule_annotation_follows_device_line() {
    let sink = RecordingSink::new();
    let schedule = ScheduleIndex::from_json(
        r#"[{"id": 7, "name": "Group 7", "week": {
            "Tuesday": {"1": "maybe", "2": "maybe", "3": "maybe", "4": "maybe", "5": "maybe", "6": "maybe",
                        "7": "maybe", "8": "maybe", "9": "maybe", "10": "maybe", "11": "maybe", "12": "maybe",
                        "13": "maybe", "14": "maybe", "15": "maybe", "16": "maybe", "17": "maybe", "18": "maybe",
                        "19": "maybe", "20": "maybe", "21": "maybe", "22": "maybe", "23": "maybe", "24": "maybe"}
        }}]"#,
    )
    .unwrap();

    let registry = HeartbeatRegistry::new(
        vec![complex("c1").with_device_group("d1", 7)],
        sink,
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(schedule),
    );

    // at(0) is 2023-11-14, a Tuesday
    registry.ingest_at(report("d1"), at(0)).await;
    registry.ingest_at(report("d2"), at(0)).await;

    let text = registry.status_text_at("c1", at(5)).await;
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Router on since"));
    assert_eq!(lines[1], "According to the schedule of group 7, power may be off");
    assert!(lines[2].starts_with("Router on since"));

    assert_eq!(registry.status_text_at("unknown", at(5)).await, "");
}

#[tokio::test]
async fn device_follows_complex_of_latest_report() {
    let sink = RecordingSink::new();
    let registry = HeartbeatRegistry::new(
        vec![complex("c1"), complex("c2")],
        sink.clone(),
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(ScheduleIndex::default()),
    );

    registry.ingest_at(report("d1"), at(0)).await;
    registry
        .ingest_at(DeviceReport::heartbeat("d1", "Router", "c2", 10), at(5))
        .await;

    assert_eq!(registry.device("d1").await.unwrap().complex_key, "c2");
    assert_eq!(registry.status_text_at("c1", at(6)).await, "");
    assert!(registry.status_text_at("c2", at(6)).await.starts_with("Router on since"));

    let report = registry.status_report_at(at(6)).await;
    assert!(report[0].devices.is_empty());
    assert_eq!(report[1].online_device_count, 1);

    // The old complex goes away; offline is still announced through the new one
    registry.update_complexes(vec![complex("c2")]).await;
    registry
        .ingest_at(DeviceReport::heartbeat("d1", "Router", "c2", 10), at(10))
        .await;
    assert_eq!(registry.sweep_at(at(41)).await, 1);

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].complex.key, "c2");
    assert!(received[0].is_admitted());
}

#[tokio::test]
async fn oversized_interval_never_times_out() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());

    let huge: DeviceReport =
        serde_json::from_str(r#"{"m":"d1","n":"x","k":"c1","i":4000000000000000000}"#).unwrap();

    assert_eq!(registry.ingest_at(huge.clone(), at(0)).await, IngestOutcome::Registered);
    assert_eq!(registry.device("d1").await.unwrap().timeout_secs, i64::MAX);

    assert_eq!(registry.ingest_at(huge, at(100)).await, IngestOutcome::Refreshed);
    assert_eq!(registry.sweep_at(at(1_000_000)).await, 0);
    assert_eq!(sink.count(), 0);
}
