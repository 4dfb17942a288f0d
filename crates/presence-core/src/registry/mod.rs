//! Device registries
//!
//! Two independent registries track device presence:
//!
//! - [`HeartbeatRegistry`]: devices that report periodically; offline state
//!   is inferred from silence longer than `interval × 3`
//! - [`PushRegistry`]: devices that assert their plug state on every report
//!
//! Each registry guards its complexes and devices with a single
//! `tokio::sync::RwLock`. Mutations hold the write lock for their whole
//! duration, including the hand-off to the notification sink, so a report
//! and a sweep for the same device are ordered by the lock rather than by
//! timestamps. The registries never share a lock.
//!
//! ## Snapshots
//!
//! A snapshot is the complete device set encoded as one JSON array and
//! stored under a fixed key per registry. Restoring replaces the device map
//! wholesale, or leaves it untouched if anything goes wrong.

pub mod heartbeat;
pub mod push;

pub use heartbeat::{HEARTBEAT_SNAPSHOT_KEY, HeartbeatRegistry, SWEEP_PERIOD};
pub use push::{PUSH_SNAPSHOT_KEY, PushRegistry};

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::Device;
use crate::traits::SnapshotStore;

/// What a single report did to a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First report from this device; no notification
    Registered,
    /// Known device, no transition
    Refreshed,
    /// Device transitioned to online; a notification was handed off
    WentOnline,
    /// Device transitioned to offline; a notification was handed off
    WentOffline,
    /// Complex key no longer resolves; the device was removed
    Evicted,
    /// Unknown device with an unknown complex key
    Ignored,
}

/// Encode a device map as a snapshot payload
///
/// Records are ordered by id so equal maps encode identically.
pub(crate) fn encode_snapshot(devices: &HashMap<String, Device>) -> Result<String> {
    let mut records: Vec<&Device> = devices.values().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(serde_json::to_string(&records)?)
}

/// Decode a snapshot payload into a device map
pub(crate) fn decode_snapshot(payload: &str) -> Result<HashMap<String, Device>> {
    if payload.trim().is_empty() {
        return Err(Error::snapshot("Snapshot payload is empty"));
    }

    let records: Vec<Device> = serde_json::from_str(payload)?;
    Ok(records.into_iter().map(|d| (d.id.clone(), d)).collect())
}

/// Read and decode the snapshot stored under `key`
pub(crate) async fn load_snapshot(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<HashMap<String, Device>> {
    match store.get(key).await? {
        Some(payload) => decode_snapshot(&payload),
        None => Err(Error::not_found(format!("No snapshot stored under '{}'", key))),
    }
}

/// Encode and store `devices` under `key`
pub(crate) async fn save_snapshot(
    store: &dyn SnapshotStore,
    key: &str,
    devices: &HashMap<String, Device>,
) -> Result<()> {
    let payload = encode_snapshot(devices)?;
    store.store(key, &payload).await
}

/// Devices ordered by id, for deterministic reports
pub(crate) fn sorted<'a>(devices: impl Iterator<Item = &'a Device>) -> Vec<&'a Device> {
    let mut devices: Vec<&Device> = devices.collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    devices
}
