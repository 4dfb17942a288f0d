//! Push registry
//!
//! Devices on this path report their plug state on every event. State is
//! taken from the report as-is; nothing is inferred from silence.
//!
//! A transition is detected when the reported state disagrees with the
//! latched one (`up_notified` / `down_notified`). Every transition hands one
//! notification to the sink and then persists the full device set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{IngestOutcome, load_snapshot, save_snapshot, sorted};
use crate::error::Error;
use crate::model::{Complex, ComplexInfo, Device, DeviceReport, Notification, complexes_by_key};
use crate::traits::{NotificationSink, SnapshotStore};

/// Store key for push snapshots
pub const PUSH_SNAPSHOT_KEY: &str = "backup_online_devices";

#[derive(Debug, Default)]
struct PushState {
    complexes: HashMap<String, Complex>,
    devices: HashMap<String, Device>,
}

/// Registry of devices that assert their own plug state
pub struct PushRegistry {
    state: RwLock<PushState>,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn SnapshotStore>,
    tz: FixedOffset,
}

impl PushRegistry {
    pub fn new(
        complexes: Vec<Complex>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            state: RwLock::new(PushState {
                complexes: complexes_by_key(complexes),
                devices: HashMap::new(),
            }),
            sink,
            store,
            tz: Utc.fix(),
        }
    }

    /// Render message times in `tz`
    pub fn with_timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    /// Apply a plug-state report at the current time
    pub async fn handle_device(&self, report: DeviceReport) -> IngestOutcome {
        self.handle_device_at(report, Utc::now()).await
    }

    /// Apply a plug-state report as if received at `now`
    pub async fn handle_device_at(&self, report: DeviceReport, now: DateTime<Utc>) -> IngestOutcome {
        let mut state = self.state.write().await;

        let Some(complex) = state.complexes.get(&report.complex_key).cloned() else {
            if state.devices.remove(&report.id).is_some() {
                info!(
                    "Evicted {}: {}",
                    report.id,
                    Error::resolution(&report.complex_key)
                );
                return IngestOutcome::Evicted;
            }
            debug!(
                "Ignoring report from {}: {}",
                report.id,
                Error::resolution(&report.complex_key)
            );
            return IngestOutcome::Ignored;
        };

        let Some(previous) = state.devices.get(&report.id).cloned() else {
            let mut device = Device::from_report(&report, now);
            device.direct_wire = report.direct_wire.unwrap_or(true);

            if device.plugged_in {
                device.up_notified = true;
                device.power_on_at = Some(now);
            } else {
                device.down_notified = true;
                device.power_off_at = Some(now);
            }

            info!(
                "Registered {} ({}) in {}, plugged in: {}",
                device.id, device.name, complex.key, device.plugged_in
            );
            state.devices.insert(device.id.clone(), device);
            return IngestOutcome::Registered;
        };

        let mut device = previous.clone();
        device.name = report.name;
        device.complex_key = report.complex_key;
        device.last_seen = now;
        device.plugged_in = report.plugged_in;

        let (outcome, message) = if report.plugged_in && !previous.up_notified {
            device.up_notified = true;
            device.down_notified = false;
            device.power_on_at = Some(now);

            info!("{} ({}) is plugged in", device.id, device.name);
            (
                IngestOutcome::WentOnline,
                previous.push_online_message(&complex, now, &self.tz),
            )
        } else if !report.plugged_in && !previous.down_notified {
            device.down_notified = true;
            device.up_notified = false;
            device.power_off_at = Some(now);

            info!("{} ({}) is unplugged", device.id, device.name);
            (
                IngestOutcome::WentOffline,
                previous.push_offline_message(&complex, now, &self.tz),
            )
        } else {
            state.devices.insert(device.id.clone(), device);
            return IngestOutcome::Refreshed;
        };

        state.devices.insert(device.id.clone(), device);

        self.sink
            .notify(Notification {
                device: previous,
                complex,
                message,
            })
            .await;

        if let Err(e) = save_snapshot(self.store.as_ref(), PUSH_SNAPSHOT_KEY, &state.devices).await {
            error!("Failed to persist push devices after transition: {}", e);
        }

        outcome
    }

    /// Set a device's own notification switch
    ///
    /// # Returns
    ///
    /// `false` if the device is unknown.
    pub async fn update_notification(&self, id: &str, enabled: bool) -> bool {
        let mut state = self.state.write().await;

        match state.devices.get_mut(id) {
            Some(device) => {
                device.notification_enabled = enabled;
                info!("Notifications for {} set to {}", id, enabled);
                true
            }
            None => {
                debug!("Cannot update notifications: {} is not registered", id);
                false
            }
        }
    }

    /// Restart a device's power-on clock at the current time
    pub async fn update_power_on(&self, id: &str) -> bool {
        self.update_power_on_at(id, Utc::now()).await
    }

    /// Restart a device's power-on clock at `now`
    ///
    /// Flags are left alone. Returns `false` if the device is unknown.
    pub async fn update_power_on_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write().await;

        let Some(device) = state.devices.get_mut(id) else {
            debug!("Cannot update power-on time: {} is not registered", id);
            return false;
        };

        device.power_on_at = Some(now);
        debug!("Power-on time for {} reset to {}", id, now);
        true
    }

    /// Replace the configured complexes
    pub async fn update_complexes(&self, complexes: Vec<Complex>) {
        let mut state = self.state.write().await;
        state.complexes = complexes_by_key(complexes);
        debug!("Push registry now has {} complex(es)", state.complexes.len());
    }

    /// Configured complex by key
    pub async fn complex(&self, key: &str) -> Option<Complex> {
        self.state.read().await.complexes.get(key).cloned()
    }

    /// Copy of a single device record
    pub async fn device(&self, id: &str) -> Option<Device> {
        self.state.read().await.devices.get(id).cloned()
    }

    /// Copy of the full device map
    pub async fn devices(&self) -> HashMap<String, Device> {
        self.state.read().await.devices.clone()
    }

    /// Per-complex report; a device is online when its last report said
    /// plugged in
    pub async fn status_report(&self) -> Vec<ComplexInfo> {
        let state = self.state.read().await;

        let mut complexes: Vec<&Complex> = state.complexes.values().collect();
        complexes.sort_by(|a, b| a.key.cmp(&b.key));

        complexes
            .into_iter()
            .map(|complex| {
                let mut info = ComplexInfo::empty(complex);
                for device in sorted(state.devices.values()) {
                    if device.complex_key == complex.key {
                        info.push_device(device, device.plugged_in);
                    }
                }
                info
            })
            .collect()
    }

    /// Status lines for a complex, empty when it is unknown
    pub async fn status_text(&self, complex_key: &str) -> String {
        let state = self.state.read().await;
        if !state.complexes.contains_key(complex_key) {
            return String::new();
        }

        sorted(state.devices.values())
            .into_iter()
            .filter(|d| d.complex_key == complex_key)
            .map(|d| d.push_status_line(&self.tz))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Store the full device set; see [`HeartbeatRegistry::snapshot`]
    ///
    /// [`HeartbeatRegistry::snapshot`]: super::HeartbeatRegistry::snapshot
    pub async fn snapshot(&self) -> bool {
        let state = self.state.read().await;

        if state.devices.is_empty() {
            info!("No push devices to back up");
            return false;
        }

        match save_snapshot(self.store.as_ref(), PUSH_SNAPSHOT_KEY, &state.devices).await {
            Ok(()) => {
                info!("Push backup complete: {} device(s)", state.devices.len());
                true
            }
            Err(e) => {
                error!("Failed to back up push devices: {}", e);
                false
            }
        }
    }

    /// Replace the device set with the stored snapshot, or keep the current
    /// one on failure
    pub async fn restore(&self) -> bool {
        let mut state = self.state.write().await;

        match load_snapshot(self.store.as_ref(), PUSH_SNAPSHOT_KEY).await {
            Ok(devices) => {
                info!("Restored {} push device(s)", devices.len());
                state.devices = devices;
                true
            }
            Err(e) => {
                error!("Failed to restore push devices: {}", e);
                false
            }
        }
    }
}
