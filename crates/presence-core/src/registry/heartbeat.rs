//! Heartbeat registry
//!
//! Devices on this path report periodically and say nothing about their own
//! power state. A device is offline when more than `interval × 3` seconds
//! have passed since its last report.
//!
//! ## Transitions
//!
//! ```text
//!            sweep: timed out && !down_notified
//!   online ───────────────────────────────────────▶ offline
//!     ▲                                               │
//!     └───────────────────────────────────────────────┘
//!        report: timed out && !up_notified
//! ```
//!
//! Each arrow hands one notification to the sink and flips the latch pair.
//! A device seen for the first time is registered silently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::{RwLock, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info};

use super::{IngestOutcome, load_snapshot, save_snapshot, sorted};
use crate::error::Error;
use crate::model::{Complex, ComplexInfo, Device, DeviceReport, Notification, complexes_by_key};
use crate::schedule::ScheduleIndex;
use crate::traits::{NotificationSink, SnapshotStore};

/// Store key for heartbeat snapshots
pub const HEARTBEAT_SNAPSHOT_KEY: &str = "devices";

/// Period between timeout sweeps
pub const SWEEP_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct HeartbeatState {
    complexes: HashMap<String, Complex>,
    devices: HashMap<String, Device>,
}

/// Registry of devices whose offline state is inferred from silence
pub struct HeartbeatRegistry {
    state: RwLock<HeartbeatState>,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn SnapshotStore>,
    schedule: Arc<ScheduleIndex>,
    tz: FixedOffset,
}

impl HeartbeatRegistry {
    /// Create an empty registry
    ///
    /// # Parameters
    ///
    /// - `complexes`: Complexes devices may report under
    /// - `sink`: Receives online/offline notifications
    /// - `store`: Snapshot persistence
    /// - `schedule`: Availability schedule used by status text
    pub fn new(
        complexes: Vec<Complex>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn SnapshotStore>,
        schedule: Arc<ScheduleIndex>,
    ) -> Self {
        Self {
            state: RwLock::new(HeartbeatState {
                complexes: complexes_by_key(complexes),
                devices: HashMap::new(),
            }),
            sink,
            store,
            schedule,
            tz: Utc.fix(),
        }
    }

    /// Render times and look up schedules in `tz`
    pub fn with_timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    /// Apply a heartbeat report at the current time
    pub async fn ingest(&self, report: DeviceReport) -> IngestOutcome {
        self.ingest_at(report, Utc::now()).await
    }

    /// Apply a heartbeat report as if received at `now`
    pub async fn ingest_at(&self, report: DeviceReport, now: DateTime<Utc>) -> IngestOutcome {
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
            device.refresh_timeout();
            device.power_on_at = Some(now);

            info!(
                "Registered {} ({}) in {}, timeout {}s",
                device.id, device.name, complex.key, device.timeout_secs
            );
            state.devices.insert(device.id.clone(), device);
            return IngestOutcome::Registered;
        };

        let mut device = previous.clone();
        let mut notification = None;

        if previous.is_timed_out_at(now) && !previous.up_notified {
            device.up_notified = true;
            device.down_notified = false;
            device.power_on_at = Some(now);

            info!("{} ({}) is back online", device.id, device.name);
            notification = Some(Notification {
                message: previous.timeout_online_message(&complex, now, &self.tz),
                device: previous,
                complex,
            });
        }

        device.name = report.name;
        device.complex_key = report.complex_key;
        if report.interval_secs > 0 {
            device.interval_secs = report.interval_secs;
        }
        device.refresh_timeout();
        device.last_seen = now;
        state.devices.insert(device.id.clone(), device);

        match notification {
            Some(notification) => {
                self.sink.notify(notification).await;
                IngestOutcome::WentOnline
            }
            None => IngestOutcome::Refreshed,
        }
    }

    /// Mark silent devices offline at the current time
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Mark devices offline whose timeout has elapsed at `now`
    ///
    /// # Returns
    ///
    /// The number of devices that transitioned to offline.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        let HeartbeatState { complexes, devices } = &mut *state;

        let mut ids: Vec<String> = devices
            .values()
            .filter(|d| d.is_timed_out_at(now) && !d.down_notified)
            .map(|d| d.id.clone())
            .collect();
        ids.sort();

        let mut notifications = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(device) = devices.get_mut(id) else {
                continue;
            };

            device.down_notified = true;
            device.up_notified = false;
            info!(
                "{} ({}) went offline, last seen {}",
                device.id, device.name, device.last_seen
            );

            // Devices are only evicted on ingest; an unconfigured complex
            // still gets a placeholder so the transition is recorded.
            let complex = complexes
                .get(&device.complex_key)
                .cloned()
                .unwrap_or_else(|| Complex::new(device.complex_key.clone(), "").with_notifications(false));

            notifications.push(Notification {
                message: device.timeout_offline_message(&complex, now, &self.tz),
                device: device.clone(),
                complex,
            });
        }

        for notification in notifications {
            self.sink.notify(notification).await;
        }

        ids.len()
    }

    /// Run periodic sweeps until `shutdown_rx` fires
    ///
    /// The first sweep happens one `period` after the call.
    pub async fn run_sweeper(self: Arc<Self>, period: Duration, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        info!("Sweeper started, period {:?}", period);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => break,

                Some(_) = ticks.next() => {
                    let transitions = self.sweep().await;
                    if transitions > 0 {
                        debug!("Sweep marked {} device(s) offline", transitions);
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }

    /// Replace the configured complexes
    ///
    /// Devices of removed complexes are evicted on their next report.
    pub async fn update_complexes(&self, complexes: Vec<Complex>) {
        let mut state = self.state.write().await;
        state.complexes = complexes_by_key(complexes);
        debug!("Heartbeat registry now has {} complex(es)", state.complexes.len());
    }

    /// Configured complex by key
    pub async fn complex(&self, key: &str) -> Option<Complex> {
        self.state.read().await.complexes.get(key).cloned()
    }

    /// Copy of a single device record
    pub async fn device(&self, id: &str) -> Option<Device> {
        self.state.read().await.devices.get(id).cloned()
    }

    /// Copies of all device records, ordered by id
    pub async fn devices(&self) -> Vec<Device> {
        let state = self.state.read().await;
        sorted(state.devices.values()).into_iter().cloned().collect()
    }

    /// Per-complex online/offline report at the current time
    pub async fn status_report(&self) -> Vec<ComplexInfo> {
        self.status_report_at(Utc::now()).await
    }

    /// Per-complex online/offline report as of `now`
    pub async fn status_report_at(&self, now: DateTime<Utc>) -> Vec<ComplexInfo> {
        let state = self.state.read().await;

        let mut complexes: Vec<&Complex> = state.complexes.values().collect();
        complexes.sort_by(|a, b| a.key.cmp(&b.key));

        complexes
            .into_iter()
            .map(|complex| {
                let mut info = ComplexInfo::empty(complex);
                for device in sorted(state.devices.values()) {
                    if device.complex_key == complex.key {
                        info.push_device(device, !device.is_timed_out_at(now));
                    }
                }
                info
            })
            .collect()
    }

    /// Status lines for a complex at the current time
    pub async fn status_text(&self, complex_key: &str) -> String {
        self.status_text_at(complex_key, Utc::now()).await
    }

    /// Status lines for a complex as of `now`, each followed by the device's
    /// schedule annotation when one applies
    ///
    /// Empty when the complex is unknown or has no devices.
    pub async fn status_text_at(&self, complex_key: &str, now: DateTime<Utc>) -> String {
        let state = self.state.read().await;
        let Some(complex) = state.complexes.get(complex_key) else {
            return String::new();
        };

        let local_now = now.with_timezone(&self.tz);
        let mut lines = Vec::new();

        for device in sorted(state.devices.values()) {
            if device.complex_key != complex.key {
                continue;
            }

            lines.push(device.heartbeat_status_line(now, &self.tz));

            if let Some(group) = complex.group_of(&device.id) {
                let annotation = self.schedule.describe(group, &local_now);
                if !annotation.is_empty() {
                    lines.push(annotation);
                }
            }
        }

        lines.join("\n")
    }

    /// Store the full device set
    ///
    /// # Returns
    ///
    /// `true` if a snapshot was written. An empty registry is not written,
    /// so a fresh process never overwrites a previous snapshot.
    pub async fn snapshot(&self) -> bool {
        let state = self.state.read().await;

        if state.devices.is_empty() {
            info!("No heartbeat devices to back up");
            return false;
        }

        match save_snapshot(self.store.as_ref(), HEARTBEAT_SNAPSHOT_KEY, &state.devices).await {
            Ok(()) => {
                info!("Heartbeat backup complete: {} device(s)", state.devices.len());
                true
            }
            Err(e) => {
                error!("Failed to back up heartbeat devices: {}", e);
                false
            }
        }
    }

    /// Replace the device set with the stored snapshot
    ///
    /// # Returns
    ///
    /// `true` if the snapshot was applied. On any failure the registry keeps
    /// its previous devices.
    pub async fn restore(&self) -> bool {
        let mut state = self.state.write().await;

        match load_snapshot(self.store.as_ref(), HEARTBEAT_SNAPSHOT_KEY).await {
            Ok(devices) => {
                info!("Restored {} heartbeat device(s)", devices.len());
                state.devices = devices;
                true
            }
            Err(e) => {
                error!("Failed to restore heartbeat devices: {}", e);
                false
            }
        }
    }
}
