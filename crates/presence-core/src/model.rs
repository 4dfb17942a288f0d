//! Device, complex and notification types shared by both registries
//!
//! Records in this module are plain values. Registries hand out clones and
//! never references into their maps.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Multiplier applied to a heartbeat interval to get its timeout
pub const TIMEOUT_COEFFICIENT: i64 = 3;

const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A configured site whose devices share notification channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complex {
    /// Key devices report under
    pub key: String,

    /// Display name used in messages
    pub name: String,

    /// Channels every notification for this complex is sent to
    #[serde(default, alias = "bot_channels")]
    pub channels: Vec<i64>,

    /// Complex-level notification switch
    #[serde(default)]
    pub notification_enabled: bool,

    /// Whether statistics are collected for this complex
    #[serde(default)]
    pub statistics_enabled: bool,

    /// Key statistics are published under
    #[serde(default)]
    pub statistics_key: String,

    /// Device id -> schedule group id
    #[serde(default, alias = "device_group_map")]
    pub device_groups: HashMap<String, i64>,

    /// Status requests for this complex are served by the push registry
    #[serde(default, alias = "is_direct_wire")]
    pub direct_wire: bool,
}

impl Complex {
    /// Create a complex with notifications enabled and no channels
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            notification_enabled: true,
            ..Self::default()
        }
    }

    /// Set the notification channels
    pub fn with_channels(mut self, channels: Vec<i64>) -> Self {
        self.channels = channels;
        self
    }

    /// Enable or disable notifications for the whole complex
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notification_enabled = enabled;
        self
    }

    /// Mark the complex as served by the push registry
    pub fn with_direct_wire(mut self, direct_wire: bool) -> Self {
        self.direct_wire = direct_wire;
        self
    }

    /// Assign a device to a schedule group
    pub fn with_device_group(mut self, device_id: impl Into<String>, group_id: i64) -> Self {
        self.device_groups.insert(device_id.into(), group_id);
        self
    }

    /// Schedule group assigned to a device, if any
    pub fn group_of(&self, device_id: &str) -> Option<i64> {
        self.device_groups.get(device_id).copied()
    }
}

/// Index complexes by key; later entries win on duplicate keys
pub fn complexes_by_key(complexes: Vec<Complex>) -> HashMap<String, Complex> {
    complexes.into_iter().map(|c| (c.key.clone(), c)).collect()
}

/// Ingestion payload from either reporting path
///
/// Field aliases match the compact keys sent by device firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Physical device id (MAC address)
    #[serde(alias = "m")]
    pub id: String,

    /// Display name
    #[serde(alias = "n")]
    pub name: String,

    /// Key of the owning complex
    #[serde(alias = "k")]
    pub complex_key: String,

    /// Reporting interval in seconds
    #[serde(default, alias = "i")]
    pub interval_secs: i64,

    /// Reported plug state (push path only)
    #[serde(default, alias = "p")]
    pub plugged_in: bool,

    /// Direct-wire override
    #[serde(default, alias = "h")]
    pub direct_wire: Option<bool>,

    /// Notification-enabled override (applied on first registration)
    #[serde(default)]
    pub notification_enabled: Option<bool>,
}

impl DeviceReport {
    /// Create a report for the heartbeat path
    pub fn heartbeat(
        id: impl Into<String>,
        name: impl Into<String>,
        complex_key: impl Into<String>,
        interval_secs: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            complex_key: complex_key.into(),
            interval_secs,
            ..Self::default()
        }
    }

    /// Create a report for the push path
    pub fn push(
        id: impl Into<String>,
        name: impl Into<String>,
        complex_key: impl Into<String>,
        plugged_in: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            complex_key: complex_key.into(),
            plugged_in,
            ..Self::default()
        }
    }

    /// Set the direct-wire override
    pub fn with_direct_wire(mut self, direct_wire: bool) -> Self {
        self.direct_wire = Some(direct_wire);
        self
    }

    /// Set the notification-enabled override
    pub fn with_notification_enabled(mut self, enabled: bool) -> Self {
        self.notification_enabled = Some(enabled);
        self
    }
}

/// Per-device state held by a registry and persisted in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub complex_key: String,
    pub interval_secs: i64,
    #[serde(default)]
    pub timeout_secs: i64,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub power_on_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub power_off_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub down_notified: bool,
    #[serde(default)]
    pub up_notified: bool,
    #[serde(default)]
    pub plugged_in: bool,
    #[serde(default)]
    pub notification_enabled: bool,
    #[serde(default)]
    pub direct_wire: bool,
}

impl Device {
    /// Build a fresh record from a report; flags and power instants are left
    /// for the owning registry to initialize
    pub fn from_report(report: &DeviceReport, now: DateTime<Utc>) -> Self {
        Self {
            id: report.id.clone(),
            name: report.name.clone(),
            complex_key: report.complex_key.clone(),
            interval_secs: report.interval_secs,
            timeout_secs: 0,
            last_seen: now,
            power_on_at: None,
            power_off_at: None,
            down_notified: false,
            up_notified: false,
            plugged_in: report.plugged_in,
            notification_enabled: report.notification_enabled.unwrap_or(true),
            direct_wire: report.direct_wire.unwrap_or(false),
        }
    }

    /// Recompute the timeout as `interval × 3`, saturating on absurd
    /// intervals; negative intervals count as zero
    pub fn refresh_timeout(&mut self) {
        self.timeout_secs = self.interval_secs.max(0).saturating_mul(TIMEOUT_COEFFICIENT);
    }

    /// Silence-based offline predicate: strictly more than `timeout_secs`
    /// whole seconds since the last report
    pub fn is_timed_out_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() - self.last_seen.timestamp() > self.timeout_secs
    }

    /// Status line for a heartbeat device
    pub fn heartbeat_status_line(&self, now: DateTime<Utc>, tz: &FixedOffset) -> String {
        if self.is_timed_out_at(now) {
            format!("{} off since {}", self.name, local(self.last_seen, tz, STATUS_TIME_FORMAT))
        } else {
            let since = self.power_on_at.unwrap_or(self.last_seen);
            format!("{} on since {}", self.name, local(since, tz, STATUS_TIME_FORMAT))
        }
    }

    /// Status line for a push device, from its last asserted plug state
    pub fn push_status_line(&self, tz: &FixedOffset) -> String {
        if self.plugged_in {
            let since = self.power_on_at.unwrap_or(self.last_seen);
            format!("{} on since {}", self.name, local(since, tz, STATUS_TIME_FORMAT))
        } else {
            let since = self.power_off_at.unwrap_or(self.last_seen);
            format!("{} off since {}", self.name, local(since, tz, STATUS_TIME_FORMAT))
        }
    }

    /// Offline message after a heartbeat timeout
    pub fn timeout_offline_message(
        &self,
        complex: &Complex,
        now: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> String {
        let on_since = self.power_on_at.unwrap_or(self.last_seen);
        format!(
            "\"{} {}\" lost power at {}. Power was on for {}",
            self.name,
            complex.name,
            local(self.last_seen, tz, "%H:%M:%S"),
            format_elapsed(now - on_since),
        )
    }

    /// Online message after a heartbeat device reports again
    pub fn timeout_online_message(
        &self,
        complex: &Complex,
        now: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> String {
        format!(
            "\"{} {}\" power restored at {}. Power was off for {}",
            self.name,
            complex.name,
            local(now, tz, "%H:%M:%S"),
            format_elapsed(now - self.last_seen),
        )
    }

    /// Offline message after a push device reports unplugged
    pub fn push_offline_message(
        &self,
        complex: &Complex,
        now: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> String {
        let on_since = self.power_on_at.unwrap_or(self.last_seen);
        format!(
            "\"{} {}\" lost power at {}. Power was on for {}",
            self.name,
            complex.name,
            local(now, tz, "%H:%M"),
            format_elapsed(now - on_since),
        )
    }

    /// Online message after a push device reports plugged in
    pub fn push_online_message(
        &self,
        complex: &Complex,
        now: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> String {
        let off_since = self.power_off_at.unwrap_or(self.last_seen);
        format!(
            "\"{} {}\" power restored at {}. Power was off for {}",
            self.name,
            complex.name,
            local(now, tz, "%H:%M"),
            format_elapsed(now - off_since),
        )
    }
}

/// A detected transition ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Device state the message was rendered from
    pub device: Device,
    /// Owning complex at the time of the transition
    pub complex: Complex,
    /// Rendered message text
    pub message: String,
}

impl Notification {
    /// Admission filter applied once, at enqueue
    ///
    /// Suppressed when the complex has notifications disabled, or when the
    /// device is direct-wired and has its own notifications switched off.
    pub fn is_admitted(&self) -> bool {
        self.complex.notification_enabled
            && !(self.device.direct_wire && !self.device.notification_enabled)
    }
}

/// Per-device row of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub update_interval: i64,
    pub calculated_timeout: i64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Per-complex aggregate of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexInfo {
    pub key: String,
    pub name: String,
    pub notification_enabled: bool,
    pub statistics_enabled: bool,
    pub online_device_count: usize,
    pub offline_device_count: usize,
    pub devices: Vec<DeviceInfo>,
}

impl ComplexInfo {
    pub(crate) fn empty(complex: &Complex) -> Self {
        Self {
            key: complex.key.clone(),
            name: complex.name.clone(),
            notification_enabled: complex.notification_enabled,
            statistics_enabled: complex.statistics_enabled,
            online_device_count: 0,
            offline_device_count: 0,
            devices: Vec::new(),
        }
    }

    pub(crate) fn push_device(&mut self, device: &Device, online: bool) {
        if online {
            self.online_device_count += 1;
        } else {
            self.offline_device_count += 1;
        }

        self.devices.push(DeviceInfo {
            name: device.name.clone(),
            update_interval: device.interval_secs,
            calculated_timeout: device.timeout_secs,
            is_online: online,
            last_seen: device.last_seen,
        });
    }
}

fn local(at: DateTime<Utc>, tz: &FixedOffset, fmt: &str) -> String {
    at.with_timezone(tz).format(fmt).to_string()
}

/// Render an elapsed duration rounded to seconds, e.g. `1h2m3s`, `4m0s`, `7s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
