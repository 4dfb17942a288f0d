//! Weekly availability schedule
//!
//! The table maps group id → weekday name → hour bucket → status token. The
//! hour bucket is the hour of day plus one, i.e. the status for the upcoming
//! hour, stored as a string (`"1"` .. `"24"`).
//!
//! The whole table is swapped on reconfiguration. Readers clone an `Arc` to
//! the current table and never see a partially replaced one.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Power expected
pub const STATUS_YES: &str = "yes";
/// Power not expected
pub const STATUS_NO: &str = "no";
/// Power may be cut
pub const STATUS_MAYBE: &str = "maybe";

/// One schedule group as found in schedule files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Weekday name → hour bucket → status token
    #[serde(default)]
    pub week: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Default)]
struct ScheduleTable {
    version: u64,
    groups: HashMap<i64, ScheduleGroup>,
}

/// Read-mostly schedule lookup shared by the heartbeat registry
#[derive(Debug, Default)]
pub struct ScheduleIndex {
    table: RwLock<Arc<ScheduleTable>>,
}

impl ScheduleIndex {
    /// Create an index holding `groups` as version 1
    pub fn new(groups: Vec<ScheduleGroup>) -> Self {
        Self {
            table: RwLock::new(Arc::new(ScheduleTable {
                version: 1,
                groups: index_groups(groups),
            })),
        }
    }

    /// Parse a schedule file body (a JSON list of groups)
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let groups: Vec<ScheduleGroup> = serde_json::from_str(json)?;
        Ok(Self::new(groups))
    }

    /// Replace the whole table
    pub fn replace(&self, groups: Vec<ScheduleGroup>) {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        let version = guard.version + 1;
        *guard = Arc::new(ScheduleTable {
            version,
            groups: index_groups(groups),
        });
        tracing::debug!("Schedule table replaced, version {}", version);
    }

    /// Version of the current table; bumped on every replacement
    pub fn version(&self) -> u64 {
        self.current().version
    }

    /// Raw status token for the hour following `at`
    ///
    /// Returns an empty string when the group, weekday or bucket is absent.
    pub fn lookup<Tz: TimeZone>(&self, group_id: i64, at: &DateTime<Tz>) -> String {
        let table = self.current();
        let bucket = (at.hour() + 1).to_string();

        table
            .groups
            .get(&group_id)
            .and_then(|group| group.week.get(weekday_name(at.weekday())))
            .and_then(|day| day.get(&bucket))
            .cloned()
            .unwrap_or_default()
    }

    /// Human sentence for the status at `at`, or an empty string when the
    /// token is missing or unrecognized
    pub fn describe<Tz: TimeZone>(&self, group_id: i64, at: &DateTime<Tz>) -> String {
        match self.lookup(group_id, at).as_str() {
            STATUS_YES => format!("According to the schedule of group {}, power is on", group_id),
            STATUS_NO => format!("According to the schedule of group {}, power is off", group_id),
            STATUS_MAYBE => format!(
                "According to the schedule of group {}, power may be off",
                group_id
            ),
            _ => String::new(),
        }
    }

    fn current(&self) -> Arc<ScheduleTable> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn index_groups(groups: Vec<ScheduleGroup>) -> HashMap<i64, ScheduleGroup> {
    groups.into_iter().map(|g| (g.id, g)).collect()
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
