//! Configuration types for the presence monitor
//!
//! Loading configuration from files or the environment is left to the
//! embedding application; this module only defines the shape and validates
//! it.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::dispatcher::DEFAULT_QUEUE_CAPACITY;
use crate::model::Complex;

/// Largest accepted UTC offset, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Configured complexes; devices reporting other keys are ignored
    #[serde(default)]
    pub complexes: Vec<Complex>,

    /// Optional dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Offset applied when rendering times and looking up schedules
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl MonitorConfig {
    /// Create a configuration for the given complexes with defaults
    pub fn new(complexes: Vec<Complex>) -> Self {
        Self {
            complexes,
            dispatcher: DispatcherConfig::default(),
            utc_offset_minutes: 0,
        }
    }

    /// Set the local time offset
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut keys = HashSet::new();

        for complex in &self.complexes {
            if complex.key.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "Complex '{}' has an empty key",
                    complex.name
                )));
            }

            if !keys.insert(complex.key.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate complex key: {}",
                    complex.key
                )));
            }
        }

        self.dispatcher.validate()?;
        self.timezone()?;

        Ok(())
    }

    /// Local time offset as a chrono timezone
    pub fn timezone(&self) -> Result<FixedOffset, crate::Error> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(crate::Error::config(format!(
                "UTC offset must be within ±{} minutes. Got: {}",
                MAX_UTC_OFFSET_MINUTES, self.utc_offset_minutes
            )));
        }

        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            crate::Error::config(format!("Invalid UTC offset: {}", self.utc_offset_minutes))
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Capacity of the notification queue
    ///
    /// When full, registries wait for room instead of dropping.
    ///
    /// Default: 100 notifications
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    /// Validate the dispatcher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Dispatcher queue capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
