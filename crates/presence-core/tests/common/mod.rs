//! Test doubles and common utilities for contract tests
//!
//! Each double records what it was asked to do so tests can assert on the
//! observable effects of registry operations.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use presence_core::error::Result;
use presence_core::model::Notification;
use presence_core::traits::{NotificationSink, Notifier, SnapshotStore};
use presence_core::{Complex, Error, MemorySnapshotStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed base instant; tests express time as seconds after it
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// A complex with notifications on and one channel
pub fn complex(key: &str) -> Complex {
    Complex::new(key, format!("Complex {}", key)).with_channels(vec![100])
}

/// A sink that records every notification handed to it
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) {
        self.received.lock().unwrap().push(notification);
    }
}

/// A notifier that records `(text, channel)` pairs
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, i64)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, i64)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str, channel: i64) -> Result<()> {
        self.sent.lock().unwrap().push((text.to_string(), channel));
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// A store whose every call fails
pub struct FailingStore;

#[async_trait::async_trait]
impl SnapshotStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::state_store("store unavailable"))
    }

    async fn store(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::state_store("store unavailable"))
    }
}

/// A memory store that counts writes
#[derive(Default)]
pub struct CountingStore {
    inner: MemorySnapshotStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.store(key, value).await
    }
}
