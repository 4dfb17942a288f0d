//! Core traits for the presence monitor
//!
//! This module defines the abstract interfaces the registries depend on.
//!
//! - [`SnapshotStore`]: Key/string persistence for registry snapshots
//! - [`Notifier`]: External send capability
//! - [`NotificationSink`]: Hand-off point for detected transitions

pub mod notifier;
pub mod snapshot_store;

pub use notifier::{NotificationSink, Notifier};
pub use snapshot_store::SnapshotStore;
