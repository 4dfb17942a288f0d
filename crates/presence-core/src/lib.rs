// # presence-core
//
// Core library for the device presence monitor.
//
// ## Architecture Overview
//
// Devices report over one of two paths and each path has its own registry:
// - **HeartbeatRegistry**: periodic reports; offline is inferred from silence
// - **PushRegistry**: reports carry the plug state; nothing is inferred
// - **NotificationDispatcher**: bounded queue with one sequential sender
// - **ScheduleIndex**: weekly availability table used in status text
// - **SnapshotStore**: key/string persistence for registry snapshots
// - **PresenceService**: startup and shutdown ordering, status routing
//
// ## Design Principles
//
// 1. **Transitions only**: a notification is produced only when a device
//    changes between online and offline
// 2. **Latched state**: each device carries a `down_notified`/`up_notified`
//    pair so repeated sweeps and reports stay silent
// 3. **Capabilities at the seams**: registries see a `NotificationSink` and a
//    `SnapshotStore`, never concrete clients
// 4. **Library-First**: the daemon only wires these pieces together

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod registry;
pub mod schedule;
pub mod service;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{DispatcherConfig, MonitorConfig};
pub use dispatcher::{DispatchWorker, DispatcherHandle, NotificationDispatcher};
pub use error::{Error, Result};
pub use model::{Complex, ComplexInfo, Device, DeviceInfo, DeviceReport, Notification};
pub use registry::{HeartbeatRegistry, IngestOutcome, PushRegistry};
pub use schedule::{ScheduleGroup, ScheduleIndex};
pub use service::PresenceService;
pub use state::{FileSnapshotStore, MemorySnapshotStore};
pub use traits::{NotificationSink, Notifier, SnapshotStore};
