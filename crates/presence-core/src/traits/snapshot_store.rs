// # Snapshot Store Trait
//
// Defines the key/string persistence contract used by both registries.
//
// ## Purpose
//
// Registries serialize their whole device set into one string and hand it
// to the store under a fixed key. On startup the same key is read back and
// applied wholesale. The store never interprets the payload.
//
// ## Implementations
//
// - `MemorySnapshotStore`: process-local, for tests and ephemeral runs
// - `FileSnapshotStore`: one JSON file per key with backup recovery
//
// ## Usage
//
// ```rust
// use presence_core::{MemorySnapshotStore, SnapshotStore};
//
// #[tokio::main]
// async fn main() -> presence_core::Result<()> {
//     let store = MemorySnapshotStore::new();
//
//     store.store("devices", "[]").await?;
//     assert_eq!(store.get("devices").await?, Some("[]".to_string()));
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for snapshot store implementations
///
/// # Guarantees
///
/// A call either completes or returns an explicit error. Implementations
/// must never report success for a write that was not retained.
///
/// Connection health, retries and reconnection belong to the implementation;
/// registries call each method once and log the outcome.
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The stored value (possibly empty)
    /// - `Ok(None)`: Nothing stored under this key
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Replace the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The value is retained
    /// - `Err(Error)`: Storage error; the previous value is left in place
    async fn store(&self, key: &str, value: &str) -> Result<(), crate::Error>;
}
