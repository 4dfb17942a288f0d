// # File Snapshot Store
//
// File-based implementation of SnapshotStore with crash recovery.
//
// ## Purpose
//
// Keeps registry snapshots across daemon restarts and crashes. Each key is
// stored in its own file under a state directory.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Each file is a small JSON envelope, validated on read
// - Automatic backup: Keeps .backup of the previous value
// - Recovery: Falls back to backup if the main file cannot be parsed
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "key": "devices",
//   "stored_at": "2025-01-09T12:00:00Z",
//   "value": "[{\"id\":\"aa:bb:cc\", ...}]"
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::snapshot_store::SnapshotStore;

/// Envelope format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based snapshot store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use presence_core::{FileSnapshotStore, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::new("/var/lib/presence").await?;
///
///     store.store("devices", "[]").await?;
///     assert_eq!(store.get("devices").await?, Some("[]".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    /// Serializes writers so temp files are never shared
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    key: String,
    stored_at: chrono::DateTime<chrono::Utc>,
    value: String,
}

impl FileSnapshotStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Read a key, falling back to its backup if the main file is corrupted
    async fn load_with_recovery(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.key_path(key)?;

        match Self::load(&path).await {
            Ok(value) => Ok(value),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "State file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(&path);
                match Self::load(&backup_path).await {
                    Ok(Some(value)) => {
                        tracing::info!("Recovered {} from backup", key);
                        Ok(Some(value))
                    }
                    Ok(None) => Err(Error::snapshot(format!(
                        "State file {} is corrupted and no backup exists",
                        path.display()
                    ))),
                    Err(backup_err) => Err(Error::snapshot(format!(
                        "State file {} and its backup are both unreadable: {}",
                        path.display(),
                        backup_err
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Option<String>, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!("Failed to read state file {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(Some(state_file.value))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            key: key.to_string(),
            stored_at: chrono::Utc::now(),
            value: value.to_string(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = Self::temp_path(&path);
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous value as backup
        if path.exists() {
            let backup_path = Self::backup_path(&path);
            if let Err(e) = fs::copy(&path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", path.display());
        Ok(())
    }

    /// Map a key to its file, rejecting keys that would escape the directory
    fn key_path(&self, key: &str) -> Result<PathBuf, Error> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if !valid {
            return Err(Error::state_store(format!("Invalid snapshot key: {:?}", key)));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.load_with_recovery(key).await
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), Error> {
        self.write(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).await.unwrap();

        assert_eq!(store.get("devices").await.unwrap(), None);

        store.store("devices", "[\"a\"]").await.unwrap();
        assert!(dir.path().join("devices.json").exists());

        // Load new instance and verify persistence
        let store2 = FileSnapshotStore::new(dir.path()).await.unwrap();
        assert_eq!(
            store2.get("devices").await.unwrap(),
            Some("[\"a\"]".to_string())
        );
    }

    #[tokio::test]
    async fn test_file_store_keys_are_independent() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).await.unwrap();

        store.store("devices", "heartbeat").await.unwrap();
        store.store("backup_online_devices", "push").await.unwrap();

        assert_eq!(store.get("devices").await.unwrap(), Some("heartbeat".to_string()));
        assert_eq!(
            store.get("backup_online_devices").await.unwrap(),
            Some("push".to_string())
        );
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).await.unwrap();

        store.store("devices", "first").await.unwrap();
        store.store("devices", "second").await.unwrap();

        let path = dir.path().join("devices.json");
        assert!(FileSnapshotStore::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        // Backup holds the value before the last write
        assert_eq!(store.get("devices").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_file_store_corruption_without_backup_is_error() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).await.unwrap();

        fs::write(dir.path().join("devices.json"), b"{not json").await.unwrap();

        let result = store.get("devices").await;
        assert!(matches!(result, Err(Error::Snapshot(_))));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).await.unwrap();

        assert!(store.store("../escape", "x").await.is_err());
        assert!(store.store("", "x").await.is_err());
        assert!(store.get("a/b").await.is_err());
    }
}
