//! Local persistence of SDK state.
//!
//! State lives in named slots, each holding one JSON document that is
//! overwritten as a whole. Loading never fails: a missing, unreadable or
//! malformed slot reads as absent.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Named slot for one piece of persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Queue,
    User,
    Values,
    Device,
}

impl Slot {
    fn name(self) -> &'static str {
        match self {
            Slot::Queue => "queue",
            Slot::User => "user",
            Slot::Values => "values",
            Slot::Device => "device",
        }
    }
}

/// Key-value backend for persisted state.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a key. `Ok(None)` when it was never written.
    async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Overwrite a key.
    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Stores each key as a file under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Temp file synced to disk, then renamed over the old one. A crash or
    /// power loss leaves either the old content or the new.
    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let final_path = self.dir.join(key);
        let temp_path = self.dir.join(format!("{}.tmp", key));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &final_path).await
    }
}

/// Files under the platform's local data directory. Falls back to memory,
/// with a warning, on platforms that have none.
pub(crate) fn default_storage() -> Arc<dyn Storage> {
    storage_under(dirs::data_local_dir())
}

fn storage_under(data_dir: Option<PathBuf>) -> Arc<dyn Storage> {
    match data_dir {
        Some(dir) => {
            let dir = dir.join("liquid");
            debug!(dir = %dir.display(), "using default storage directory");
            Arc::new(FileStorage::new(dir))
        }
        None => {
            warn!("no local data directory, pending requests will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    }
}

/// Keeps everything in memory. Useful for tests and ephemeral hosts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Typed access to slots, scoped to one API token.
#[derive(Clone)]
pub(crate) struct SnapshotStore {
    backend: Arc<dyn Storage>,
    scope: String,
}

impl SnapshotStore {
    pub(crate) fn new(backend: Arc<dyn Storage>, api_token: &str) -> Self {
        let scope = api_token
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Self { backend, scope }
    }

    fn key(&self, slot: Slot) -> String {
        format!("{}.{}.json", self.scope, slot.name())
    }

    /// Load a slot. Absent and corrupt slots both yield `None`.
    pub(crate) async fn load<T: DeserializeOwned>(&self, slot: Slot) -> Option<T> {
        let key = self.key(slot);
        let bytes = match self.backend.read(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(slot = ?slot, "nothing persisted");
                return None;
            }
            Err(e) => {
                warn!(slot = ?slot, error = %e, "could not read persisted state");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(slot = ?slot, error = %e, "discarding malformed persisted state");
                None
            }
        }
    }

    /// Overwrite a slot. Failures are logged; the in-memory state stays authoritative.
    pub(crate) async fn save<T: Serialize + ?Sized>(&self, slot: Slot, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(slot = ?slot, error = %e, "could not serialize state");
                return;
            }
        };
        if let Err(e) = self.backend.write(&self.key(slot), &bytes).await {
            warn!(slot = ?slot, error = %e, "could not persist state");
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
