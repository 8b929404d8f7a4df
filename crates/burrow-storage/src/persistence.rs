//! Persistence binding: async snapshot blobs plus the debounced flusher that
//! rate-limits writes under gossip storms.

use crate::error::StorageError;
use crate::hash::ContentHash;
use crate::store::DataStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Async key-value blob store; stores are keyed by their registry store id.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Read the last persisted snapshot, `None` if nothing was written yet.
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the persisted snapshot.
    async fn write(&self, store_id: &str, blob: &[u8]) -> Result<(), StorageError>;
}

/// File-backed persistence: one `<store_id>.bin` per store under a base
/// directory, written via a temp file and atomic rename so a crash never
/// leaves a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    base_dir: PathBuf,
}

impl FilePersistence {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, store_id: &str) -> PathBuf {
        self.base_dir.join(format!("{store_id}.bin"))
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path_for(store_id)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, store_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(store_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// In-memory persistence for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    blobs: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stores that have written a snapshot.
    pub fn store_count(&self) -> usize {
        self.blobs.lock().len()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn read(&self, store_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.lock().get(store_id).cloned())
    }

    async fn write(&self, store_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.blobs.lock().insert(store_id.to_string(), blob.to_vec());
        Ok(())
    }
}

/// A content store bound to its persistence slot.
///
/// Mutations call [`PersistedStore::mark_dirty`]; a background flusher
/// debounces and writes the latest snapshot, so a gossip storm costs one
/// write per debounce window instead of one per request. Hydration from the
/// persisted snapshot happens exactly once, even under concurrent first use.
pub struct PersistedStore<T> {
    store: DataStore<T>,
    store_id: String,
    persistence: Arc<dyn Persistence>,
    debounce: Duration,
    dirty: AtomicBool,
    notify: Notify,
    hydrated: tokio::sync::OnceCell<()>,
    flush_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<T> PersistedStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(store_id: impl Into<String>, persistence: Arc<dyn Persistence>, debounce: Duration) -> Arc<Self> {
        let this = Arc::new(Self {
            store: DataStore::new(),
            store_id: store_id.into(),
            persistence,
            debounce,
            dirty: AtomicBool::new(false),
            notify: Notify::new(),
            hydrated: tokio::sync::OnceCell::new(),
            flush_task: parking_lot::Mutex::new(None),
        });
        this.spawn_flusher();
        this
    }

    /// The underlying content store.
    pub fn store(&self) -> &DataStore<T> {
        &self.store
    }

    /// Registry store id, also the persistence key.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Load the persisted snapshot if present. Concurrent callers await the
    /// same load; later callers return immediately.
    pub async fn ensure_hydrated(&self) -> Result<(), StorageError> {
        self.hydrated
            .get_or_try_init(|| async {
                match self.persistence.read(&self.store_id).await? {
                    Some(blob) => {
                        let snapshot: HashMap<ContentHash, T> = bincode::deserialize(&blob)?;
                        debug!(store_id = %self.store_id, entries = snapshot.len(), "hydrated store");
                        self.store.replace(snapshot);
                    }
                    None => debug!(store_id = %self.store_id, "no persisted snapshot"),
                }
                Ok(())
            })
            .await
            .copied()
    }

    /// Note a mutation and nudge the flusher.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Write the current snapshot immediately, clearing the dirty flag.
    pub async fn flush_now(&self) -> Result<(), StorageError> {
        self.dirty.store(false, Ordering::Release);
        let blob = bincode::serialize(&self.store.snapshot())?;
        self.persistence.write(&self.store_id, &blob).await
    }

    /// Stop the flusher and write a final snapshot if one is pending.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
        if self.dirty.load(Ordering::Acquire) {
            self.flush_now().await?;
        }
        Ok(())
    }

    fn spawn_flusher(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                this.notify.notified().await;
                tokio::time::sleep(this.debounce).await;
                if this.dirty.swap(false, Ordering::AcqRel) {
                    let blob = match bincode::serialize(&this.store.snapshot()) {
                        Ok(blob) => blob,
                        Err(err) => {
                            warn!(store_id = %this.store_id, %err, "snapshot encode failed");
                            continue;
                        }
                    };
                    if let Err(err) = this.persistence.write(&this.store_id, &blob).await {
                        warn!(store_id = %this.store_id, %err, "snapshot write failed");
                        // Leave dirty so the next nudge retries.
                        this.dirty.store(true, Ordering::Release);
                    }
                }
            }
        });
        *self.flush_task.lock() = Some(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path());
        assert_eq!(persistence.read("authenticated/offers").await.unwrap(), None);
        persistence.write("authenticated/offers", b"snapshot").await.unwrap();
        assert_eq!(
            persistence.read("authenticated/offers").await.unwrap(),
            Some(b"snapshot".to_vec())
        );
        // No temp file left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path().join("authenticated"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("offers.bin")]);
    }

    #[tokio::test]
    async fn test_persisted_store_hydrates_once() {
        let persistence = Arc::new(MemoryPersistence::new());
        let mut snapshot = HashMap::new();
        snapshot.insert(ContentHash::from_bytes([1; 32]), 41u32);
        persistence
            .write("counters", &bincode::serialize(&snapshot).unwrap())
            .await
            .unwrap();

        let store: Arc<PersistedStore<u32>> =
            PersistedStore::new("counters", persistence.clone(), Duration::from_millis(5));
        store.ensure_hydrated().await.unwrap();
        assert_eq!(store.store().get(&ContentHash::from_bytes([1; 32])), Some(41));

        // A second hydration must not clobber in-memory changes.
        store.store().with_write(|map| map.insert(ContentHash::from_bytes([1; 32]), 42));
        store.ensure_hydrated().await.unwrap();
        assert_eq!(store.store().get(&ContentHash::from_bytes([1; 32])), Some(42));
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flusher_writes_after_debounce() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store: Arc<PersistedStore<u32>> =
            PersistedStore::new("flushed", persistence.clone(), Duration::from_millis(5));
        store.store().with_write(|map| map.insert(ContentHash::from_bytes([7; 32]), 7));
        store.mark_dirty();

        let mut written = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if persistence.read("flushed").await.unwrap().is_some() {
                written = true;
                break;
            }
        }
        assert!(written, "flusher never persisted the snapshot");
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_state() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store: Arc<PersistedStore<u32>> =
            PersistedStore::new("pending", persistence.clone(), Duration::from_secs(3600));
        store.store().with_write(|map| map.insert(ContentHash::from_bytes([9; 32]), 9));
        store.mark_dirty();
        // Debounce is far away; shutdown must still write the snapshot.
        store.shutdown().await.unwrap();
        let blob = persistence.read("pending").await.unwrap().unwrap();
        let snapshot: HashMap<ContentHash, u32> = bincode::deserialize(&blob).unwrap();
        assert_eq!(snapshot.get(&ContentHash::from_bytes([9; 32])), Some(&9));
    }
}
