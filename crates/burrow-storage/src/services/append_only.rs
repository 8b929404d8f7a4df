//! Storage service for append-only data: immutable, content-addressed,
//! no sequence numbers and no removal path.

use crate::data::Payload;
use crate::error::StorageError;
use crate::meta_data::MetaData;
use crate::persistence::{Persistence, PersistedStore};
use crate::requests::AddAppendOnlyDataRequest;
use crate::result::StoreResult;
use crate::store::DataStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Observer of accepted appends on one append-only store.
pub trait AppendOnlyStoreListener: Send + Sync {
    /// A new payload was appended.
    fn on_appended(&self, _payload: &Payload) {}
}

/// One append-only store: the hash is the identity, the first sighting wins
/// and later adds of the same payload are reported as already stored.
pub struct AppendOnlyStorageService {
    meta_data: MetaData,
    persisted: Arc<PersistedStore<AddAppendOnlyDataRequest>>,
    listeners: RwLock<Vec<Arc<dyn AppendOnlyStoreListener>>>,
}

impl AppendOnlyStorageService {
    pub fn new(
        meta_data: MetaData,
        store_id: impl Into<String>,
        persistence: Arc<dyn Persistence>,
        flush_debounce: Duration,
    ) -> Self {
        Self {
            meta_data,
            persisted: PersistedStore::new(store_id, persistence, flush_debounce),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Storage policy of the payload class this service handles.
    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    /// The underlying content store, for reconciliation reads.
    pub fn store(&self) -> &DataStore<AddAppendOnlyDataRequest> {
        self.persisted.store()
    }

    /// Load persisted state; no-op after the first call.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        self.persisted.ensure_hydrated().await
    }

    pub fn add_listener(&self, listener: Arc<dyn AppendOnlyStoreListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AppendOnlyStoreListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Append a payload; the hash is checked before the size cap so that
    /// re-gossip of known entries stays a non-severe outcome on a full store.
    pub fn add(&self, request: AddAppendOnlyDataRequest) -> StoreResult {
        let hash = request.hash();
        let payload = request.payload().clone();
        let result = self.persisted.store().with_write(|map| {
            if map.contains_key(&hash) {
                return StoreResult::PayloadAlreadyStored;
            }
            if map.len() >= self.meta_data.max_map_size() {
                return StoreResult::MaxMapSizeReached;
            }
            if request.payload().is_oversized() {
                return StoreResult::DataInvalid;
            }
            map.insert(hash, request);
            StoreResult::Success
        });
        if result.is_success() {
            self.persisted.mark_dirty();
            for listener in self.listeners.read().iter() {
                listener.on_appended(&payload);
            }
        }
        result
    }

    /// Write the current snapshot immediately.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.persisted.flush_now().await
    }

    /// Stop the flusher, writing a final snapshot if one is pending.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.persisted.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    fn test_meta() -> MetaData {
        MetaData::new("witness", None, 1024)
    }

    fn create_test_service() -> AppendOnlyStorageService {
        AppendOnlyStorageService::new(
            test_meta(),
            "append/witness",
            Arc::new(MemoryPersistence::new()),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_first_sighting_wins() {
        let service = create_test_service();
        let request = AddAppendOnlyDataRequest::new(Payload::new(b"w1".to_vec(), test_meta()));
        let hash = request.hash();

        assert_eq!(service.add(request.clone()), StoreResult::Success);
        assert_eq!(service.add(request), StoreResult::PayloadAlreadyStored);
        assert!(service.store().contains(&hash));
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_payloads_accumulate() {
        let service = create_test_service();
        for i in 0..4u8 {
            let request =
                AddAppendOnlyDataRequest::new(Payload::new(vec![i], test_meta()));
            assert_eq!(service.add(request), StoreResult::Success);
        }
        assert_eq!(service.store().len(), 4);
    }

    #[tokio::test]
    async fn test_known_payload_beats_full_store() {
        let service = AppendOnlyStorageService::new(
            test_meta().with_max_map_size(1),
            "append/capped",
            Arc::new(MemoryPersistence::new()),
            Duration::from_millis(5),
        );
        let first = AddAppendOnlyDataRequest::new(Payload::new(b"a".to_vec(), test_meta()));
        assert_eq!(service.add(first.clone()), StoreResult::Success);

        let second = AddAppendOnlyDataRequest::new(Payload::new(b"b".to_vec(), test_meta()));
        assert_eq!(service.add(second), StoreResult::MaxMapSizeReached);
        // Re-gossip of the stored entry is still the idempotent outcome.
        assert_eq!(service.add(first), StoreResult::PayloadAlreadyStored);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let service = create_test_service();
        let request =
            AddAppendOnlyDataRequest::new(Payload::new(vec![0u8; 2048], test_meta()));
        assert_eq!(service.add(request), StoreResult::DataInvalid);
    }
}
