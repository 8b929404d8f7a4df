//! Storage service for authenticated (mutable-by-replacement) data.

use crate::data::AuthenticatedPayload;
use crate::error::StorageError;
use crate::meta_data::{now_millis, MetaData};
use crate::persistence::{Persistence, PersistedStore};
use crate::requests::{
    AddAuthenticatedDataRequest, AuthenticatedDataRequest, RefreshAuthenticatedDataRequest,
    RemoveAuthenticatedDataRequest,
};
use crate::result::{RemoveResult, StoreResult};
use crate::store::DataStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observer of accepted mutations on one authenticated store.
pub trait AuthenticatedStoreListener: Send + Sync {
    /// A new or replacing add was accepted.
    fn on_added(&self, _payload: &AuthenticatedPayload) {}
    /// An entry was removed; its tombstone is now stored.
    fn on_removed(&self, _payload: &AuthenticatedPayload) {}
    /// An entry's ttl window was restarted by its owner.
    fn on_refreshed(&self, _payload: &AuthenticatedPayload) {}
}

/// One authenticated store: lineage of each payload is tracked by content
/// hash, ordered by owner-signed sequence numbers, with remove tombstones
/// keeping the lineage's latest sequence number visible after deletion.
pub struct AuthenticatedStorageService {
    meta_data: MetaData,
    persisted: Arc<PersistedStore<AuthenticatedDataRequest>>,
    listeners: RwLock<Vec<Arc<dyn AuthenticatedStoreListener>>>,
}

impl AuthenticatedStorageService {
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
    pub fn store(&self) -> &DataStore<AuthenticatedDataRequest> {
        self.persisted.store()
    }

    /// Load persisted state; no-op after the first call.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        self.persisted.ensure_hydrated().await
    }

    pub fn add_listener(&self, listener: Arc<dyn AuthenticatedStoreListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AuthenticatedStoreListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Apply an add request. The first sighting of a hash is inserted after
    /// validation; a later add replaces the entry only when its sequence
    /// number is strictly higher than the stored one (add or tombstone).
    pub fn add(&self, request: AddAuthenticatedDataRequest) -> StoreResult {
        let hash = request.hash();
        let payload = request.payload().clone();
        let result = self.persisted.store().with_write(|map| {
            if map.len() >= self.meta_data.max_map_size()
                && !map.contains_key(&hash)
            {
                return StoreResult::MaxMapSizeReached;
            }
            match map.get(&hash) {
                Some(AuthenticatedDataRequest::Add(stored)) if *stored == request => {
                    return StoreResult::RequestAlreadyReceived;
                }
                Some(stored) if request.sequence_number() <= stored.sequence_number() => {
                    return StoreResult::SequenceNumberOutdated;
                }
                _ => {}
            }
            if request.is_expired(now_millis()) {
                return StoreResult::Expired;
            }
            if request.payload().is_oversized() {
                return StoreResult::DataInvalid;
            }
            if request.is_signature_invalid() {
                return StoreResult::SignatureInvalid;
            }
            map.insert(hash, AuthenticatedDataRequest::Add(request));
            StoreResult::Success
        });
        if result.is_success() {
            self.persisted.mark_dirty();
            for listener in self.listeners.read().iter() {
                listener.on_added(&payload);
            }
        }
        result
    }

    /// Apply a remove request. When the hash is unknown the tombstone is
    /// stored anyway so the lineage's sequence number stays tracked, and the
    /// non-severe [`StoreResult::NoEntry`] tells the caller not to relay.
    pub fn remove(
        &self,
        request: RemoveAuthenticatedDataRequest,
    ) -> RemoveResult<AuthenticatedPayload> {
        let hash = request.hash();
        let (result, mutated) = self.persisted.store().with_write(|map| {
            match map.get(&hash) {
                None => {
                    debug!(%hash, "remove for unknown entry, storing tombstone");
                    map.insert(hash, AuthenticatedDataRequest::Remove(request));
                    (RemoveResult::of(StoreResult::NoEntry), true)
                }
                Some(AuthenticatedDataRequest::Remove(stored)) => {
                    // Keep the newest tombstone, the verdict stays the same.
                    let newer = request.sequence_number() > stored.sequence_number();
                    if newer {
                        map.insert(hash, AuthenticatedDataRequest::Remove(request));
                    }
                    (RemoveResult::of(StoreResult::AlreadyRemoved), newer)
                }
                Some(AuthenticatedDataRequest::Add(stored)) => {
                    // Unlike adds, a remove at the same sequence number is legal.
                    if request.sequence_number() < stored.sequence_number() {
                        return (RemoveResult::of(StoreResult::SequenceNumberOutdated), false);
                    }
                    if request.owner_key() != stored.payload().owner_key() {
                        return (RemoveResult::of(StoreResult::PublicKeyInvalid), false);
                    }
                    if request.is_signature_invalid() {
                        return (RemoveResult::of(StoreResult::SignatureInvalid), false);
                    }
                    let removed = stored.payload().clone();
                    map.insert(hash, AuthenticatedDataRequest::Remove(request));
                    (RemoveResult::removed(removed), true)
                }
            }
        });
        if mutated {
            self.persisted.mark_dirty();
        }
        if let Some(payload) = &result.removed {
            for listener in self.listeners.read().iter() {
                listener.on_removed(payload);
            }
        }
        result
    }

    /// Apply a refresh: restart the stored add's ttl window under a new
    /// sequence number without re-sending the payload. The stored add is
    /// re-wrapped with the refresh's sequence number, signature and a fresh
    /// timestamp, so the updated entry verifies when gossiped onward.
    pub fn refresh(&self, request: RefreshAuthenticatedDataRequest) -> StoreResult {
        let hash = request.hash();
        let mut refreshed = None;
        let result = self.persisted.store().with_write(|map| {
            match map.get(&hash) {
                None => StoreResult::NoEntry,
                Some(AuthenticatedDataRequest::Remove(_)) => StoreResult::AlreadyRemoved,
                Some(AuthenticatedDataRequest::Add(stored)) => {
                    if request.sequence_number() <= stored.sequence_number() {
                        return StoreResult::SequenceNumberOutdated;
                    }
                    if request.owner_key() != stored.payload().owner_key() {
                        return StoreResult::PublicKeyInvalid;
                    }
                    if request.is_signature_invalid() {
                        return StoreResult::SignatureInvalid;
                    }
                    let updated = stored.refreshed(&request, now_millis());
                    refreshed = Some(updated.payload().clone());
                    map.insert(hash, AuthenticatedDataRequest::Add(updated));
                    StoreResult::Success
                }
            }
        });
        if result.is_success() {
            self.persisted.mark_dirty();
            if let Some(payload) = &refreshed {
                for listener in self.listeners.read().iter() {
                    listener.on_refreshed(payload);
                }
            }
        }
        result
    }

    /// Highest accepted sequence number for a lineage, 0 if unseen.
    pub fn sequence_number(&self, hash: &crate::hash::ContentHash) -> u64 {
        self.persisted
            .store()
            .with_read(|map| map.get(hash).map(AuthenticatedDataRequest::sequence_number))
            .unwrap_or(0)
    }

    /// Drop entries (adds and tombstones) past their ttl. Returns the number
    /// of pruned entries.
    pub fn prune_expired(&self) -> usize {
        let now = now_millis();
        let pruned = self
            .persisted
            .store()
            .remove_where(|_, request| request.is_expired(now));
        if !pruned.is_empty() {
            debug!(store_id = self.persisted.store_id(), count = pruned.len(), "pruned expired entries");
            self.persisted.mark_dirty();
        }
        pruned.len()
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
