//! Storage service for mailbox data: payloads addressed to one recipient,
//! added by the sender and removed by the receiver on pickup.

use crate::data::MailboxPayload;
use crate::error::StorageError;
use crate::meta_data::{now_millis, MetaData};
use crate::persistence::{Persistence, PersistedStore};
use crate::requests::{AddMailboxDataRequest, MailboxDataRequest, RemoveMailboxDataRequest};
use crate::result::{RemoveResult, StoreResult};
use crate::store::DataStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observer of accepted mutations on one mailbox store.
pub trait MailboxStoreListener: Send + Sync {
    /// A mailbox entry was accepted.
    fn on_added(&self, _payload: &MailboxPayload) {}
    /// A mailbox entry was picked up or deleted by its receiver.
    fn on_removed(&self, _payload: &MailboxPayload) {}
}

/// One mailbox store. Adds are validated against the sender key carried in
/// the payload; removes must come from the receiver the payload committed to
/// via the receiver key hash.
pub struct MailboxStorageService {
    meta_data: MetaData,
    persisted: Arc<PersistedStore<MailboxDataRequest>>,
    listeners: RwLock<Vec<Arc<dyn MailboxStoreListener>>>,
}

impl MailboxStorageService {
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
    pub fn store(&self) -> &DataStore<MailboxDataRequest> {
        self.persisted.store()
    }

    /// Load persisted state; no-op after the first call.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        self.persisted.ensure_hydrated().await
    }

    pub fn add_listener(&self, listener: Arc<dyn MailboxStoreListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MailboxStoreListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Apply an add request signed by the sender.
    pub fn add(&self, request: AddMailboxDataRequest) -> StoreResult {
        let hash = request.hash();
        let payload = request.payload().clone();
        let result = self.persisted.store().with_write(|map| {
            if map.len() >= self.meta_data.max_map_size() && !map.contains_key(&hash) {
                return StoreResult::MaxMapSizeReached;
            }
            match map.get(&hash) {
                Some(MailboxDataRequest::Add(stored)) if *stored == request => {
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
            map.insert(hash, MailboxDataRequest::Add(request));
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

    /// Apply a remove signed by the receiver. The remover's key must hash to
    /// the receiver commitment inside the stored payload.
    pub fn remove(&self, request: RemoveMailboxDataRequest) -> RemoveResult<MailboxPayload> {
        let hash = request.hash();
        let (result, mutated) = self.persisted.store().with_write(|map| {
            match map.get(&hash) {
                None => {
                    debug!(%hash, "remove for unknown mailbox entry, storing tombstone");
                    map.insert(hash, MailboxDataRequest::Remove(request));
                    (RemoveResult::of(StoreResult::NoEntry), true)
                }
                Some(MailboxDataRequest::Remove(stored)) => {
                    let newer = request.sequence_number() > stored.sequence_number();
                    if newer {
                        map.insert(hash, MailboxDataRequest::Remove(request));
                    }
                    (RemoveResult::of(StoreResult::AlreadyRemoved), newer)
                }
                Some(MailboxDataRequest::Add(stored)) => {
                    if request.sequence_number() < stored.sequence_number() {
                        return (RemoveResult::of(StoreResult::SequenceNumberOutdated), false);
                    }
                    if request.is_receiver_invalid(stored.payload().receiver_key_hash()) {
                        return (RemoveResult::of(StoreResult::PublicKeyInvalid), false);
                    }
                    if request.is_signature_invalid() {
                        return (RemoveResult::of(StoreResult::SignatureInvalid), false);
                    }
                    let removed = stored.payload().clone();
                    map.insert(hash, MailboxDataRequest::Remove(request));
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

    /// Highest accepted sequence number for a lineage, 0 if unseen.
    pub fn sequence_number(&self, hash: &crate::hash::ContentHash) -> u64 {
        self.persisted
            .store()
            .with_read(|map| map.get(hash).map(MailboxDataRequest::sequence_number))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::receiver_key_hash;
    use crate::persistence::MemoryPersistence;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn test_meta() -> MetaData {
        MetaData::new("mailbox", Some(Duration::from_secs(864_000)), 4096)
    }

    fn create_test_service() -> MailboxStorageService {
        MailboxStorageService::new(
            test_meta(),
            "mailbox/mailbox",
            Arc::new(MemoryPersistence::new()),
            Duration::from_millis(5),
        )
    }

    fn signed_add(
        sender: &SigningKey,
        receiver: &SigningKey,
        data: &[u8],
        seq: u64,
    ) -> AddMailboxDataRequest {
        let payload = MailboxPayload::new(
            data.to_vec(),
            test_meta(),
            sender.verifying_key(),
            receiver_key_hash(&receiver.verifying_key()),
        );
        AddMailboxDataRequest::sign(payload, seq, now_millis(), sender)
    }

    #[tokio::test]
    async fn test_receiver_can_pick_up_message() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);

        let add = signed_add(&sender, &receiver, b"hello", 1);
        let hash = add.hash();
        assert_eq!(service.add(add), StoreResult::Success);

        let remove =
            RemoveMailboxDataRequest::sign(hash, 1, now_millis(), test_meta(), &receiver);
        let result = service.remove(remove);
        assert_eq!(result.outcome, StoreResult::Success);
        assert_eq!(result.removed.unwrap().data(), b"hello");
        assert!(matches!(
            service.store().get(&hash),
            Some(MailboxDataRequest::Remove(_))
        ));
    }

    #[tokio::test]
    async fn test_only_committed_receiver_may_remove() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);
        let imposter = SigningKey::generate(&mut OsRng);

        let add = signed_add(&sender, &receiver, b"hello", 1);
        let hash = add.hash();
        assert_eq!(service.add(add), StoreResult::Success);

        let remove =
            RemoveMailboxDataRequest::sign(hash, 2, now_millis(), test_meta(), &imposter);
        assert_eq!(service.remove(remove).outcome, StoreResult::PublicKeyInvalid);
        assert!(matches!(
            service.store().get(&hash),
            Some(MailboxDataRequest::Add(_))
        ));
    }

    #[tokio::test]
    async fn test_sender_key_must_sign_add() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);
        let forger = SigningKey::generate(&mut OsRng);

        let payload = MailboxPayload::new(
            b"hello".to_vec(),
            test_meta(),
            sender.verifying_key(),
            receiver_key_hash(&receiver.verifying_key()),
        );
        let request = AddMailboxDataRequest::sign(payload, 1, now_millis(), &forger);
        assert_eq!(service.add(request), StoreResult::SignatureInvalid);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);
        let request = signed_add(&sender, &receiver, b"hello", 1);

        assert_eq!(service.add(request.clone()), StoreResult::Success);
        assert_eq!(service.add(request), StoreResult::RequestAlreadyReceived);
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_before_add_leaves_tombstone() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);

        // Pickup raced ahead of the gossip add.
        let add = signed_add(&sender, &receiver, b"hello", 1);
        let hash = add.hash();
        let remove =
            RemoveMailboxDataRequest::sign(hash, 1, now_millis(), test_meta(), &receiver);
        assert_eq!(service.remove(remove).outcome, StoreResult::NoEntry);

        // The late add must lose against the tombstone.
        assert_eq!(service.add(add), StoreResult::SequenceNumberOutdated);
    }

    #[tokio::test]
    async fn test_repeated_remove_reports_already_removed() {
        let service = create_test_service();
        let sender = SigningKey::generate(&mut OsRng);
        let receiver = SigningKey::generate(&mut OsRng);
        let add = signed_add(&sender, &receiver, b"hello", 1);
        let hash = add.hash();
        assert_eq!(service.add(add), StoreResult::Success);

        let remove =
            RemoveMailboxDataRequest::sign(hash, 1, now_millis(), test_meta(), &receiver);
        assert_eq!(service.remove(remove.clone()).outcome, StoreResult::Success);
        let result = service.remove(remove);
        assert_eq!(result.outcome, StoreResult::AlreadyRemoved);
        assert!(result.removed.is_none());
    }
}
