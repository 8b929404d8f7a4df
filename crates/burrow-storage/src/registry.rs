//! The storage registry: owns every per-class store, routes add/remove/
//! refresh requests to them and answers reconciliation queries across them.

use crate::config::StorageConfig;
use crate::data::StorageData;
use crate::error::StorageError;
use crate::hash::ContentHash;
use crate::inventory::{build_inventory, DataFilter, FilterEntry, Inventory};
use crate::meta_data::MetaData;
use crate::persistence::Persistence;
use crate::requests::{
    AddDataRequest, DataRequest, RefreshAuthenticatedDataRequest, RemoveDataRequest,
};
use crate::result::StoreResult;
use crate::services::{
    AppendOnlyStorageService, AppendOnlyStoreListener, AuthenticatedStorageService,
    AuthenticatedStoreListener, MailboxStorageService, MailboxStoreListener,
};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The three store families the registry manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Authenticated,
    Mailbox,
    AppendOnly,
}

impl StoreKind {
    /// Directory prefix under which stores of this kind persist.
    pub fn store_name(self) -> &'static str {
        match self {
            StoreKind::Authenticated => "authenticated",
            StoreKind::Mailbox => "mailbox",
            StoreKind::AppendOnly => "append",
        }
    }
}

/// Which stores a reconciliation query runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Every store of every kind.
    All,
    /// Every store of one kind.
    Kind(StoreKind),
    /// The store with this key, whatever its kind.
    Named(String),
}

impl StoreScope {
    fn matches(&self, kind: StoreKind, store_key: &str) -> bool {
        match self {
            StoreScope::All => true,
            StoreScope::Kind(wanted) => *wanted == kind,
            StoreScope::Named(name) => name == store_key,
        }
    }
}

/// Observer of accepted mutations across all stores the registry owns.
pub trait StorageDataListener: Send + Sync {
    fn on_added(&self, _data: &StorageData) {}
    fn on_removed(&self, _data: &StorageData) {}
    fn on_refreshed(&self, _data: &StorageData) {}
}

type SharedListeners = Arc<parking_lot::RwLock<Vec<Arc<dyn StorageDataListener>>>>;

/// Routes gossiped data requests to the store they belong to, creating and
/// hydrating stores lazily on first use.
///
/// Dispatch returns the affected payload only when the store reported a
/// genuine success; replays, stale updates and tombstone bookkeeping return
/// `None` so the gossip layer does not relay them.
pub struct StorageRegistry {
    config: StorageConfig,
    persistence: Arc<dyn Persistence>,
    authenticated: parking_lot::RwLock<HashMap<String, Arc<AuthenticatedStorageService>>>,
    mailbox: parking_lot::RwLock<HashMap<String, Arc<MailboxStorageService>>>,
    append_only: parking_lot::RwLock<HashMap<String, Arc<AppendOnlyStorageService>>>,
    listeners: SharedListeners,
    prune_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StorageRegistry {
    pub fn new(config: StorageConfig, persistence: Arc<dyn Persistence>) -> Arc<Self> {
        Arc::new(Self {
            config,
            persistence,
            authenticated: parking_lot::RwLock::new(HashMap::new()),
            mailbox: parking_lot::RwLock::new(HashMap::new()),
            append_only: parking_lot::RwLock::new(HashMap::new()),
            listeners: Arc::new(parking_lot::RwLock::new(Vec::new())),
            prune_task: parking_lot::Mutex::new(None),
        })
    }

    /// Start the periodic expired-entry sweep.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = Duration::from_secs(self.config.prune_interval_secs);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let pruned = this.prune_expired();
                if pruned > 0 {
                    info!(pruned, "expired entries swept");
                }
            }
        });
        *self.prune_task.lock() = Some(task);
    }

    /// Stop the sweep and shut every store down, flushing pending snapshots.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        if let Some(task) = self.prune_task.lock().take() {
            task.abort();
        }
        // Clone the service lists out so no lock is held across the awaits.
        let authenticated: Vec<_> = self.authenticated.read().values().cloned().collect();
        let mailbox: Vec<_> = self.mailbox.read().values().cloned().collect();
        let append_only: Vec<_> = self.append_only.read().values().cloned().collect();
        try_join_all(authenticated.iter().map(|service| service.shutdown())).await?;
        try_join_all(mailbox.iter().map(|service| service.shutdown())).await?;
        try_join_all(append_only.iter().map(|service| service.shutdown())).await?;
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn StorageDataListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn StorageDataListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Route an add request to its store. Returns the added payload when the
    /// caller should relay it onward.
    pub async fn on_add_request(
        &self,
        request: AddDataRequest,
    ) -> Result<Option<StorageData>, StorageError> {
        match request {
            AddDataRequest::Authenticated(request) => {
                let service = self.get_or_create_authenticated(request.meta_data()).await?;
                let data = StorageData::Authenticated(request.payload().clone());
                let hash = request.hash();
                Ok(relayed(service.add(request), data, &hash))
            }
            AddDataRequest::Mailbox(request) => {
                let service = self.get_or_create_mailbox(request.meta_data()).await?;
                let data = StorageData::Mailbox(request.payload().clone());
                let hash = request.hash();
                Ok(relayed(service.add(request), data, &hash))
            }
            AddDataRequest::AppendOnly(request) => {
                let service = self.get_or_create_append_only(request.meta_data()).await?;
                let data = StorageData::AppendOnly(request.payload().clone());
                let hash = request.hash();
                Ok(relayed(service.add(request), data, &hash))
            }
        }
    }

    /// Route a remove request to its store. Returns the removed payload when
    /// the caller should relay the deletion onward.
    pub async fn on_remove_request(
        &self,
        request: RemoveDataRequest,
    ) -> Result<Option<StorageData>, StorageError> {
        match request {
            RemoveDataRequest::Authenticated(request) => {
                let service = self.get_or_create_authenticated(request.meta_data()).await?;
                let hash = request.hash();
                let result = service.remove(request);
                log_rejection(result.outcome, &hash);
                Ok(result.removed.map(StorageData::Authenticated))
            }
            RemoveDataRequest::Mailbox(request) => {
                let service = self.get_or_create_mailbox(request.meta_data()).await?;
                let hash = request.hash();
                let result = service.remove(request);
                log_rejection(result.outcome, &hash);
                Ok(result.removed.map(StorageData::Mailbox))
            }
        }
    }

    /// Route a refresh to its store. Returns `true` when the refresh was
    /// accepted and should be relayed onward.
    pub async fn on_refresh_request(
        &self,
        request: RefreshAuthenticatedDataRequest,
    ) -> Result<bool, StorageError> {
        let service = self.get_or_create_authenticated(request.meta_data()).await?;
        let hash = request.hash();
        let result = service.refresh(request);
        log_rejection(result, &hash);
        Ok(result.is_success())
    }

    /// Route one stored request received in an inventory response. Entries
    /// go through the same validation as live gossip.
    pub async fn on_data_request(
        &self,
        request: DataRequest,
    ) -> Result<Option<StorageData>, StorageError> {
        match request {
            DataRequest::AddAuthenticated(request) => {
                self.on_add_request(AddDataRequest::Authenticated(request)).await
            }
            DataRequest::RemoveAuthenticated(request) => {
                self.on_remove_request(RemoveDataRequest::Authenticated(request)).await
            }
            DataRequest::AddMailbox(request) => {
                self.on_add_request(AddDataRequest::Mailbox(request)).await
            }
            DataRequest::RemoveMailbox(request) => {
                self.on_remove_request(RemoveDataRequest::Mailbox(request)).await
            }
            DataRequest::AddAppendOnly(request) => {
                self.on_add_request(AddDataRequest::AppendOnly(request)).await
            }
        }
    }

    /// Answer a peer's reconciliation request: every stored request in scope
    /// the filter does not dominate, capped per the inventory config.
    pub fn inventory(&self, filter: &DataFilter, scope: &StoreScope) -> Inventory {
        build_inventory(self.data_requests(scope), filter, &self.config.inventory)
    }

    /// Summarize local holdings in scope for sending as a filter to a peer.
    pub fn filter_entries(&self, scope: &StoreScope) -> Vec<FilterEntry> {
        let mut entries = Vec::new();
        for (key, service) in self.authenticated.read().iter() {
            if scope.matches(StoreKind::Authenticated, key) {
                entries.extend(service.store().with_read(|map| {
                    map.iter()
                        .map(|(hash, request)| FilterEntry::new(*hash, request.sequence_number()))
                        .collect::<Vec<_>>()
                }));
            }
        }
        for (key, service) in self.mailbox.read().iter() {
            if scope.matches(StoreKind::Mailbox, key) {
                entries.extend(service.store().with_read(|map| {
                    map.iter()
                        .map(|(hash, request)| FilterEntry::new(*hash, request.sequence_number()))
                        .collect::<Vec<_>>()
                }));
            }
        }
        for (key, service) in self.append_only.read().iter() {
            if scope.matches(StoreKind::AppendOnly, key) {
                entries.extend(service.store().with_read(|map| {
                    map.keys().map(|hash| FilterEntry::new(*hash, 0)).collect::<Vec<_>>()
                }));
            }
        }
        entries
    }

    /// Point-in-time clone of every stored request in scope.
    pub fn data_requests(&self, scope: &StoreScope) -> Vec<DataRequest> {
        let mut requests = Vec::new();
        for (key, service) in self.authenticated.read().iter() {
            if scope.matches(StoreKind::Authenticated, key) {
                requests
                    .extend(service.store().snapshot().into_values().map(DataRequest::from));
            }
        }
        for (key, service) in self.mailbox.read().iter() {
            if scope.matches(StoreKind::Mailbox, key) {
                requests
                    .extend(service.store().snapshot().into_values().map(DataRequest::from));
            }
        }
        for (key, service) in self.append_only.read().iter() {
            if scope.matches(StoreKind::AppendOnly, key) {
                requests
                    .extend(service.store().snapshot().into_values().map(DataRequest::from));
            }
        }
        requests
    }

    /// Sweep expired entries in every store that tracks creation times.
    pub fn prune_expired(&self) -> usize {
        let mut total = 0;
        let authenticated: Vec<_> = self.authenticated.read().values().cloned().collect();
        for service in authenticated {
            total += service.prune_expired();
        }
        let mailbox: Vec<_> = self.mailbox.read().values().cloned().collect();
        for service in mailbox {
            total += service.prune_expired();
        }
        total
    }

    async fn get_or_create_authenticated(
        &self,
        meta_data: &MetaData,
    ) -> Result<Arc<AuthenticatedStorageService>, StorageError> {
        let key = meta_data.file_name().to_string();
        let existing = self.authenticated.read().get(&key).cloned();
        let service = match existing {
            Some(service) => service,
            None => {
                let mut stores = self.authenticated.write();
                stores
                    .entry(key.clone())
                    .or_insert_with(|| {
                        debug!(store_key = %key, "creating authenticated store");
                        let service = Arc::new(AuthenticatedStorageService::new(
                            meta_data.clone(),
                            store_id(StoreKind::Authenticated, &key),
                            self.persistence.clone(),
                            Duration::from_millis(self.config.flush_debounce_ms),
                        ));
                        service.add_listener(Arc::new(AuthenticatedFanOut {
                            listeners: self.listeners.clone(),
                        }));
                        service
                    })
                    .clone()
            }
        };
        service.hydrate().await?;
        Ok(service)
    }

    async fn get_or_create_mailbox(
        &self,
        meta_data: &MetaData,
    ) -> Result<Arc<MailboxStorageService>, StorageError> {
        let key = meta_data.file_name().to_string();
        let existing = self.mailbox.read().get(&key).cloned();
        let service = match existing {
            Some(service) => service,
            None => {
                let mut stores = self.mailbox.write();
                stores
                    .entry(key.clone())
                    .or_insert_with(|| {
                        debug!(store_key = %key, "creating mailbox store");
                        let service = Arc::new(MailboxStorageService::new(
                            meta_data.clone(),
                            store_id(StoreKind::Mailbox, &key),
                            self.persistence.clone(),
                            Duration::from_millis(self.config.flush_debounce_ms),
                        ));
                        service.add_listener(Arc::new(MailboxFanOut {
                            listeners: self.listeners.clone(),
                        }));
                        service
                    })
                    .clone()
            }
        };
        service.hydrate().await?;
        Ok(service)
    }

    async fn get_or_create_append_only(
        &self,
        meta_data: &MetaData,
    ) -> Result<Arc<AppendOnlyStorageService>, StorageError> {
        let key = meta_data.file_name().to_string();
        let existing = self.append_only.read().get(&key).cloned();
        let service = match existing {
            Some(service) => service,
            None => {
                let mut stores = self.append_only.write();
                stores
                    .entry(key.clone())
                    .or_insert_with(|| {
                        debug!(store_key = %key, "creating append-only store");
                        let service = Arc::new(AppendOnlyStorageService::new(
                            meta_data.clone(),
                            store_id(StoreKind::AppendOnly, &key),
                            self.persistence.clone(),
                            Duration::from_millis(self.config.flush_debounce_ms),
                        ));
                        service.add_listener(Arc::new(AppendOnlyFanOut {
                            listeners: self.listeners.clone(),
                        }));
                        service
                    })
                    .clone()
            }
        };
        service.hydrate().await?;
        Ok(service)
    }
}

fn store_id(kind: StoreKind, store_key: &str) -> String {
    format!("{}/{}", kind.store_name(), store_key)
}

/// Relay decision plus the one warn per severe rejection.
fn relayed(result: StoreResult, data: StorageData, hash: &ContentHash) -> Option<StorageData> {
    if result.is_success() {
        return Some(data);
    }
    log_rejection(result, hash);
    None
}

fn log_rejection(result: StoreResult, hash: &ContentHash) {
    if result.is_severe() {
        warn!(%hash, ?result, "data request rejected");
    } else if !result.is_success() {
        debug!(%hash, ?result, "data request ignored");
    }
}

struct AuthenticatedFanOut {
    listeners: SharedListeners,
}

impl AuthenticatedStoreListener for AuthenticatedFanOut {
    fn on_added(&self, payload: &crate::data::AuthenticatedPayload) {
        let data = StorageData::Authenticated(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_added(&data);
        }
    }

    fn on_removed(&self, payload: &crate::data::AuthenticatedPayload) {
        let data = StorageData::Authenticated(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_removed(&data);
        }
    }

    fn on_refreshed(&self, payload: &crate::data::AuthenticatedPayload) {
        let data = StorageData::Authenticated(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_refreshed(&data);
        }
    }
}

struct MailboxFanOut {
    listeners: SharedListeners,
}

impl MailboxStoreListener for MailboxFanOut {
    fn on_added(&self, payload: &crate::data::MailboxPayload) {
        let data = StorageData::Mailbox(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_added(&data);
        }
    }

    fn on_removed(&self, payload: &crate::data::MailboxPayload) {
        let data = StorageData::Mailbox(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_removed(&data);
        }
    }
}

struct AppendOnlyFanOut {
    listeners: SharedListeners,
}

impl AppendOnlyStoreListener for AppendOnlyFanOut {
    fn on_appended(&self, payload: &crate::data::Payload) {
        let data = StorageData::AppendOnly(payload.clone());
        for listener in self.listeners.read().iter() {
            listener.on_added(&data);
        }
    }
}
