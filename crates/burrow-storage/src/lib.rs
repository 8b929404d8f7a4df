//! # Burrow Storage - Gossiped Data Stores and Anti-Entropy
//!
//! **Purpose**: Store the payload classes gossiped across the peer-to-peer
//! network, enforce their replay and ordering rules, and reconcile divergent
//! peer data sets with compact set-difference exchange.
//!
//! ## Core Concepts
//!
//! - **Payload classes**: authenticated (mutable by replacement, owner
//!   signed), mailbox (addressed to one receiver, removed on pickup) and
//!   append-only (immutable, content addressed).
//! - **Sequence numbers**: per-lineage monotonic counters; the store keeps
//!   the highest accepted one, so last-writer-wins holds regardless of
//!   gossip arrival order.
//! - **Registry**: one [`StorageRegistry`] routes incoming requests to the
//!   right store, creating and hydrating stores lazily, and answers
//!   [`DataFilter`] reconciliation queries with bounded [`Inventory`]
//!   responses.
//! - **Persistence**: stores snapshot themselves through an async blob
//!   interface with debounced writes, so gossip storms cost one write per
//!   quiet window.
//!
//! ## What's NOT in this crate
//!
//! - Wire framing and message dispatch (callers hand in decoded requests)
//! - Socket-level peer connections (see `burrow-transport`)
//! - External HTTP lookups (see `burrow-http`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Storage layer configuration.
pub mod config;

/// Payload types for the three storage classes.
pub mod data;

/// Error types for persistence, codecs and configuration.
pub mod error;

/// Content hashing.
pub mod hash;

/// Anti-entropy filters and bounded inventories.
pub mod inventory;

/// Per-class storage policy.
pub mod meta_data;

/// Async snapshot persistence and the debounced flusher.
pub mod persistence;

/// The registry routing requests to stores.
pub mod registry;

/// Signed add/remove/refresh requests, the unit actually stored.
pub mod requests;

/// Operation outcomes returned as values.
pub mod result;

/// Per-payload-class storage services.
pub mod services;

/// The hash-keyed content store.
pub mod store;

pub use config::StorageConfig;
pub use data::{receiver_key_hash, AuthenticatedPayload, MailboxPayload, Payload, StorageData};
pub use error::StorageError;
pub use hash::ContentHash;
pub use inventory::{build_inventory, DataFilter, FilterEntry, Inventory, InventoryConfig};
pub use meta_data::{now_millis, MetaData, DEFAULT_MAX_MAP_SIZE};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence, PersistedStore};
pub use registry::{StorageDataListener, StorageRegistry, StoreKind, StoreScope};
pub use requests::{
    AddAppendOnlyDataRequest, AddAuthenticatedDataRequest, AddDataRequest, AddMailboxDataRequest,
    AuthenticatedDataRequest, DataRequest, MailboxDataRequest, RefreshAuthenticatedDataRequest,
    RemoveAuthenticatedDataRequest, RemoveDataRequest, RemoveMailboxDataRequest,
};
pub use result::{RemoveResult, StoreResult};
pub use services::{
    AppendOnlyStorageService, AppendOnlyStoreListener, AuthenticatedStorageService,
    AuthenticatedStoreListener, MailboxStorageService, MailboxStoreListener,
};
pub use store::DataStore;
