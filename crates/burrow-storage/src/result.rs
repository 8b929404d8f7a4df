//! Outcomes of add/remove/refresh operations.
//!
//! Outcomes are plain values, not errors: gossip flooding makes replays and
//! stale updates steady-state noise, and callers decide per entry whether to
//! relay. Only the severe variants warrant a warning log.

/// Outcome of applying one add, remove or refresh request to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StoreResult {
    /// Request accepted and applied.
    Success,
    /// A bit-identical request was already applied; idempotent gossip re-delivery.
    RequestAlreadyReceived,
    /// Append-only payload already present under this hash.
    PayloadAlreadyStored,
    /// Sequence number does not supersede the tracked one.
    SequenceNumberOutdated,
    /// Entry was already past its ttl when the add arrived.
    Expired,
    /// Remove/refresh target not present. For removes a tombstone is still
    /// recorded so the sequence number stays tracked.
    NoEntry,
    /// Target already replaced by a remove tombstone.
    AlreadyRemoved,
    /// Payload violates its class policy (size cap).
    DataInvalid,
    /// Public key does not match the stored owner.
    PublicKeyInvalid,
    /// Signature verification failed.
    SignatureInvalid,
    /// Store already holds `max_map_size` entries.
    MaxMapSizeReached,
}

impl StoreResult {
    /// The request mutated the store as intended.
    pub fn is_success(self) -> bool {
        matches!(self, StoreResult::Success)
    }

    /// Failure that indicates a broken or hostile request rather than
    /// ordinary gossip churn.
    pub fn is_severe(self) -> bool {
        matches!(
            self,
            StoreResult::DataInvalid
                | StoreResult::PublicKeyInvalid
                | StoreResult::SignatureInvalid
                | StoreResult::MaxMapSizeReached
        )
    }
}

/// Result of a remove, carrying the deleted payload on success so callers can
/// relay the deletion onward.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RemoveResult<T> {
    /// How the store handled the request.
    pub outcome: StoreResult,
    /// The payload that was deleted, `Some` only on [`StoreResult::Success`].
    pub removed: Option<T>,
}

impl<T> RemoveResult<T> {
    pub(crate) fn of(outcome: StoreResult) -> Self {
        Self { outcome, removed: None }
    }

    pub(crate) fn removed(payload: T) -> Self {
        Self { outcome: StoreResult::Success, removed: Some(payload) }
    }
}
