//! Payload classes held by the stores.

use crate::hash::ContentHash;
use crate::meta_data::MetaData;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

/// Immutable, content-addressed payload. No owner, no ordering concept; its
/// hash is its whole identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    data: Vec<u8>,
    meta_data: MetaData,
}

impl Payload {
    /// Opaque payload bytes under a class policy.
    pub fn new(data: Vec<u8>, meta_data: MetaData) -> Self {
        Self { data, meta_data }
    }

    /// Content hash identifying this payload.
    pub fn hash(&self) -> ContentHash {
        ContentHash::digest(&self.data)
    }

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The class policy.
    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    /// Payload exceeds its class size cap.
    pub fn is_oversized(&self) -> bool {
        self.data.len() > self.meta_data.max_size_in_bytes()
    }
}

/// Mutable-by-replacement payload owned by a publisher. Successive versions
/// of one lineage share the hash and are ordered by sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPayload {
    data: Vec<u8>,
    meta_data: MetaData,
    owner_key: VerifyingKey,
}

impl AuthenticatedPayload {
    /// Payload bytes published under `owner_key`.
    pub fn new(data: Vec<u8>, meta_data: MetaData, owner_key: VerifyingKey) -> Self {
        Self { data, meta_data, owner_key }
    }

    /// Hash over content and owner, so distinct owners never share a lineage.
    pub fn hash(&self) -> ContentHash {
        ContentHash::digest_parts(&[&self.data, self.owner_key.as_bytes()])
    }

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The class policy.
    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    /// Key of the publisher allowed to replace or remove this payload.
    pub fn owner_key(&self) -> &VerifyingKey {
        &self.owner_key
    }

    /// Payload exceeds its class size cap.
    pub fn is_oversized(&self) -> bool {
        self.data.len() > self.meta_data.max_size_in_bytes()
    }
}

/// Payload addressed to one recipient; removed on pickup or expiry rather
/// than replaced. The sender signs the add, the receiver authorizes removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxPayload {
    data: Vec<u8>,
    meta_data: MetaData,
    sender_key: VerifyingKey,
    receiver_key_hash: ContentHash,
}

impl MailboxPayload {
    /// Payload from `sender_key` for the receiver committed to by `receiver_key_hash`.
    pub fn new(
        data: Vec<u8>,
        meta_data: MetaData,
        sender_key: VerifyingKey,
        receiver_key_hash: ContentHash,
    ) -> Self {
        Self { data, meta_data, sender_key, receiver_key_hash }
    }

    /// Hash over content, sender and receiver commitment.
    pub fn hash(&self) -> ContentHash {
        ContentHash::digest_parts(&[
            &self.data,
            self.sender_key.as_bytes(),
            self.receiver_key_hash.as_bytes(),
        ])
    }

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The class policy.
    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    /// Key the sender signed the add with.
    pub fn sender_key(&self) -> &VerifyingKey {
        &self.sender_key
    }

    /// Hash of the receiver key allowed to remove this payload.
    pub fn receiver_key_hash(&self) -> &ContentHash {
        &self.receiver_key_hash
    }

    /// Payload exceeds its class size cap.
    pub fn is_oversized(&self) -> bool {
        self.data.len() > self.meta_data.max_size_in_bytes()
    }
}

/// Any payload a store can hand back to callers, e.g. for relay decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageData {
    /// Publisher-owned, replaceable payload.
    Authenticated(AuthenticatedPayload),
    /// Recipient-addressed payload.
    Mailbox(MailboxPayload),
    /// Immutable content-addressed payload.
    AppendOnly(Payload),
}

impl StorageData {
    /// The class policy of the contained payload.
    pub fn meta_data(&self) -> &MetaData {
        match self {
            StorageData::Authenticated(payload) => payload.meta_data(),
            StorageData::Mailbox(payload) => payload.meta_data(),
            StorageData::AppendOnly(payload) => payload.meta_data(),
        }
    }
}

/// Commitment to a receiver key, as carried inside [`MailboxPayload`].
pub fn receiver_key_hash(receiver_key: &VerifyingKey) -> ContentHash {
    ContentHash::digest(receiver_key.as_bytes())
}
