//! The request variants stores actually hold and dispatch on.
//!
//! Every variant is a closed enum member; dispatch is exhaustive matching, so
//! a new payload class is a compile-time-checked change.

use crate::data::{receiver_key_hash, AuthenticatedPayload, MailboxPayload, Payload};
use crate::hash::ContentHash;
use crate::meta_data::MetaData;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Digest the owner signs: binds the payload hash to the sequence number so a
/// replayed signature cannot authorize a different version.
fn signed_digest(hash: &ContentHash, sequence_number: u64) -> [u8; 32] {
    *ContentHash::digest_parts(&[hash.as_bytes(), &sequence_number.to_be_bytes()]).as_bytes()
}

fn verify(key: &VerifyingKey, hash: &ContentHash, sequence_number: u64, signature: &Signature) -> bool {
    key.verify(&signed_digest(hash, sequence_number), signature).is_ok()
}

/// Publish or replace an authenticated payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAuthenticatedDataRequest {
    payload: AuthenticatedPayload,
    sequence_number: u64,
    created_at: u64,
    signature: Signature,
}

impl AddAuthenticatedDataRequest {
    /// Wrap an already-signed request, e.g. one received from a peer.
    pub fn new(
        payload: AuthenticatedPayload,
        sequence_number: u64,
        created_at: u64,
        signature: Signature,
    ) -> Self {
        Self { payload, sequence_number, created_at, signature }
    }

    /// Sign and wrap a payload for publication.
    pub fn sign(
        payload: AuthenticatedPayload,
        sequence_number: u64,
        created_at: u64,
        signing_key: &SigningKey,
    ) -> Self {
        let signature = signing_key.sign(&signed_digest(&payload.hash(), sequence_number));
        Self { payload, sequence_number, created_at, signature }
    }

    pub fn hash(&self) -> ContentHash {
        self.payload.hash()
    }

    pub fn payload(&self) -> &AuthenticatedPayload {
        &self.payload
    }

    pub fn meta_data(&self) -> &MetaData {
        self.payload.meta_data()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.meta_data().is_expired(self.created_at, now)
    }

    pub fn is_signature_invalid(&self) -> bool {
        !verify(self.payload.owner_key(), &self.hash(), self.sequence_number, &self.signature)
    }

    /// Same stored payload re-wrapped under the refresh's sequence number and
    /// a fresh creation time. Add and refresh signatures cover the same
    /// `(hash, sequence_number)` digest, so the refresh signature is carried
    /// over as the publication signature and the re-wrapped add still
    /// verifies when gossiped onward.
    pub(crate) fn refreshed(
        &self,
        refresh: &RefreshAuthenticatedDataRequest,
        created_at: u64,
    ) -> Self {
        Self {
            payload: self.payload.clone(),
            sequence_number: refresh.sequence_number,
            created_at,
            signature: refresh.signature,
        }
    }
}

/// Delete an authenticated payload; only its owner can produce a valid one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAuthenticatedDataRequest {
    hash: ContentHash,
    sequence_number: u64,
    created_at: u64,
    owner_key: VerifyingKey,
    signature: Signature,
    meta_data: MetaData,
}

impl RemoveAuthenticatedDataRequest {
    /// Wrap an already-signed request.
    pub fn new(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        owner_key: VerifyingKey,
        signature: Signature,
        meta_data: MetaData,
    ) -> Self {
        Self { hash, sequence_number, created_at, owner_key, signature, meta_data }
    }

    /// Sign a removal of the lineage under `hash`.
    pub fn sign(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        meta_data: MetaData,
        signing_key: &SigningKey,
    ) -> Self {
        let signature = signing_key.sign(&signed_digest(&hash, sequence_number));
        Self {
            hash,
            sequence_number,
            created_at,
            owner_key: signing_key.verifying_key(),
            signature,
            meta_data,
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn owner_key(&self) -> &VerifyingKey {
        &self.owner_key
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.meta_data.is_expired(self.created_at, now)
    }

    pub fn is_signature_invalid(&self) -> bool {
        !verify(&self.owner_key, &self.hash, self.sequence_number, &self.signature)
    }
}

/// Bump the sequence number of a stored authenticated payload without
/// retransmitting it, extending its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAuthenticatedDataRequest {
    hash: ContentHash,
    sequence_number: u64,
    created_at: u64,
    owner_key: VerifyingKey,
    signature: Signature,
    meta_data: MetaData,
}

impl RefreshAuthenticatedDataRequest {
    /// Wrap an already-signed request.
    pub fn new(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        owner_key: VerifyingKey,
        signature: Signature,
        meta_data: MetaData,
    ) -> Self {
        Self { hash, sequence_number, created_at, owner_key, signature, meta_data }
    }

    /// Sign a refresh of the lineage under `hash`.
    pub fn sign(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        meta_data: MetaData,
        signing_key: &SigningKey,
    ) -> Self {
        let signature = signing_key.sign(&signed_digest(&hash, sequence_number));
        Self {
            hash,
            sequence_number,
            created_at,
            owner_key: signing_key.verifying_key(),
            signature,
            meta_data,
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn owner_key(&self) -> &VerifyingKey {
        &self.owner_key
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    pub fn is_signature_invalid(&self) -> bool {
        !verify(&self.owner_key, &self.hash, self.sequence_number, &self.signature)
    }
}

/// Deliver a payload into a recipient's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMailboxDataRequest {
    payload: MailboxPayload,
    sequence_number: u64,
    created_at: u64,
    signature: Signature,
}

impl AddMailboxDataRequest {
    /// Wrap an already-signed request.
    pub fn new(
        payload: MailboxPayload,
        sequence_number: u64,
        created_at: u64,
        signature: Signature,
    ) -> Self {
        Self { payload, sequence_number, created_at, signature }
    }

    /// Sign with the sender key, which must be the one inside the payload.
    pub fn sign(
        payload: MailboxPayload,
        sequence_number: u64,
        created_at: u64,
        sender_key: &SigningKey,
    ) -> Self {
        let signature = sender_key.sign(&signed_digest(&payload.hash(), sequence_number));
        Self { payload, sequence_number, created_at, signature }
    }

    pub fn hash(&self) -> ContentHash {
        self.payload.hash()
    }

    pub fn payload(&self) -> &MailboxPayload {
        &self.payload
    }

    pub fn meta_data(&self) -> &MetaData {
        self.payload.meta_data()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.meta_data().is_expired(self.created_at, now)
    }

    pub fn is_signature_invalid(&self) -> bool {
        !verify(self.payload.sender_key(), &self.hash(), self.sequence_number, &self.signature)
    }
}

/// Remove a mailbox payload; only the committed receiver can produce a valid one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMailboxDataRequest {
    hash: ContentHash,
    sequence_number: u64,
    created_at: u64,
    receiver_key: VerifyingKey,
    signature: Signature,
    meta_data: MetaData,
}

impl RemoveMailboxDataRequest {
    /// Wrap an already-signed request.
    pub fn new(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        receiver_key: VerifyingKey,
        signature: Signature,
        meta_data: MetaData,
    ) -> Self {
        Self { hash, sequence_number, created_at, receiver_key, signature, meta_data }
    }

    /// Sign a pickup/removal with the receiver key.
    pub fn sign(
        hash: ContentHash,
        sequence_number: u64,
        created_at: u64,
        meta_data: MetaData,
        receiver_key: &SigningKey,
    ) -> Self {
        let signature = receiver_key.sign(&signed_digest(&hash, sequence_number));
        Self {
            hash,
            sequence_number,
            created_at,
            receiver_key: receiver_key.verifying_key(),
            signature,
            meta_data,
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn receiver_key(&self) -> &VerifyingKey {
        &self.receiver_key
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.meta_data.is_expired(self.created_at, now)
    }

    /// The receiver key must hash to the commitment the sender stored.
    pub fn is_receiver_invalid(&self, expected: &ContentHash) -> bool {
        receiver_key_hash(&self.receiver_key) != *expected
    }

    pub fn is_signature_invalid(&self) -> bool {
        !verify(&self.receiver_key, &self.hash, self.sequence_number, &self.signature)
    }
}

/// Publish an immutable payload. No sequence number, no removal path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAppendOnlyDataRequest {
    payload: Payload,
}

impl AddAppendOnlyDataRequest {
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }

    pub fn hash(&self) -> ContentHash {
        self.payload.hash()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn meta_data(&self) -> &MetaData {
        self.payload.meta_data()
    }
}

/// What an authenticated store holds under one hash: the live add, or a
/// remove tombstone that keeps the sequence number tracked after deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticatedDataRequest {
    Add(AddAuthenticatedDataRequest),
    Remove(RemoveAuthenticatedDataRequest),
}

impl AuthenticatedDataRequest {
    pub fn sequence_number(&self) -> u64 {
        match self {
            AuthenticatedDataRequest::Add(request) => request.sequence_number(),
            AuthenticatedDataRequest::Remove(request) => request.sequence_number(),
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            AuthenticatedDataRequest::Add(request) => request.created_at(),
            AuthenticatedDataRequest::Remove(request) => request.created_at(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        match self {
            AuthenticatedDataRequest::Add(request) => request.is_expired(now),
            AuthenticatedDataRequest::Remove(request) => request.is_expired(now),
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            AuthenticatedDataRequest::Add(request) => request.meta_data().priority(),
            AuthenticatedDataRequest::Remove(request) => request.meta_data().priority(),
        }
    }
}

/// What a mailbox store holds under one hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxDataRequest {
    Add(AddMailboxDataRequest),
    Remove(RemoveMailboxDataRequest),
}

impl MailboxDataRequest {
    pub fn sequence_number(&self) -> u64 {
        match self {
            MailboxDataRequest::Add(request) => request.sequence_number(),
            MailboxDataRequest::Remove(request) => request.sequence_number(),
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            MailboxDataRequest::Add(request) => request.created_at(),
            MailboxDataRequest::Remove(request) => request.created_at(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        match self {
            MailboxDataRequest::Add(request) => request.is_expired(now),
            MailboxDataRequest::Remove(request) => request.is_expired(now),
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            MailboxDataRequest::Add(request) => request.meta_data().priority(),
            MailboxDataRequest::Remove(request) => request.meta_data().priority(),
        }
    }
}

/// An add request of any payload class, as handed in by the message layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddDataRequest {
    Authenticated(AddAuthenticatedDataRequest),
    Mailbox(AddMailboxDataRequest),
    AppendOnly(AddAppendOnlyDataRequest),
}

impl AddDataRequest {
    /// Store key the registry routes this request to.
    pub fn store_key(&self) -> &str {
        match self {
            AddDataRequest::Authenticated(request) => request.meta_data().file_name(),
            AddDataRequest::Mailbox(request) => request.meta_data().file_name(),
            AddDataRequest::AppendOnly(request) => request.meta_data().file_name(),
        }
    }
}

/// A remove request of any removable payload class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveDataRequest {
    Authenticated(RemoveAuthenticatedDataRequest),
    Mailbox(RemoveMailboxDataRequest),
}

impl RemoveDataRequest {
    /// Store key the registry routes this request to.
    pub fn store_key(&self) -> &str {
        match self {
            RemoveDataRequest::Authenticated(request) => request.meta_data().file_name(),
            RemoveDataRequest::Mailbox(request) => request.meta_data().file_name(),
        }
    }
}

/// Any stored request, as carried in inventory responses across store types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRequest {
    AddAuthenticated(AddAuthenticatedDataRequest),
    RemoveAuthenticated(RemoveAuthenticatedDataRequest),
    AddMailbox(AddMailboxDataRequest),
    RemoveMailbox(RemoveMailboxDataRequest),
    AddAppendOnly(AddAppendOnlyDataRequest),
}

impl DataRequest {
    /// Sequence number for reconciliation; append-only data has no ordering
    /// concept and reports 0.
    pub fn sequence_number(&self) -> u64 {
        match self {
            DataRequest::AddAuthenticated(request) => request.sequence_number(),
            DataRequest::RemoveAuthenticated(request) => request.sequence_number(),
            DataRequest::AddMailbox(request) => request.sequence_number(),
            DataRequest::RemoveMailbox(request) => request.sequence_number(),
            DataRequest::AddAppendOnly(_) => 0,
        }
    }

    pub fn hash(&self) -> ContentHash {
        match self {
            DataRequest::AddAuthenticated(request) => request.hash(),
            DataRequest::RemoveAuthenticated(request) => request.hash(),
            DataRequest::AddMailbox(request) => request.hash(),
            DataRequest::RemoveMailbox(request) => request.hash(),
            DataRequest::AddAppendOnly(request) => request.hash(),
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            DataRequest::AddAuthenticated(request) => request.meta_data().priority(),
            DataRequest::RemoveAuthenticated(request) => request.meta_data().priority(),
            DataRequest::AddMailbox(request) => request.meta_data().priority(),
            DataRequest::RemoveMailbox(request) => request.meta_data().priority(),
            DataRequest::AddAppendOnly(request) => request.meta_data().priority(),
        }
    }

    /// Whether this is an add (as opposed to a remove tombstone).
    pub fn is_add(&self) -> bool {
        matches!(
            self,
            DataRequest::AddAuthenticated(_)
                | DataRequest::AddMailbox(_)
                | DataRequest::AddAppendOnly(_)
        )
    }

    /// Serialized size used against the inventory byte cap.
    pub fn encoded_len(&self) -> usize {
        bincode::serialized_size(self).map(|len| len as usize).unwrap_or(0)
    }
}

impl From<AuthenticatedDataRequest> for DataRequest {
    fn from(request: AuthenticatedDataRequest) -> Self {
        match request {
            AuthenticatedDataRequest::Add(request) => DataRequest::AddAuthenticated(request),
            AuthenticatedDataRequest::Remove(request) => DataRequest::RemoveAuthenticated(request),
        }
    }
}

impl From<MailboxDataRequest> for DataRequest {
    fn from(request: MailboxDataRequest) -> Self {
        match request {
            MailboxDataRequest::Add(request) => DataRequest::AddMailbox(request),
            MailboxDataRequest::Remove(request) => DataRequest::RemoveMailbox(request),
        }
    }
}

impl From<AddAppendOnlyDataRequest> for DataRequest {
    fn from(request: AddAppendOnlyDataRequest) -> Self {
        DataRequest::AddAppendOnly(request)
    }
}
