//! Anti-entropy reconciliation: filters, dominance and bounded inventories.
//!
//! A peer summarizes its holdings as a [`DataFilter`] of `(hash, sequence
//! number)` pairs and sends it over. The other side answers with an
//! [`Inventory`] holding exactly the stored requests the filter does not
//! dominate, capped by entry count and accumulated byte size so a response
//! always fits one message.

use crate::hash::ContentHash;
use crate::requests::DataRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Compact summary of one stored entry. Append-only entries have no ordering
/// concept and always carry sequence number 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    /// Content hash of the stored payload.
    pub hash: ContentHash,
    /// Highest sequence number the sender holds for that hash.
    pub sequence_number: u64,
}

impl FilterEntry {
    pub fn new(hash: ContentHash, sequence_number: u64) -> Self {
        Self { hash, sequence_number }
    }
}

/// What a peer already has; the receiving side returns only entries this
/// filter does not dominate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFilter {
    entries: HashMap<ContentHash, u64>,
}

impl DataFilter {
    /// Build a filter from entries, keeping the highest sequence number when
    /// a hash appears more than once.
    pub fn new(entries: impl IntoIterator<Item = FilterEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(entry.hash)
                .and_modify(|seq: &mut u64| *seq = (*seq).max(entry.sequence_number))
                .or_insert(entry.sequence_number);
        }
        Self { entries: map }
    }

    /// True when the filter's holder already has an equal-or-newer version,
    /// so the entry must not be included in the inventory.
    pub fn dominates(&self, hash: &ContentHash, sequence_number: u64) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|have| *have >= sequence_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Caps applied to a single inventory response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Maximum number of requests returned per response.
    pub max_entries: usize,
    /// Maximum accumulated encoded size of the returned requests.
    pub max_accumulated_bytes: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self { max_entries: 5000, max_accumulated_bytes: 2_000_000 }
    }
}

/// Bounded answer to a [`DataFilter`]: the requests the asking peer is
/// missing, plus how many matching requests were cut by the caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Requests not dominated by the filter, adds before removes, higher
    /// priority classes first.
    pub entries: Vec<DataRequest>,
    /// Matching requests that did not fit under the caps.
    pub num_truncated: u32,
}

impl Inventory {
    /// The response was cut short; the asking peer should follow up with a
    /// fresh filter to fetch the rest.
    pub fn is_truncated(&self) -> bool {
        self.num_truncated > 0
    }
}

/// Compute the inventory for `candidates` against `filter`.
///
/// Adds are returned before removes so a receiving peer processes an entry's
/// add ahead of its tombstone within one response; within each group, higher
/// payload-class priority goes first so important classes survive truncation.
pub fn build_inventory(
    candidates: impl IntoIterator<Item = DataRequest>,
    filter: &DataFilter,
    config: &InventoryConfig,
) -> Inventory {
    let mut adds = Vec::new();
    let mut removes = Vec::new();
    for request in candidates {
        if filter.dominates(&request.hash(), request.sequence_number()) {
            continue;
        }
        if request.is_add() {
            adds.push(request);
        } else {
            removes.push(request);
        }
    }
    adds.sort_by_key(|request| std::cmp::Reverse(request.priority()));
    removes.sort_by_key(|request| std::cmp::Reverse(request.priority()));

    let total = adds.len() + removes.len();
    let mut entries = Vec::new();
    let mut accumulated = 0usize;
    for request in adds.into_iter().chain(removes) {
        if entries.len() >= config.max_entries {
            break;
        }
        let encoded = request.encoded_len();
        if accumulated + encoded > config.max_accumulated_bytes {
            break;
        }
        accumulated += encoded;
        entries.push(request);
    }
    let num_truncated = (total - entries.len()) as u32;
    Inventory { entries, num_truncated }
}
