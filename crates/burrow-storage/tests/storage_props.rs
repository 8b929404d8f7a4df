//! Property tests for store ordering and reconciliation semantics.

#![allow(clippy::expect_used, missing_docs)]

use burrow_storage::{
    build_inventory, AddAuthenticatedDataRequest, AuthenticatedPayload, AuthenticatedStorageService,
    DataFilter, DataRequest, FilterEntry, InventoryConfig, MemoryPersistence, MetaData,
    now_millis,
};
use ed25519_dalek::SigningKey;
use proptest::prelude::*;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;

fn offer_meta() -> MetaData {
    MetaData::new("offers", Some(Duration::from_secs(600)), 4096)
}

fn signed_add(key: &SigningKey, data: &[u8], seq: u64) -> AddAuthenticatedDataRequest {
    let payload = AuthenticatedPayload::new(data.to_vec(), offer_meta(), key.verifying_key());
    AddAuthenticatedDataRequest::sign(payload, seq, now_millis(), key)
}

fn run_adds(seqs: &[u64]) -> (Vec<bool>, u64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime builds");
    runtime.block_on(async {
        let service = AuthenticatedStorageService::new(
            offer_meta(),
            "authenticated/offers",
            Arc::new(MemoryPersistence::new()),
            Duration::from_millis(50),
        );
        let key = SigningKey::generate(&mut OsRng);
        let hash = signed_add(&key, b"lineage", 0).hash();
        let outcomes = seqs
            .iter()
            .map(|&seq| service.add(signed_add(&key, b"lineage", seq)).is_success())
            .collect();
        (outcomes, service.sequence_number(&hash))
    })
}

proptest! {
    /// The stored sequence number is always the maximum among accepted adds,
    /// and an add is accepted exactly when it exceeds everything accepted
    /// before it (or is the first sighting).
    #[test]
    fn stored_sequence_is_max_of_accepted_adds(
        seqs in proptest::collection::vec(0u64..16, 1..24),
    ) {
        let (outcomes, stored) = run_adds(&seqs);

        let mut model: Option<u64> = None;
        for (&seq, &accepted) in seqs.iter().zip(outcomes.iter()) {
            let expected = model.map_or(true, |max| seq > max);
            prop_assert_eq!(accepted, expected);
            if expected {
                model = Some(seq);
            }
        }
        prop_assert_eq!(stored, model.expect("at least one add accepted"));
        prop_assert_eq!(stored, *seqs.iter().max().expect("non-empty"));
    }

    /// Arrival order never changes the converged state.
    #[test]
    fn final_state_is_order_independent(
        seqs in proptest::collection::vec(0u64..16, 1..16),
    ) {
        let (_, forward) = run_adds(&seqs);
        let reversed: Vec<u64> = seqs.iter().rev().copied().collect();
        let (_, backward) = run_adds(&reversed);
        prop_assert_eq!(forward, backward);
    }

    /// With caps out of the way, an inventory holds exactly the entries the
    /// filter does not dominate.
    #[test]
    fn uncapped_inventory_is_exact_set_difference(
        held_seqs in proptest::collection::vec(1u64..8, 1..12),
        filter_deltas in proptest::collection::vec(
            proptest::option::of(-2i64..=2), 1..12,
        ),
    ) {
        let key = SigningKey::generate(&mut OsRng);
        let requests: Vec<DataRequest> = held_seqs
            .iter()
            .enumerate()
            .map(|(i, &seq)| DataRequest::AddAuthenticated(signed_add(&key, &[i as u8], seq)))
            .collect();

        // The filter knows some entries, offset by a small sequence delta.
        let mut entries = Vec::new();
        let mut expected = Vec::new();
        for (request, delta) in requests.iter().zip(filter_deltas.iter().cycle()) {
            match delta {
                Some(delta) => {
                    let known = request.sequence_number().saturating_add_signed(*delta);
                    entries.push(FilterEntry::new(request.hash(), known));
                    if known < request.sequence_number() {
                        expected.push(request.hash());
                    }
                }
                None => expected.push(request.hash()),
            }
        }
        let filter = DataFilter::new(entries);

        let config = InventoryConfig { max_entries: usize::MAX, max_accumulated_bytes: usize::MAX };
        let inventory = build_inventory(requests, &filter, &config);
        prop_assert_eq!(inventory.num_truncated, 0);

        let mut returned: Vec<_> = inventory.entries.iter().map(DataRequest::hash).collect();
        returned.sort();
        expected.sort();
        prop_assert_eq!(returned, expected);
    }
}
