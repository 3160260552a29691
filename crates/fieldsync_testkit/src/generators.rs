//! Property-based test generators using proptest.
//!
//! Strategies produce records that satisfy the invariants the engine relies
//! on: positive ids, non-negative modification times and unique natural keys
//! within one generated batch.

use fieldsync_core::{EntityKind, Record, RecordId, Timestamp};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for modification times.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0i64..1_000_000_000_000).prop_map(Timestamp::from_millis)
}

/// Strategy for positive record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    (1i64..1_000_000).prop_map(RecordId::new)
}

/// Strategy for a set of route ids.
pub fn route_set_strategy(max: usize) -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(1i64..60, 0..=max)
}

/// Strategy for a local/remote pair of the same record with independent
/// modification times.
pub fn conflicting_pair_strategy() -> impl Strategy<Value = (Record, Record)> {
    (record_id_strategy(), timestamp_strategy(), timestamp_strategy()).prop_map(|(id, local, remote)| {
        (
            Record::new(EntityKind::Vehicle, id, local).with_field("model", "local"),
            Record::new(EntityKind::Vehicle, id, remote).with_field("model", "remote"),
        )
    })
}

/// Strategy for clients with distinct ids and names spread over routes `1..routes`.
pub fn client_batch_strategy(max: usize, routes: i64) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((1i64..routes.max(2), 1i64..1_000_000), 0..=max).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (route, lm))| {
                let id = i as i64 + 1;
                Record::new(EntityKind::Client, RecordId::new(id), Timestamp::from_millis(lm))
                    .with_field("name", format!("client {id}"))
                    .with_field("route_id", route)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn client_batches_have_unique_ids(batch in client_batch_strategy(40, 8)) {
            let ids: BTreeSet<_> = batch.iter().map(|r| r.id).collect();
            prop_assert_eq!(ids.len(), batch.len());
            for record in &batch {
                let route = record.reference("route_id").unwrap().as_i64();
                prop_assert!((1..8).contains(&route));
            }
        }

        #[test]
        fn pairs_share_identity(pair in conflicting_pair_strategy()) {
            prop_assert_eq!(pair.0.id, pair.1.id);
            prop_assert_eq!(pair.0.kind, pair.1.kind);
        }
    }
}
