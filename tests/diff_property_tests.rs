//! Property-based tests for line diffing
//!
//! Every upstream line with a uid ends up in exactly one of added, changed or
//! unchanged, every unmatched downstream line in removed, and copying the
//! upstream over the downstream always closes the diff.

use doc_lineage::diff::diff;
use doc_lineage::document::{DocumentKind, LineItem};
use doc_lineage::normalize::project;
use proptest::prelude::*;
use std::collections::HashSet;

// PROPERTY TEST STRATEGIES

/// Strategy to generate a line whose uid is drawn from a small pool, so
/// upstream and downstream overlap often
fn line_item_strategy() -> impl Strategy<Value = LineItem> {
    (
        0u8..12,
        prop_oneof![Just("Desk"), Just("Chair"), Just("Lamp")],
        1u32..=20,
        prop::option::of(1u32..=300),
    )
        .prop_map(|(uid, description, quantity, price)| {
            let item = LineItem::new(description)
                .set_line_uid(&format!("L{uid}"))
                .set_quantity(f64::from(quantity));
            match price {
                Some(price) => item.set_unit_price(f64::from(price)),
                None => item,
            }
        })
}

/// Strategy to generate lines with distinct uids
fn unique_items_strategy() -> impl Strategy<Value = Vec<LineItem>> {
    prop::collection::vec(line_item_strategy(), 0..10).prop_map(|items| {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(item.line_uid.clone()))
            .collect()
    })
}

fn uids(items: &[LineItem]) -> HashSet<String> {
    items.iter().filter_map(|item| item.line_uid.clone()).collect()
}

// PROPERTY TESTS
proptest! {
    /// Property: a list never differs from itself
    #[test]
    fn prop_self_diff_is_empty(items in unique_items_strategy()) {
        prop_assert!(diff(&items, &items).is_empty());
    }

    /// Property: against an empty downstream everything is added, and
    /// against an empty upstream everything is removed
    #[test]
    fn prop_empty_sides(items in unique_items_strategy()) {
        let added = diff(&items, &[]);
        prop_assert_eq!(&added.added, &items);
        prop_assert!(added.removed.is_empty() && added.changed.is_empty());

        let removed = diff(&[], &items);
        prop_assert_eq!(&removed.removed, &items);
        prop_assert!(removed.added.is_empty() && removed.changed.is_empty());
    }

    /// Property: added, changed and removed partition the uids by side
    #[test]
    fn prop_buckets_partition_uids(
        upstream in unique_items_strategy(),
        downstream in unique_items_strategy(),
    ) {
        let result = diff(&upstream, &downstream);
        let up = uids(&upstream);
        let down = uids(&downstream);

        prop_assert_eq!(uids(&result.added), &up - &down);
        prop_assert_eq!(uids(&result.removed), &down - &up);
        for change in &result.changed {
            let uid = change.line_uid().map(str::to_string).unwrap_or_default();
            prop_assert!(up.contains(&uid) && down.contains(&uid));
            prop_assert!(!change.changed_fields.is_empty());
        }
        prop_assert!(result.conflicts.is_empty());
    }

    /// Property: replacing the downstream with the upstream projected into
    /// any kind leaves nothing to sync
    #[test]
    fn prop_resync_closes_the_diff(
        upstream in unique_items_strategy(),
        downstream in unique_items_strategy(),
        kind in prop_oneof![
            Just(DocumentKind::PurchaseOrder),
            Just(DocumentKind::DeliveryNote),
            Just(DocumentKind::Invoice),
        ],
    ) {
        prop_assume!(!diff(&upstream, &downstream).is_empty());

        let synced: Vec<LineItem> = upstream
            .iter()
            .map(|item| project(item, kind, item.unit_price, None))
            .collect();

        prop_assert!(diff(&upstream, &synced).is_empty());
    }
}
