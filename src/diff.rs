//! Line level comparison of an upstream document against a downstream copy
//!
//! Items are joined on `line_uid`. The comparison is pure and never touches
//! the store.
use crate::document::LineItem;
use crate::normalize::{downstream_quantity, upstream_quantity};
use crate::money::coerce;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangedField {
    Description,
    Quantity,
    UnitPrice,
}

impl ChangedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedField::Description => "description",
            ChangedField::Quantity => "quantity",
            ChangedField::UnitPrice => "unit_price",
        }
    }
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// The downstream item as it stands.
    pub current: LineItem,
    /// The upstream item it would be replaced with.
    pub proposed: LineItem,
    pub changed_fields: Vec<ChangedField>,
}

impl ChangeRecord {
    pub fn line_uid(&self) -> Option<&str> {
        self.proposed.line_uid()
    }
}

/// Placeholder for two-way edit detection, nothing produces one yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub line_uid: String,
    pub fields: Vec<ChangedField>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub added: Vec<LineItem>,
    pub removed: Vec<LineItem>,
    pub changed: Vec<ChangeRecord>,
    pub conflicts: Vec<Conflict>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
    pub fn has_blocking_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

pub fn diff(upstream: &[LineItem], downstream: &[LineItem]) -> DiffResult {
    // uid -> position in `downstream`, a repeated uid keeps its last occurrence
    let mut unmatched: HashMap<&str, usize> = HashMap::new();
    for (position, item) in downstream.iter().enumerate() {
        if let Some(uid) = item.line_uid() {
            unmatched.insert(uid, position);
        }
    }

    let mut result = DiffResult::default();
    for proposed in upstream {
        let Some(uid) = proposed.line_uid() else {
            continue;
        };
        let Some(position) = unmatched.remove(uid) else {
            result.added.push(proposed.clone());
            continue;
        };
        let current = &downstream[position];
        let changed_fields = changed_fields(proposed, current);
        if !changed_fields.is_empty() {
            result.changed.push(ChangeRecord {
                current: current.clone(),
                proposed: proposed.clone(),
                changed_fields,
            });
        }
    }

    let mut leftover: Vec<usize> = unmatched.into_values().collect();
    leftover.sort_unstable();
    result.removed = leftover
        .into_iter()
        .map(|position| downstream[position].clone())
        .collect();

    result
}

fn changed_fields(upstream: &LineItem, downstream: &LineItem) -> Vec<ChangedField> {
    let mut fields = vec![];
    if upstream.description != downstream.description {
        fields.push(ChangedField::Description);
    }
    if coerce(upstream_quantity(upstream)) != coerce(downstream_quantity(downstream)) {
        fields.push(ChangedField::Quantity);
    }
    // delivery notes carry no price, only compare when both sides have one
    if let (Some(up), Some(down)) = (upstream.unit_price, downstream.unit_price) {
        if coerce(Some(up)) != coerce(Some(down)) {
            fields.push(ChangedField::UnitPrice);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(uid: &str, quantity: f64) -> LineItem {
        LineItem::new("Widget").set_line_uid(uid).set_quantity(quantity)
    }

    #[test]
    fn classifies_added_removed_changed() {
        let upstream = [item("A", 1.0), item("B", 2.0)];
        let downstream = [item("B", 5.0), item("C", 1.0)];

        let result = diff(&upstream, &downstream);

        assert_eq!(result.added, vec![item("A", 1.0)]);
        assert_eq!(result.removed, vec![item("C", 1.0)]);
        assert_eq!(result.changed.len(), 1);
        assert_eq!(result.changed[0].line_uid(), Some("B"));
        assert_eq!(result.changed[0].changed_fields, vec![ChangedField::Quantity]);
        assert_eq!(result.changed[0].current, item("B", 5.0));
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn identical_sets_are_empty() {
        let items = [item("A", 1.0), item("B", 2.0)];
        let result = diff(&items, &items);
        assert!(result.is_empty());
        assert!(!result.has_blocking_conflicts());
    }

    #[test]
    fn items_without_uid_are_skipped() {
        let upstream = [LineItem::new("loose").set_quantity(1.0), item("A", 1.0)];
        let downstream = [item("A", 1.0), LineItem::new("also loose")];
        assert!(diff(&upstream, &downstream).is_empty());
    }

    #[test]
    fn quantities_are_normalized_per_side() {
        let upstream = [LineItem::new("Widget").set_line_uid("A").set_quantity_delivered(3.0)];
        let billed = [LineItem::new("Widget").set_line_uid("A").set_quantity_billed(3.0)];
        assert!(diff(&upstream, &billed).is_empty());

        let delivered = [LineItem::new("Widget").set_line_uid("A").set_quantity_delivered(3.0)];
        assert!(diff(&upstream, &delivered).is_empty());
    }

    #[test]
    fn price_only_compared_when_both_carry_one() {
        let upstream = [item("A", 1.0).set_unit_price(10.0)];
        let unpriced = [item("A", 1.0)];
        assert!(diff(&upstream, &unpriced).is_empty());

        let repriced = [item("A", 1.0).set_unit_price(12.0)];
        let result = diff(&upstream, &repriced);
        assert_eq!(result.changed[0].changed_fields, vec![ChangedField::UnitPrice]);
    }

    #[test]
    fn reports_every_changed_field() {
        let upstream = [LineItem::new("Desk, oak")
            .set_line_uid("A")
            .set_quantity(2.0)
            .set_unit_price(100.0)];
        let downstream = [LineItem::new("Desk")
            .set_line_uid("A")
            .set_quantity(1.0)
            .set_unit_price(90.0)];

        let result = diff(&upstream, &downstream);
        let names: Vec<_> = result.changed[0]
            .changed_fields
            .iter()
            .map(|f| f.to_string())
            .collect();
        assert_eq!(names, vec!["description", "quantity", "unit_price"]);
    }

    #[test]
    fn removed_keeps_downstream_order() {
        let downstream = [item("Z", 1.0), item("Y", 1.0), item("X", 1.0)];
        let result = diff(&[], &downstream);
        let uids: Vec<_> = result.removed.iter().filter_map(|i| i.line_uid()).collect();
        assert_eq!(uids, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn duplicate_downstream_uid_keeps_last() {
        let downstream = [item("A", 9.0), item("A", 1.0)];
        let result = diff(&[item("A", 1.0)], &downstream);
        assert!(result.is_empty());
    }
}
