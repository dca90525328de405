//! Maps each kind's native quantity fields onto one canonical quantity.
//!
//! Quotes, purchase orders and invoices store `quantity`, delivery notes store
//! `quantity_delivered` and some invoices `quantity_billed`. Everything that
//! compares or prices lines reads quantities through here.
use crate::document::{DocumentKind, LineItem};

/// Quantity of an item on the upstream side of a comparison.
pub fn upstream_quantity(item: &LineItem) -> Option<f64> {
    item.quantity.or(item.quantity_delivered)
}

/// Quantity of an item on the downstream side of a comparison.
pub fn downstream_quantity(item: &LineItem) -> Option<f64> {
    item.quantity
        .or(item.quantity_billed)
        .or(item.quantity_delivered)
}

/// Quantity an item of `kind` carries in its native shape.
pub fn native_quantity(kind: DocumentKind, item: &LineItem) -> Option<f64> {
    match kind {
        DocumentKind::DeliveryNote => item.quantity_delivered.or(item.quantity),
        DocumentKind::Invoice => item.quantity.or(item.quantity_billed),
        DocumentKind::Quote | DocumentKind::PurchaseOrder => item.quantity,
    }
}

/// Rewrites an item of `kind` so its quantity sits in `quantity`.
pub fn to_canonical(kind: DocumentKind, item: &LineItem) -> LineItem {
    LineItem {
        quantity: native_quantity(kind, item),
        quantity_delivered: None,
        quantity_billed: None,
        ..item.clone()
    }
}

/// Projects an upstream item into the native shape of a `target` document.
///
/// Identity, wording and unit carry over verbatim. Pricing is the caller's
/// choice since delivery notes derived from a purchase order carry none.
pub fn project(
    item: &LineItem,
    target: DocumentKind,
    unit_price: Option<f64>,
    total: Option<f64>,
) -> LineItem {
    let quantity = upstream_quantity(item);
    let base = LineItem {
        line_uid: item.line_uid.clone(),
        description: item.description.clone(),
        unit: item.unit.clone(),
        unit_price,
        total,
        ..LineItem::default()
    };
    match target {
        DocumentKind::DeliveryNote => LineItem {
            quantity_delivered: quantity,
            ..base
        },
        DocumentKind::Quote | DocumentKind::PurchaseOrder | DocumentKind::Invoice => LineItem {
            quantity,
            ..base
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_prefers_quantity_then_delivered() {
        let item = LineItem::new("x").set_quantity_delivered(4.0);
        assert_eq!(upstream_quantity(&item), Some(4.0));

        let item = item.set_quantity(2.0);
        assert_eq!(upstream_quantity(&item), Some(2.0));
    }

    #[test]
    fn downstream_prefers_quantity_then_billed_then_delivered() {
        let item = LineItem::new("x").set_quantity_delivered(4.0);
        assert_eq!(downstream_quantity(&item), Some(4.0));

        let item = item.set_quantity_billed(3.0);
        assert_eq!(downstream_quantity(&item), Some(3.0));

        let item = item.set_quantity(1.0);
        assert_eq!(downstream_quantity(&item), Some(1.0));
    }

    #[test]
    fn delivery_note_projection_moves_quantity_to_delivered() {
        let po_item = LineItem::new("Desk")
            .set_line_uid("L1")
            .set_unit("pc")
            .set_quantity(3.0)
            .set_unit_price(40.0);

        let dn_item = project(&po_item, DocumentKind::DeliveryNote, None, None);

        assert_eq!(dn_item.line_uid(), Some("L1"));
        assert_eq!(dn_item.unit.as_deref(), Some("pc"));
        assert_eq!(dn_item.quantity, None);
        assert_eq!(dn_item.quantity_delivered, Some(3.0));
        assert_eq!(dn_item.unit_price, None);
    }

    #[test]
    fn canonical_delivery_note_item_reads_delivered() {
        let dn_item = LineItem::new("Desk").set_quantity_delivered(5.0);
        let canonical = to_canonical(DocumentKind::DeliveryNote, &dn_item);
        assert_eq!(canonical.quantity, Some(5.0));
        assert_eq!(canonical.quantity_delivered, None);
    }
}
