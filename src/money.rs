//! Discount-aware totals over priced lines
//!
//! Every amount is a `Decimal`, inbound numbers are loosely typed `f64` and
//! anything missing or not finite counts as zero.
use crate::document::{DocumentKind, LineItem};
use crate::normalize;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fixed VAT rate applied to the discounted net amount.
pub const VAT_RATE: Decimal = dec!(0.20);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoneyLine {
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
}

impl MoneyLine {
    pub fn new(quantity: f64, unit_price: f64) -> Self {
        Self {
            quantity: Some(quantity),
            unit_price: Some(unit_price),
        }
    }
}

// expects a canonical item, see `normalize::to_canonical`
impl From<&LineItem> for MoneyLine {
    fn from(item: &LineItem) -> Self {
        Self {
            quantity: normalize::downstream_quantity(item),
            unit_price: item.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub gross_ht: Decimal,
    pub discount_amount: Decimal,
    pub net_ht: Decimal,
    pub vat: Decimal,
    pub ttc: Decimal,
}

pub fn coerce(value: Option<f64>) -> Decimal {
    value
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .unwrap_or(Decimal::ZERO)
}

pub fn line_total(line: &MoneyLine) -> Decimal {
    coerce(line.quantity) * coerce(line.unit_price)
}

pub fn compute(lines: &[MoneyLine], discount_percent: f64) -> Totals {
    let gross_ht: Decimal = lines.iter().map(line_total).sum();
    // not clamped, out of range discounts propagate
    let discount_amount = gross_ht * coerce(Some(discount_percent)) / dec!(100);
    let net_ht = gross_ht - discount_amount;
    let vat = net_ht * VAT_RATE;
    let ttc = net_ht + vat;

    Totals {
        gross_ht,
        discount_amount,
        net_ht,
        vat,
        ttc,
    }
}

/// Totals of a document's items read in their native shape.
pub fn compute_items(kind: DocumentKind, items: &[LineItem], discount_percent: f64) -> Totals {
    let lines: Vec<MoneyLine> = items
        .iter()
        .map(|item| MoneyLine::from(&normalize::to_canonical(kind, item)))
        .collect();
    compute(&lines, discount_percent)
}

pub fn to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

// stored as decimal strings so no precision is lost
impl<C> minicbor::Encode<C> for Totals {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(5)?;
        for amount in [
            self.gross_ht,
            self.discount_amount,
            self.net_ht,
            self.vat,
            self.ttc,
        ] {
            e.str(&amount.to_string())?;
        }
        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Totals {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;
        if len != Some(5) {
            return Err(minicbor::decode::Error::message("totals must hold five amounts"));
        }
        let mut amounts = [Decimal::ZERO; 5];
        for amount in amounts.iter_mut() {
            *amount = d
                .str()?
                .parse()
                .map_err(|_| minicbor::decode::Error::message("invalid decimal amount"))?;
        }
        let [gross_ht, discount_amount, net_ht, vat, ttc] = amounts;
        Ok(Totals {
            gross_ht,
            discount_amount,
            net_ht,
            vat,
            ttc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_then_vat() {
        let totals = compute(&[MoneyLine::new(3.0, 100.0)], 10.0);

        assert_eq!(totals.gross_ht, dec!(300));
        assert_eq!(totals.discount_amount, dec!(30));
        assert_eq!(totals.net_ht, dec!(270));
        assert_eq!(totals.vat, dec!(54));
        assert_eq!(totals.ttc, dec!(324));
    }

    #[test]
    fn malformed_numbers_count_as_zero() {
        let lines = [
            MoneyLine {
                quantity: None,
                unit_price: Some(10.0),
            },
            MoneyLine {
                quantity: Some(f64::NAN),
                unit_price: Some(10.0),
            },
            MoneyLine {
                quantity: Some(2.0),
                unit_price: Some(f64::INFINITY),
            },
            MoneyLine::new(1.0, 5.0),
        ];
        let totals = compute(&lines, f64::NAN);

        assert_eq!(totals.gross_ht, dec!(5));
        assert_eq!(totals.discount_amount, Decimal::ZERO);
        assert_eq!(totals.ttc, dec!(6));
    }

    #[test]
    fn out_of_range_discount_propagates() {
        let totals = compute(&[MoneyLine::new(1.0, 100.0)], 150.0);
        assert_eq!(totals.net_ht, dec!(-50));
    }

    #[test]
    fn empty_lines_total_zero() {
        assert_eq!(compute(&[], 20.0), Totals::default());
    }

    #[test]
    fn delivery_note_items_are_priced_by_delivered_quantity() {
        let items = [LineItem::new("Desk")
            .set_quantity_delivered(2.0)
            .set_unit_price(50.0)];
        let totals = compute_items(DocumentKind::DeliveryNote, &items, 0.0);
        assert_eq!(totals.gross_ht, dec!(100));
    }

    #[test]
    fn invoice_items_fall_back_to_billed_quantity() {
        let items = [
            LineItem::new("Desk").set_quantity_billed(3.0).set_unit_price(10.0),
            // a stray delivered quantity is not what an invoice bills
            LineItem::new("Chair").set_quantity_delivered(4.0).set_unit_price(10.0),
        ];
        let totals = compute_items(DocumentKind::Invoice, &items, 0.0);
        assert_eq!(totals.gross_ht, dec!(30));
    }

    #[test]
    fn totals_cbor_keeps_precision() {
        let totals = compute(&[MoneyLine::new(0.1, 0.3)], 7.5);
        let bytes = minicbor::to_vec(&totals).unwrap();
        let decoded: Totals = minicbor::decode(&bytes).unwrap();
        assert_eq!(totals, decoded);
    }
}
