//! Documents, line items and the references that chain them together
use crate::money::Totals;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    #[n(0)]
    Quote,
    #[n(1)]
    PurchaseOrder,
    #[n(2)]
    DeliveryNote,
    #[n(3)]
    Invoice,
}

impl DocumentKind {
    /// Human readable prefix of ids minted for this kind.
    pub fn hrp(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote_",
            DocumentKind::PurchaseOrder => "po_",
            DocumentKind::DeliveryNote => "dn_",
            DocumentKind::Invoice => "inv_",
        }
    }
    pub fn table(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::DeliveryNote => "delivery_note",
            DocumentKind::Invoice => "invoice",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Quote => "quote",
            DocumentKind::PurchaseOrder => "purchase order",
            DocumentKind::DeliveryNote => "delivery note",
            DocumentKind::Invoice => "invoice",
        };
        f.write_str(name)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentStatus {
    #[n(0)]
    #[default]
    Draft,
    #[n(1)]
    Accepted,
    #[n(2)]
    Sent,
    #[n(3)]
    Delivered,
    #[n(4)]
    Paid,
    #[n(5)]
    Cancelled,
}

/// Points at a document of a given kind, used for lineage edges.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    #[n(0)]
    pub kind: DocumentKind,
    #[n(1)]
    pub id: String,
}

impl DocumentRef {
    pub fn new(kind: DocumentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// Quantities are kept under the field name each kind natively uses,
// see `normalize` for how they are read back.
#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Default, PartialEq,
)]
pub struct LineItem {
    #[n(0)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_uid: Option<String>,
    #[n(1)]
    #[serde(default)]
    pub description: String,
    #[n(2)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[n(3)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[n(4)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_delivered: Option<f64>,
    #[n(5)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_billed: Option<f64>,
    #[n(6)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[n(7)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl LineItem {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Self::default()
        }
    }
    pub fn set_line_uid(mut self, line_uid: &str) -> Self {
        self.line_uid = Some(line_uid.to_string());
        self
    }
    pub fn set_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
    pub fn set_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }
    pub fn set_quantity_delivered(mut self, quantity: f64) -> Self {
        self.quantity_delivered = Some(quantity);
        self
    }
    pub fn set_quantity_billed(mut self, quantity: f64) -> Self {
        self.quantity_billed = Some(quantity);
        self
    }
    pub fn set_unit_price(mut self, price: f64) -> Self {
        self.unit_price = Some(price);
        self
    }
    pub fn set_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }
    pub fn line_uid(&self) -> Option<&str> {
        self.line_uid.as_deref()
    }
}

/// A quote, purchase order, delivery note or invoice together with its items.
///
/// `content_hash` fingerprints this document's own items. `upstream_hash_at_sync`
/// fingerprints the items of `source` as they were when this document last
/// copied from it; the two disagreeing with the upstream's current items is the
/// only staleness signal.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Document {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub kind: DocumentKind,
    #[n(2)]
    pub number: String,
    #[n(3)]
    pub status: DocumentStatus,
    #[n(4)]
    pub date: TimeStamp<Utc>,
    #[n(5)]
    pub client_id: Option<String>,
    #[n(6)]
    pub workspace_id: Option<String>,
    #[n(7)]
    pub discount_percent: f64,
    #[n(8)]
    pub content_hash: Option<String>,
    #[n(9)]
    pub upstream_hash_at_sync: Option<String>,
    #[n(10)]
    pub source: Option<DocumentRef>,
    #[n(11)]
    pub totals: Option<Totals>,
    #[n(12)]
    pub items: Vec<LineItem>,
}

impl Document {
    /// Construct a draft, identifiers and number are assigned when it is persisted.
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            id: String::new(),
            kind,
            number: String::new(),
            status: DocumentStatus::Draft,
            date: TimeStamp::new(),
            client_id: None,
            workspace_id: None,
            discount_percent: 0.0,
            content_hash: None,
            upstream_hash_at_sync: None,
            source: None,
            totals: None,
            items: vec![],
        }
    }
    /// A draft of `kind` derived from `source`, inheriting its parties and discount.
    pub fn derived_from(kind: DocumentKind, source: &Document) -> Self {
        Self {
            client_id: source.client_id.clone(),
            workspace_id: source.workspace_id.clone(),
            discount_percent: source.discount_percent,
            source: Some(source.reference()),
            ..Self::new(kind)
        }
    }
    pub fn set_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }
    pub fn set_workspace(mut self, workspace_id: &str) -> Self {
        self.workspace_id = Some(workspace_id.to_string());
        self
    }
    pub fn set_discount_percent(mut self, percent: f64) -> Self {
        self.discount_percent = percent;
        self
    }
    pub fn set_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.date = date;
        self
    }
    pub fn push_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }
    pub fn set_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }
    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.kind, self.id.clone())
    }
    /// The header as persisted, items live in their own rows.
    pub fn header(&self) -> Self {
        Self {
            items: vec![],
            ..self.clone()
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

// stored as [seconds, subsecond nanos] so every date chrono can hold fits
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .i64(self.0.timestamp())?
            .u32(self.0.timestamp_subsec_nanos())?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "timestamp must be [seconds, nanos]",
            ));
        }
        let seconds = d.i64()?;
        let nanos = d.u32()?;
        DateTime::from_timestamp(seconds, nanos)
            .map(TimeStamp)
            .ok_or_else(|| minicbor::decode::Error::message("timestamp out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn dates_outside_the_nanosecond_range_survive_storage() {
        // 1600 is before the earliest instant an i64 of nanos can express
        let early = TimeStamp::new_with(1600, 3, 1).unwrap();
        let late = TimeStamp::new_with(2400, 12, 31).unwrap();

        for original in [early, late] {
            let encoding = minicbor::to_vec(&original).unwrap();
            let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();
            assert_eq!(original, decode);
        }
    }

    #[test]
    fn bare_integer_timestamp_is_rejected() {
        let encoding = minicbor::to_vec(1_700_000_000_i64).unwrap();
        assert!(minicbor::decode::<TimeStamp<Utc>>(&encoding).is_err());
    }

    #[test]
    fn derived_document_inherits_parties_and_discount() {
        let mut quote = Document::new(DocumentKind::Quote)
            .set_client("client_a")
            .set_workspace("ws_1")
            .set_discount_percent(12.5);
        quote.id = "quote_1xyz".into();

        let po = Document::derived_from(DocumentKind::PurchaseOrder, &quote);

        assert_eq!(po.client_id.as_deref(), Some("client_a"));
        assert_eq!(po.workspace_id.as_deref(), Some("ws_1"));
        assert_eq!(po.discount_percent, 12.5);
        assert_eq!(po.source, Some(quote.reference()));
        assert_eq!(po.status, DocumentStatus::Draft);
        assert!(po.items.is_empty());
    }

    #[test]
    fn header_drops_items() {
        let doc = Document::new(DocumentKind::Quote).push_item(LineItem::new("Desk"));
        assert!(doc.header().items.is_empty());
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn line_item_serialization_omits_absent_fields() {
        let item = LineItem::new("Chair").set_line_uid("L1").set_quantity(2.0);
        let json = serde_json::to_value(&item).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["description", "line_uid", "quantity"]);
    }
}
