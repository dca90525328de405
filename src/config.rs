use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::document::DocumentKind;
use crate::fingerprint::FingerprintOrder;
use crate::numbering::NumberScheme;
use crate::service::CascadeMode;

#[derive(Clone, Debug)]
pub struct LineageConfig {
    pub cascade_mode: CascadeMode,
    pub fingerprint_order: FingerprintOrder,
    pub quote_numbers: NumberScheme,
    pub purchase_order_numbers: NumberScheme,
    pub delivery_note_numbers: NumberScheme,
    pub invoice_numbers: NumberScheme,
    pub db_path: PathBuf,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            cascade_mode: CascadeMode::Chained,
            fingerprint_order: FingerprintOrder::AsListed,
            quote_numbers: NumberScheme::prefixed("DEV"),
            purchase_order_numbers: NumberScheme::prefixed("PO"),
            delivery_note_numbers: NumberScheme::prefixed("DN"),
            invoice_numbers: NumberScheme::prefixed("INV"),
            db_path: PathBuf::from("lineage.db"),
        }
    }
}

impl LineageConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let cascade_mode = match lookup("LINEAGE_CASCADE_MODE") {
            Some(value) => parse_cascade_mode(&value)?,
            None => defaults.cascade_mode,
        };
        let fingerprint_order = match lookup("LINEAGE_FINGERPRINT_ORDER") {
            Some(value) => parse_fingerprint_order(&value)?,
            None => defaults.fingerprint_order,
        };
        let quote_numbers = lookup("LINEAGE_PREFIX_QUOTE")
            .map(|value| parse_scheme(&value))
            .unwrap_or(defaults.quote_numbers);
        let purchase_order_numbers = lookup("LINEAGE_PREFIX_PO")
            .map(|value| parse_scheme(&value))
            .unwrap_or(defaults.purchase_order_numbers);
        let delivery_note_numbers = lookup("LINEAGE_PREFIX_DN")
            .map(|value| parse_scheme(&value))
            .unwrap_or(defaults.delivery_note_numbers);
        let invoice_numbers = lookup("LINEAGE_PREFIX_INVOICE")
            .map(|value| parse_scheme(&value))
            .unwrap_or(defaults.invoice_numbers);
        let db_path = lookup("LINEAGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        Ok(Self {
            cascade_mode,
            fingerprint_order,
            quote_numbers,
            purchase_order_numbers,
            delivery_note_numbers,
            invoice_numbers,
            db_path,
        })
    }

    pub fn numbering(&self, kind: DocumentKind) -> &NumberScheme {
        match kind {
            DocumentKind::Quote => &self.quote_numbers,
            DocumentKind::PurchaseOrder => &self.purchase_order_numbers,
            DocumentKind::DeliveryNote => &self.delivery_note_numbers,
            DocumentKind::Invoice => &self.invoice_numbers,
        }
    }
}

fn parse_cascade_mode(value: &str) -> Result<CascadeMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "chained" => Ok(CascadeMode::Chained),
        "fanned" => Ok(CascadeMode::Fanned),
        other => bail!("LINEAGE_CASCADE_MODE must be `chained` or `fanned`, got `{other}`"),
    }
}

fn parse_fingerprint_order(value: &str) -> Result<FingerprintOrder> {
    match value.trim().to_ascii_lowercase().as_str() {
        "listed" => Ok(FingerprintOrder::AsListed),
        "line_uid" => Ok(FingerprintOrder::ByLineUid),
        other => bail!("LINEAGE_FINGERPRINT_ORDER must be `listed` or `line_uid`, got `{other}`"),
    }
}

fn parse_scheme(value: &str) -> NumberScheme {
    let value = value.trim();
    if value.eq_ignore_ascii_case("bare") {
        NumberScheme::Bare
    } else {
        NumberScheme::prefixed(value)
    }
}
