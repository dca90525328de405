//! Document lineage for quotes, purchase orders, delivery notes and invoices.
//!
//! A quote is fingerprinted and cascaded into derived documents exactly once;
//! later edits upstream are detected by comparing fingerprints and reconciled
//! line by line through `line_uid`.

pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod money;
pub mod normalize;
pub mod numbering;
pub mod reconcile;
pub mod service;
pub mod sled_store;
pub mod store;
pub mod utils;
