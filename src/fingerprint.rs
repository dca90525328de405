//! Deterministic content hashes used as idempotency and staleness keys
//!
//! A value is lowered to JSON, re-encoded as CBOR with object keys sorted and
//! integral floats folded into integers, then digested with SHA-256. Key order
//! never matters, array order always does.
use crate::document::LineItem;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Fingerprint of `null`, `[]` and `{}`: the SHA-256 of empty input.
pub const EMPTY_FINGERPRINT: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintOrder {
    /// Items hash in the order they are listed, a reorder reads as a change.
    #[default]
    AsListed,
    /// Items are sorted by `line_uid` first, a reorder is invisible.
    ByLineUid,
}

pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> String {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "value cannot be fingerprinted, using the empty sentinel");
            return EMPTY_FINGERPRINT.to_string();
        }
    };
    if is_empty(&value) {
        return EMPTY_FINGERPRINT.to_string();
    }

    let mut e = minicbor::Encoder::new(Vec::new());
    encode_canonical(&value, &mut e);
    let bytes = e.into_writer();

    sha256::digest(&bytes)
}

pub fn fingerprint_items(items: &[LineItem], order: FingerprintOrder) -> String {
    match order {
        FingerprintOrder::AsListed => fingerprint(items),
        FingerprintOrder::ByLineUid => {
            let mut sorted: Vec<&LineItem> = items.iter().collect();
            // stable, so items sharing a uid (or lacking one) keep their relative order
            sorted.sort_by(|a, b| a.line_uid.cmp(&b.line_uid));
            fingerprint(&sorted)
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// Writes into a Vec, which cannot fail, so encoder results are dropped.
fn encode_canonical(value: &Value, e: &mut minicbor::Encoder<Vec<u8>>) {
    match value {
        Value::Null => {
            let _ = e.null();
        }
        Value::Bool(b) => {
            let _ = e.bool(*b);
        }
        Value::Number(n) => encode_number(n, e),
        Value::String(s) => {
            let _ = e.str(s);
        }
        Value::Array(items) => {
            let _ = e.array(items.len() as u64);
            for item in items {
                encode_canonical(item, e);
            }
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let _ = e.map(entries.len() as u64);
            for (key, value) in entries {
                let _ = e.str(key);
                encode_canonical(value, e);
            }
        }
    }
}

fn encode_number(n: &serde_json::Number, e: &mut minicbor::Encoder<Vec<u8>>) {
    if let Some(u) = n.as_u64() {
        let _ = e.u64(u);
    } else if let Some(i) = n.as_i64() {
        let _ = e.i64(i);
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            let whole = f as i64;
            if whole >= 0 {
                let _ = e.u64(whole as u64);
            } else {
                let _ = e.i64(whole);
            }
        } else {
            let _ = e.f64(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"y":2,"x":[1,2]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":{"x":[1,2],"y":2},"a":1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(fingerprint(&json!([1, 2])), fingerprint(&json!([2, 1])));
    }

    #[test]
    fn empty_inputs_use_sentinel() {
        assert_eq!(fingerprint(&Value::Null), EMPTY_FINGERPRINT);
        assert_eq!(fingerprint(&json!([])), EMPTY_FINGERPRINT);
        assert_eq!(fingerprint(&json!({})), EMPTY_FINGERPRINT);
        assert_eq!(fingerprint_items(&[], FingerprintOrder::AsListed), EMPTY_FINGERPRINT);
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = fingerprint(&json!({"a": 1}));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn integral_floats_match_integers() {
        assert_eq!(fingerprint(&json!({"q": 2})), fingerprint(&json!({"q": 2.0})));
        assert_ne!(fingerprint(&json!({"q": 2})), fingerprint(&json!({"q": 2.5})));
    }

    #[test]
    fn uid_ordering_ignores_reorder() {
        let a = LineItem::new("a").set_line_uid("A").set_quantity(1.0);
        let b = LineItem::new("b").set_line_uid("B").set_quantity(2.0);
        let listed = [a.clone(), b.clone()];
        let swapped = [b, a];

        assert_ne!(
            fingerprint_items(&listed, FingerprintOrder::AsListed),
            fingerprint_items(&swapped, FingerprintOrder::AsListed)
        );
        assert_eq!(
            fingerprint_items(&listed, FingerprintOrder::ByLineUid),
            fingerprint_items(&swapped, FingerprintOrder::ByLineUid)
        );
    }
}
