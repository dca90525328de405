//! Human readable document numbers
//!
//! Numbers are derived by scanning what already exists, so two callers racing
//! on the same `(prefix, year)` bucket can mint the same number. Callers must
//! serialize number assignment (single writer or an advisory lock).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberScheme {
    /// `{prefix}-{year}-{0000}`
    Prefixed { prefix: String },
    /// A bare incrementing counter.
    Bare,
}

impl NumberScheme {
    pub fn prefixed(prefix: &str) -> Self {
        Self::Prefixed {
            prefix: prefix.to_string(),
        }
    }
    /// `existing` must be in creation order.
    pub fn next(&self, existing: &[String], year: i32) -> String {
        match self {
            NumberScheme::Prefixed { prefix } => next_number(existing, prefix, year),
            NumberScheme::Bare => next_counter(existing),
        }
    }
}

/// Next `{prefix}-{year}-{0000}` after the most recent well-formed number of the bucket.
pub fn next_number(existing: &[String], prefix: &str, year: i32) -> String {
    let bucket = format!("{prefix}-{year}-");
    let next = existing
        .iter()
        .rev()
        .filter_map(|number| number.strip_prefix(&bucket))
        .find_map(successor)
        .unwrap_or(1);

    format!("{bucket}{next:04}")
}

pub fn next_counter(existing: &[String]) -> String {
    existing
        .iter()
        .rev()
        .find_map(|number| successor(number.trim()))
        .unwrap_or(1)
        .to_string()
}

// a counter with no successor counts as malformed
fn successor(counter: &str) -> Option<u64> {
    counter.parse::<u64>().ok()?.checked_add(1)
}
