//! Identifier helpers
//!
//! Document ids and line uids are uuid7 values rendered as Bech32m under a
//! prefix naming what they identify (`quote_1…`, `line_1…`), so a misplaced
//! id is recognisable at a glance.

use anyhow::Context;
use bech32::{Bech32m, Hrp};
use uuid7::{Uuid, uuid7};

/// Render `uuid` under the prefix `hrp`.
pub fn encode_id(hrp: &str, uuid: &Uuid) -> anyhow::Result<String> {
    let prefix = Hrp::parse(hrp).with_context(|| format!("invalid id prefix {hrp:?}"))?;
    Ok(bech32::encode::<Bech32m>(prefix, uuid.as_bytes())?)
}

/// A fresh id under one of the crate's constant prefixes. Should a prefix
/// ever fail to parse the bare uuid is used instead.
pub fn new_id(hrp: &str) -> String {
    let uuid = uuid7();
    encode_id(hrp, &uuid).unwrap_or_else(|_| uuid.to_string())
}

/// Stable identity for a line, assigned once and carried across every derived document.
pub fn new_line_uid() -> String {
    new_id("line_")
}
