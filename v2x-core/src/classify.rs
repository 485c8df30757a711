//! Identify message kind from the 4-character type tag.
//!
//! The transport prepends one of three literal tags to each hex payload:
//! `0012` (MAP), `0013` (SPaT), `0014` (BSM). Classification is an exact
//! comparison; anything else is `Unknown` and must not reach the decoder.

use crate::types::{MsgKind, BSM_TAG, MAP_TAG, SPAT_TAG};

const TAG_LEN: usize = 4;

// Common prefix shared by all three tags. Receivers discard anything ahead of it.
const TAG_PREFIX: &str = "001";

/// Classify a tagged payload by its first four characters.
pub fn classify(payload: &str) -> MsgKind {
    match payload.get(..TAG_LEN) {
        Some(MAP_TAG) => MsgKind::Map,
        Some(SPAT_TAG) => MsgKind::Spat,
        Some(BSM_TAG) => MsgKind::Bsm,
        _ => MsgKind::Unknown,
    }
}

/// Remove the type tag, leaving the hex-encoded frame.
pub fn strip_tag(payload: &str) -> &str {
    payload.get(TAG_LEN..).unwrap_or("")
}

/// Normalize a received datagram to start at its type tag.
///
/// Drops trailing NULs/whitespace left in a fixed receive buffer and any
/// leading bytes before the first `001`. Returns `None` if no tag prefix exists.
pub fn locate_frame(datagram: &str) -> Option<&str> {
    let trimmed = datagram.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    let pos = trimmed.find(TAG_PREFIX)?;
    Some(&trimmed[pos..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
