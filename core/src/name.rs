use once_cell::sync::Lazy;
use sha3::{Digest, Sha3_256};
use std::collections::HashSet;

use crate::params::NetworkParams;

/// Longest name the protocol accepts, in bytes.
pub const MAX_NAME_SIZE: usize = 63;

/// SHA3-256 of the raw ASCII name, hex encoded. This is the identifier every
/// name-keyed record and covenant item uses.
pub fn hash_name(name: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Charset and length check for a candidate name: lowercase ASCII letters,
/// digits, hyphen and underscore, 1..=63 bytes. Mirrors the node's own
/// string verification, which is charset-only.
pub fn verify_string(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_SIZE {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

// Top of the reserved root-zone set. The check sits behind one function, so
// swapping in the full snapshot is a data change only.
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "com", "net", "org", "io", "dev", "app", "eth", "google", "amazon", "facebook",
        "apple", "microsoft", "twitter", "youtube", "wikipedia", "github", "bitcoin",
        "namebase", "handshake",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// Height at which a name first becomes claimable. Names roll out over 52
/// weeks; the week is derived from the first byte of the name hash.
pub fn rollout_height(name_hash_hex: &str, params: &NetworkParams) -> u32 {
    let first = u8::from_str_radix(name_hash_hex.get(0..2).unwrap_or("00"), 16).unwrap_or(0);
    let week = u32::from(first) % 52;
    params.auction_start + week * params.rollout_interval
}

/// Decode a hex-encoded covenant item into the ASCII name it carries.
pub fn name_from_item(item_hex: &str) -> Option<String> {
    let bytes = hex::decode(item_hex).ok()?;
    let name = String::from_utf8(bytes).ok()?;
    verify_string(&name).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable_hex() {
        let h = hash_name("handshake");
        assert_eq!(h.len(), 64);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(h, hash_name("handshake"));
        assert_ne!(h, hash_name("handshakf"));
    }

    #[test]
    fn string_verification() {
        assert!(verify_string("alice"));
        assert!(verify_string("a-b_c123"));
        assert!(!verify_string(""));
        assert!(!verify_string("UPPER"));
        assert!(!verify_string("with space"));
        assert!(!verify_string(&"x".repeat(64)));
        assert!(verify_string(&"x".repeat(63)));
    }

    #[test]
    fn rollout_is_bounded_by_a_year() {
        let params = NetworkParams::main();
        let h = hash_name("example");
        let height = rollout_height(&h, &params);
        assert!(height < 52 * params.rollout_interval);
    }

    #[test]
    fn decodes_names_from_covenant_items() {
        let item = hex::encode("alice");
        assert_eq!(name_from_item(&item).as_deref(), Some("alice"));
        assert_eq!(name_from_item("zz"), None);
    }
}
