//! Identifier and token generation.
//!
//! Local entities (the anonymous scene and every widget) get short
//! URL-safe ids so they survive migration into a remote scene unchanged.
//! Remote rows use UUIDs; share tokens are 32 random bytes, hex encoded.

use std::fmt::Write;

use rand::Rng;

const ALPHABET: &[u8; 64] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

pub const LOCAL_SCENE_ID_LEN: usize = 10;
pub const WIDGET_ID_LEN: usize = 8;

/// Random id of `len` characters drawn from a 64-symbol URL-safe alphabet.
#[must_use]
pub fn short_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

#[must_use]
pub fn local_scene_id() -> String {
    short_id(LOCAL_SCENE_ID_LEN)
}

#[must_use]
pub fn widget_id() -> String {
    short_id(WIDGET_ID_LEN)
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex share token.
#[must_use]
pub fn share_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}
