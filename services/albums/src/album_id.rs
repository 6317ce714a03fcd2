//! Short opaque identifiers for albums and storage keys.

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of an external album identifier
pub const ALBUM_ID_LEN: usize = 8;

/// Generate a new external album identifier.
///
/// Eight symbols drawn uniformly from `[a-z0-9]`. Collisions are not checked
/// here; the unique index on the store rejects the rare duplicate insert.
pub fn generate_album_id() -> String {
    random_token(&mut rand::thread_rng(), ALBUM_ID_LEN)
}

/// Random lowercase alphanumeric token of `len` symbols
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Whether `id` has the shape of a generated album identifier
pub fn is_valid_album_id(id: &str) -> bool {
    id.len() == ALBUM_ID_LEN && id.bytes().all(|b| ALPHABET.contains(&b))
}
