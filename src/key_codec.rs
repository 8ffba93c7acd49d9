//! Key Codec Module
//!
//! Derives deterministic cache keys from arbitrary ordered inputs and maps
//! a key plus part index to the on-disk part file name.

use std::fmt::Display;

/// Separator between the key and the part index in a part file name.
///
/// Keys produced by [`make_key`] are lowercase hex and can never contain it.
/// Caller-supplied keys must avoid a trailing `.<digits>` suffix, which would
/// collide with the part naming scheme.
pub const PART_SEPARATOR: char = '.';

/// Derive a cache key from an ordered sequence of input values.
///
/// Each value's textual form is fed into a single BLAKE3 hasher and the
/// digest is returned as lowercase hex. The same ordered inputs always yield
/// the same key; the ordering of inputs is significant. Hash collisions are
/// accepted as residual risk rather than defended against.
pub fn make_key<I>(parts: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.to_string().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Build the file name for one part of an entry.
pub fn part_name(key: &str, part: u32) -> String {
    format!("{}{}{}", key, PART_SEPARATOR, part)
}
