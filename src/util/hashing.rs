//! Hash helpers for deriving store keys.

use md5::{Digest, Md5};

/// Derives the suppression cache key for a normalized relative path.
///
/// The key is the lowercase hex MD5 of the path bytes, 32 characters long.
/// Existing caches are keyed this way, so the derivation must not change.
pub fn path_key(relative_path: &str) -> String {
    format!("{:x}", Md5::digest(relative_path.as_bytes()))
}
