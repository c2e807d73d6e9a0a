//! Content digest shared by every part of an archive.
//!
//! MD5 is kept for compatibility with existing `.ira` files.  It guards
//! against corruption and mismatched part sets, not against tampering.

use md5::{Digest, Md5};

/// Lowercase hex MD5 of `data`.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
