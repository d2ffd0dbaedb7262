use sha2::{Digest, Sha256};
use std::fmt::Write;

/// First `len` lowercase hex chars of the SHA-256 of `data` (at most 64).
pub fn short_digest(data: &[u8], len: usize) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(hex, "{b:02x}");
    }
    hex.truncate(len.min(64));
    hex
}
