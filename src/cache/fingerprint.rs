//! Content fingerprints for raw image bytes

use sha2::{Digest, Sha256};

/// Length of a hex-encoded fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Hex-encoded SHA-256 digest of the full byte sequence
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether `candidate` has the shape of a fingerprint (lowercase hex of the
/// right length). Used to reject path-like keys before touching the disk.
pub fn is_fingerprint(candidate: &str) -> bool {
    candidate.len() == FINGERPRINT_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
