//! SHA-256 checksum utility for change detection.

use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of raw bytes
pub fn compute_checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
