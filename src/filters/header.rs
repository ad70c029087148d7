//! BIP157 filter-header chain: single-SHA-256 chaining, corrected from the
//! teacher's deleted `bip157.rs` (which double-SHA-256'd the chain entries).

use sha2::{Digest, Sha256};

pub fn filter_hash(filter_bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(filter_bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `hash = SHA256(filter_hash ‖ prev_filter_header)`.
pub fn chain_hash(filter_hash: &[u8; 32], prev_filter_header: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(filter_hash);
    data.extend_from_slice(prev_filter_header);
    let digest = Sha256::digest(&data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_hash_depends_on_both_inputs() {
        let fh = filter_hash(b"filter-bytes");
        let a = chain_hash(&fh, &[0u8; 32]);
        let b = chain_hash(&fh, &[1u8; 32]);
        assert_ne!(a, b);
    }
}
