//! Fixed-size block header record and the hash-rule cutover logic.
//!
//! Grounded on the teacher's deleted `storage/chainstate.rs` idiom of
//! computing a header hash by re-serializing the canonical fields before
//! double-SHA-256, generalized here to the chain's configurable
//! `header_length` and three-era hash rule.

use crate::config::ChainParams;
use sha2::{Digest, Sha256};

/// A parsed block header. The canonical 80 Bitcoin-compatible fields plus an
/// opaque trailing proof blob whose length is `header_length - 80`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub proof_blob: Vec<u8>,
}

impl BlockHeader {
    /// Parse a fixed-width raw header record per `params.header_length`.
    pub fn parse(raw: &[u8], params: &ChainParams) -> Option<Self> {
        if raw.len() != params.header_length as usize {
            return None;
        }
        let mut r = crate::codec::Reader::new(raw);
        let version = r.read_u32_le().ok()?;
        let prev_hash = r.read_array::<32>().ok()?;
        let merkle_root = r.read_array::<32>().ok()?;
        let timestamp = r.read_u32_le().ok()?;
        let bits = r.read_u32_le().ok()?;
        let nonce = r.read_u32_le().ok()?;
        let proof_blob = r.read_bytes(r.remaining()).ok()?.to_vec();

        Some(Self { version, prev_hash, merkle_root, timestamp, bits, nonce, proof_blob })
    }

    /// Re-serialize to the fixed-width on-wire/on-disk record.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(80 + self.proof_blob.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.proof_blob);
        out
    }

    /// Header identity hash, per the chain's timestamp-gated hash rule
    /// (§6 "Header hash rules"):
    /// - `t <= T1`: single SHA-256 of the proof blob only.
    /// - `T1 < t <= T2`: double SHA-256 of the full serialized header.
    /// - `t > T2`: single SHA-256 of the full serialized header.
    pub fn hash(&self, params: &ChainParams) -> [u8; 32] {
        if self.timestamp <= params.t1 {
            let digest = Sha256::digest(&self.proof_blob);
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        } else {
            let serialized = self.serialize();
            if self.timestamp <= params.t2 {
                let first = Sha256::digest(&serialized);
                let second = Sha256::digest(first);
                let mut out = [0u8; 32];
                out.copy_from_slice(&second);
                out
            } else {
                let digest = Sha256::digest(&serialized);
                let mut out = [0u8; 32];
                out.copy_from_slice(&digest);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: [0u8; 32],
            merkle_root: [1u8; 32],
            timestamp,
            bits: 0x1d00ffff,
            nonce: 0,
            proof_blob: vec![],
        }
    }

    #[test]
    fn parse_serialize_roundtrip() {
        let params = ChainParams::default();
        let header = sample(100);
        let raw = header.serialize();
        assert_eq!(raw.len(), params.header_length as usize);
        let parsed = BlockHeader::parse(&raw, &params).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn hash_rule_switches_at_cutovers() {
        let mut params = ChainParams::default();
        params.t1 = 50;
        params.t2 = 150;

        let h_early = sample(10);
        let h_mid = sample(100);
        let h_late = sample(200);

        assert_ne!(h_early.hash(&params), h_mid.hash(&params));
        assert_ne!(h_mid.hash(&params), h_late.hash(&params));
    }

    #[test]
    fn rejects_wrong_width() {
        let params = ChainParams::default();
        assert!(BlockHeader::parse(&[0u8; 40], &params).is_none());
    }
}
