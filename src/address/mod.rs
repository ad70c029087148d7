//! Address codec: Base58Check (P2PKH/P2SH-segwit), Bech32 (P2WPKH), and
//! Bech32m (P2TR), with the inverse `address_to_script`.
//!
//! Grounded on the teacher's `bech32m.rs` (`BitcoinAddress`/`Network::hrp`
//! shape) for the witness-program half; Base58Check has no analogue in the
//! teacher or pack at file granularity and is hand-rolled here using only
//! `sha2`/`ripemd`, both already in the teacher's dependency table.

mod base58;
mod bech32seg;

pub use base58::{base58check_decode, base58check_encode};

use crate::config::ChainParams;
use crate::error::AddressError;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd);
    out
}

/// The four address families named in the spec's data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    P2pkh,
    P2shSegwit,
    P2wpkh,
    P2tr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script(pub Vec<u8>);

/// Derive the address string for a compressed pubkey, per spec §4.6.
pub fn derive_address(
    pubkey_compressed: &[u8; 33],
    kind: AddressType,
    params: &ChainParams,
) -> Result<String, AddressError> {
    match kind {
        AddressType::P2pkh => {
            let h = hash160(pubkey_compressed);
            let mut payload = vec![params.pubkey_address_prefix];
            payload.extend_from_slice(&h);
            Ok(base58check_encode(&payload))
        }
        AddressType::P2shSegwit => {
            let pubkey_hash = hash160(pubkey_compressed);
            let mut redeem_script = vec![0x00, 0x14];
            redeem_script.extend_from_slice(&pubkey_hash);
            let script_hash = hash160(&redeem_script);
            let mut payload = vec![params.script_address_prefix];
            payload.extend_from_slice(&script_hash);
            Ok(base58check_encode(&payload))
        }
        AddressType::P2wpkh => {
            let h = hash160(pubkey_compressed);
            bech32seg::encode(&params.bech32_hrp, 0, &h)
        }
        AddressType::P2tr => {
            let tweaked = bech32seg::taproot_tweak_xonly(pubkey_compressed)?;
            bech32seg::encode(&params.bech32_hrp, 1, &tweaked)
        }
    }
}

/// Decode an address string back to its scriptPubKey bytes (the inverse of
/// [`derive_address`]), trying Bech32/Bech32m first and falling back to
/// Base58Check.
pub fn address_to_script(address: &str, params: &ChainParams) -> Result<Script, AddressError> {
    if let Ok((version, program)) = bech32seg::decode(address, &params.bech32_hrp) {
        let mut script = Vec::with_capacity(2 + program.len());
        script.push(witness_version_opcode(version));
        script.push(program.len() as u8);
        script.extend_from_slice(&program);
        return Ok(Script(script));
    }

    let payload = base58check_decode(address)?;
    if payload.is_empty() {
        return Err(AddressError::UnrecognizedScript);
    }
    let prefix = payload[0];
    let hash = &payload[1..];
    if hash.len() != 20 {
        return Err(AddressError::UnrecognizedScript);
    }
    if prefix == params.pubkey_address_prefix {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(hash);
        script.extend_from_slice(&[0x88, 0xac]);
        Ok(Script(script))
    } else if prefix == params.script_address_prefix {
        let mut script = vec![0xa9, 0x14];
        script.extend_from_slice(hash);
        script.push(0x87);
        Ok(Script(script))
    } else {
        Err(AddressError::UnrecognizedScript)
    }
}

fn witness_version_opcode(version: u8) -> u8 {
    if version == 0 {
        0x00
    } else {
        0x50 + version // OP_1..OP_16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2wpkh_roundtrip() {
        let params = ChainParams::default();
        let pubkey = [0x02; 33];
        let addr = derive_address(&pubkey, AddressType::P2wpkh, &params).unwrap();
        assert!(addr.starts_with("bc1q"));
        let script = address_to_script(&addr, &params).unwrap();
        assert_eq!(script.0[0], 0x00);
        assert_eq!(script.0[1], 20);
    }

    #[test]
    fn p2tr_roundtrip() {
        let params = ChainParams::default();
        // x-coordinate must be a valid curve point; use generator * 1 serialized compressed.
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[1u8; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let pubkey = pk.serialize();
        let addr = derive_address(&pubkey, AddressType::P2tr, &params).unwrap();
        assert!(addr.starts_with("bc1p"));
        let script = address_to_script(&addr, &params).unwrap();
        assert_eq!(script.0[0], 0x51);
        assert_eq!(script.0[1], 32);
    }

    #[test]
    fn p2pkh_roundtrip() {
        let params = ChainParams::default();
        let pubkey = [0x03; 33];
        let addr = derive_address(&pubkey, AddressType::P2pkh, &params).unwrap();
        let script = address_to_script(&addr, &params).unwrap();
        assert_eq!(script.0[0], 0x76);
    }
}
