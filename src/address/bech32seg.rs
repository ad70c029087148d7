//! Bech32 (witness v0) / Bech32m (witness v1+) segwit program encoding.
//!
//! Grounded on the teacher's `bech32m.rs` `BitcoinAddress` shape, generalized
//! to an arbitrary chain-configured HRP instead of a fixed mainnet/testnet/
//! regtest enum.

use crate::error::AddressError;
use bech32::{FromBase32, ToBase32, Variant};
use sha2::{Digest, Sha256};

pub fn encode(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String, AddressError> {
    if witness_version > 16 {
        return Err(AddressError::InvalidWitnessVersion);
    }
    let variant = if witness_version == 0 {
        Variant::Bech32
    } else {
        Variant::Bech32m
    };

    let mut data = vec![bech32::u5::try_from_u8(witness_version)
        .map_err(|_| AddressError::InvalidWitnessVersion)?];
    data.extend_from_slice(&program.to_base32());

    bech32::encode(hrp, &data, variant).map_err(|_| AddressError::InvalidEncoding)
}

/// Decode a bech32/bech32m address, verifying the HRP and the
/// witness-version/checksum-variant pairing (BIP173/350).
pub fn decode(address: &str, expected_hrp: &str) -> Result<(u8, Vec<u8>), AddressError> {
    let (hrp, data, variant) =
        bech32::decode(address).map_err(|_| AddressError::InvalidEncoding)?;

    if hrp != expected_hrp {
        return Err(AddressError::InvalidHrp);
    }
    if data.is_empty() {
        return Err(AddressError::InvalidEncoding);
    }

    let witness_version = data[0].to_u8();
    if witness_version > 16 {
        return Err(AddressError::InvalidWitnessVersion);
    }

    match (witness_version, variant) {
        (0, Variant::Bech32) | (1..=16, Variant::Bech32m) => {}
        _ => return Err(AddressError::UnsupportedVariant),
    }

    let program = Vec::<u8>::from_base32(&data[1..]).map_err(|_| AddressError::InvalidEncoding)?;
    match witness_version {
        0 if program.len() != 20 && program.len() != 32 => {
            return Err(AddressError::InvalidWitnessLength)
        }
        1 if program.len() != 32 => return Err(AddressError::InvalidWitnessLength),
        _ => {}
    }

    Ok((witness_version, program))
}

/// BIP341 taproot output-key tweak: `Q = P + t*G` where
/// `t = SHA256(tag ‖ tag ‖ x_only_pubkey)` and `tag = SHA256("TapTweak")`,
/// with `P` the even-Y lift of the given compressed internal key.
pub fn taproot_tweak_xonly(pubkey_compressed: &[u8; 33]) -> Result<[u8; 32], AddressError> {
    let secp = secp256k1::Secp256k1::new();
    let internal = secp256k1::PublicKey::from_slice(pubkey_compressed)
        .map_err(|_| AddressError::UnrecognizedScript)?;
    let (xonly, _parity) = internal.x_only_public_key();

    let tag = Sha256::digest(b"TapTweak");
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(tag);
    hasher.update(xonly.serialize());
    let tweak_bytes: [u8; 32] = hasher.finalize().into();

    let scalar = secp256k1::Scalar::from_be_bytes(tweak_bytes)
        .map_err(|_| AddressError::UnrecognizedScript)?;
    let (output, _parity) = xonly
        .add_tweak(&secp, &scalar)
        .map_err(|_| AddressError::UnrecognizedScript)?;

    Ok(output.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v0_roundtrip() {
        let program = [0x11u8; 20];
        let addr = encode("bc", 0, &program).unwrap();
        assert!(addr.starts_with("bc1q"));
        let (v, p) = decode(&addr, "bc").unwrap();
        assert_eq!(v, 0);
        assert_eq!(p, program);
    }

    #[test]
    fn v1_roundtrip_uses_bech32m() {
        let program = [0x22u8; 32];
        let addr = encode("bc", 1, &program).unwrap();
        assert!(addr.starts_with("bc1p"));
        let (v, p) = decode(&addr, "bc").unwrap();
        assert_eq!(v, 1);
        assert_eq!(p, program);
    }

    #[test]
    fn wrong_hrp_rejected() {
        let addr = encode("bc", 0, &[0u8; 20]).unwrap();
        assert!(decode(&addr, "tb").is_err());
    }
}
