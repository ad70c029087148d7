//! Base58Check encoding, used by legacy P2PKH and nested P2SH-segwit
//! addresses. Hand-rolled: no crate in the teacher's dependency table covers
//! this, and the alphabet/checksum logic is small enough that adding an
//! otherwise-unused dependency would be the worse tradeoff.

use crate::error::AddressError;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn checksum(payload: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second[..4]);
    out
}

pub fn base58check_encode(payload: &[u8]) -> String {
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum(payload));
    base58_encode(&data)
}

pub fn base58check_decode(s: &str) -> Result<Vec<u8>, AddressError> {
    let data = base58_decode(s)?;
    if data.len() < 4 {
        return Err(AddressError::InvalidBase58);
    }
    let (payload, check) = data.split_at(data.len() - 4);
    if checksum(payload) != check {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

fn base58_encode(data: &[u8]) -> String {
    let leading_zeros = data.iter().take_while(|&&b| b == 0).count();

    let mut digits: Vec<u8> = vec![0];
    for &byte in data {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = vec![ALPHABET[0]; leading_zeros];
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize]));
    String::from_utf8(out).expect("alphabet is ASCII")
}

fn base58_decode(s: &str) -> Result<Vec<u8>, AddressError> {
    let leading_zeros = s.chars().take_while(|&c| c == '1').count();

    let mut bytes: Vec<u8> = vec![0];
    for c in s.chars() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or(AddressError::InvalidBase58)? as u32;
        let mut carry = digit;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; leading_zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload = [0x00u8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let encoded = base58check_encode(&payload);
        let decoded = base58check_decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut encoded = base58check_encode(&[0u8; 21]);
        encoded.push('x');
        assert!(base58check_decode(&encoded).is_err());
    }
}
