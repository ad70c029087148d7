//! BIP143 P2WPKH sighash, RFC6979-deterministic ECDSA signing, and DER
//! encoding via the `secp256k1` crate directly (the teacher's own choice for
//! all curve arithmetic — never hand-rolled here).

use crate::codec::write_varint;
use crate::error::SignerError;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

pub struct SighashInput {
    pub prev_txid_wire: [u8; 32],
    pub prev_vout: u32,
    pub sequence: u32,
}

pub struct SighashOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn p2pkh_script_code(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut out = vec![0x76, 0xa9, 0x14];
    out.extend_from_slice(pubkey_hash);
    out.extend_from_slice(&[0x88, 0xac]);
    out
}

/// BIP143 sighash preimage + digest for input `index`, a P2WPKH input.
pub fn compute_sighash(
    version: u32,
    inputs: &[SighashInput],
    outputs: &[SighashOutput],
    index: usize,
    input_value: u64,
    pubkey_hash: &[u8; 20],
    locktime: u32,
) -> [u8; 32] {
    let mut prevouts = Vec::with_capacity(inputs.len() * 36);
    let mut sequences = Vec::with_capacity(inputs.len() * 4);
    for input in inputs {
        prevouts.extend_from_slice(&input.prev_txid_wire);
        prevouts.extend_from_slice(&input.prev_vout.to_le_bytes());
        sequences.extend_from_slice(&input.sequence.to_le_bytes());
    }
    let hash_prevouts = double_sha256(&prevouts);
    let hash_sequence = double_sha256(&sequences);

    let mut outputs_ser = Vec::new();
    for output in outputs {
        outputs_ser.extend_from_slice(&output.value.to_le_bytes());
        write_varint(&mut outputs_ser, output.script_pubkey.len() as u64);
        outputs_ser.extend_from_slice(&output.script_pubkey);
    }
    let hash_outputs = double_sha256(&outputs_ser);

    let script_code = p2pkh_script_code(pubkey_hash);
    let input = &inputs[index];

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    preimage.extend_from_slice(&input.prev_txid_wire);
    preimage.extend_from_slice(&input.prev_vout.to_le_bytes());
    write_varint(&mut preimage, script_code.len() as u64);
    preimage.extend_from_slice(&script_code);
    preimage.extend_from_slice(&input_value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&locktime.to_le_bytes());
    preimage.extend_from_slice(&1u32.to_le_bytes()); // SIGHASH_ALL

    double_sha256(&preimage)
}

/// Minimal DER encoding of `(r, s)`, already low-S normalized by
/// `secp256k1`'s default signing (this crate never produces high-S).
fn der_encode(sig: &Signature) -> Vec<u8> {
    let compact = sig.serialize_compact();
    let r = &compact[..32];
    let s = &compact[32..];

    fn encode_scalar(bytes: &[u8]) -> Vec<u8> {
        let mut trimmed: &[u8] = bytes;
        while trimmed.len() > 1 && trimmed[0] == 0 && trimmed[1] < 0x80 {
            trimmed = &trimmed[1..];
        }
        let mut out = Vec::new();
        if trimmed[0] & 0x80 != 0 {
            out.push(0x00);
        }
        out.extend_from_slice(trimmed);
        out
    }

    let r_enc = encode_scalar(r);
    let s_enc = encode_scalar(s);

    let mut body = Vec::new();
    body.push(0x02);
    body.push(r_enc.len() as u8);
    body.extend_from_slice(&r_enc);
    body.push(0x02);
    body.push(s_enc.len() as u8);
    body.extend_from_slice(&s_enc);

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(0x30);
    out.push(body.len() as u8);
    out.extend_from_slice(&body);
    out
}

/// Sign a BIP143 sighash, append the `SIGHASH_ALL` type byte, and verify the
/// signature before returning it (defense-in-depth per §4.10).
pub fn sign_sighash(
    secp: &Secp256k1<secp256k1::All>,
    secret_key: &SecretKey,
    sighash: &[u8; 32],
) -> Result<Vec<u8>, SignerError> {
    let message = Message::from_digest_slice(sighash)?;
    let signature = secp.sign_ecdsa(&message, secret_key);

    let public_key = PublicKey::from_secret_key(secp, secret_key);
    secp.verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| SignerError::VerificationFailed)?;

    let mut der = der_encode(&signature);
    der.push(0x01); // SIGHASH_ALL
    Ok(der)
}

/// Witness stack for a signed P2WPKH input: `[sig_with_hashtype, pubkey]`.
pub fn witness_stack(sig_with_hashtype: Vec<u8>, pubkey_compressed: [u8; 33]) -> Vec<Vec<u8>> {
    vec![sig_with_hashtype, pubkey_compressed.to_vec()]
}
