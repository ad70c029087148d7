//! Block/tx parser: segwit-aware txid computation and target-script
//! matching, used to turn a filter-matched block into UTXO/spent-outpoint
//! deltas.
//!
//! Grounded on the pack's `NetworkMessage`/tx-shape conventions (varint
//! counts, little-endian scalars) generalized to this crate's own
//! [`crate::codec::Reader`].

use crate::codec::{write_varint, Reader};
use crate::error::WireError;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outpoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedOutput {
    pub txid: [u8; 32],
    pub vout: u32,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockExtraction {
    pub spent: Vec<Outpoint>,
    pub matched_outputs: Vec<MatchedOutput>,
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn reversed(mut hash: [u8; 32]) -> [u8; 32] {
    hash.reverse();
    hash
}

struct ParsedInput {
    prev_txid: [u8; 32],
    prev_vout: u32,
}

/// Parse a single transaction starting at the reader's current position,
/// returning its txid and the non-witness/witness slices needed for hashing.
fn parse_tx(r: &mut Reader) -> Result<(Vec<u8>, [u8; 32], Vec<ParsedInput>, Vec<(u64, Vec<u8>)>), WireError> {
    let version = r.read_u32_le()?;

    let mut has_witness = false;
    let checkpoint = r.position();
    if r.remaining() >= 2 {
        let marker = r.read_u8()?;
        let flag = r.read_u8()?;
        if marker == 0x00 && flag == 0x01 {
            has_witness = true;
        } else {
            r.seek(checkpoint);
        }
    }
    parse_tx_from(r, version, has_witness)
}

fn parse_tx_from(
    r: &mut Reader,
    version: u32,
    has_witness: bool,
) -> Result<(Vec<u8>, [u8; 32], Vec<ParsedInput>, Vec<(u64, Vec<u8>)>), WireError> {
    let in_count = r.read_varint()?;
    let mut inputs = Vec::with_capacity(in_count as usize);
    let mut non_witness_inputs = Vec::new();

    for _ in 0..in_count {
        let prev_txid_wire = r.read_array::<32>()?;
        let prev_vout = r.read_u32_le()?;
        let script_sig = r.read_varstr()?;
        let sequence = r.read_u32_le()?;

        let mut entry = Vec::with_capacity(32 + 4 + 1 + script_sig.len() + 4);
        entry.extend_from_slice(&prev_txid_wire);
        entry.extend_from_slice(&prev_vout.to_le_bytes());
        write_varint(&mut entry, script_sig.len() as u64);
        entry.extend_from_slice(&script_sig);
        entry.extend_from_slice(&sequence.to_le_bytes());
        non_witness_inputs.push(entry);

        inputs.push(ParsedInput { prev_txid: prev_txid_wire, prev_vout });
    }

    let out_count = r.read_varint()?;
    let mut outputs = Vec::with_capacity(out_count as usize);
    let mut non_witness_outputs = Vec::new();

    for _ in 0..out_count {
        let value = r.read_u64_le()?;
        let script = r.read_varstr()?;

        let mut entry = Vec::with_capacity(8 + 1 + script.len());
        entry.extend_from_slice(&value.to_le_bytes());
        write_varint(&mut entry, script.len() as u64);
        entry.extend_from_slice(&script);
        non_witness_outputs.push(entry);

        outputs.push((value, script));
    }

    if has_witness {
        for _ in 0..in_count {
            let item_count = r.read_varint()?;
            for _ in 0..item_count {
                let _ = r.read_varstr()?;
            }
        }
    }

    let locktime = r.read_u32_le()?;

    let mut non_witness = Vec::new();
    non_witness.extend_from_slice(&version.to_le_bytes());
    write_varint(&mut non_witness, in_count);
    for entry in &non_witness_inputs {
        non_witness.extend_from_slice(entry);
    }
    write_varint(&mut non_witness, out_count);
    for entry in &non_witness_outputs {
        non_witness.extend_from_slice(entry);
    }
    non_witness.extend_from_slice(&locktime.to_le_bytes());

    let txid = reversed(double_sha256(&non_witness));

    Ok((non_witness, txid, inputs, outputs))
}

/// Parse a raw block and extract spent outpoints plus outputs matching
/// `target_script`, per §4.8.
pub fn extract(raw_block: &[u8], header_length: u32, target_script: &[u8]) -> Result<BlockExtraction, WireError> {
    let mut r = Reader::new(raw_block);
    r.skip(header_length as usize)?;
    let tx_count = r.read_varint()?;

    let mut extraction = BlockExtraction::default();

    for _ in 0..tx_count {
        let (_, txid, inputs, outputs) = parse_tx(&mut r)?;

        for input in inputs {
            extraction.spent.push(Outpoint { txid: reversed(input.prev_txid), vout: input.prev_vout });
        }

        for (vout, (value, script)) in outputs.into_iter().enumerate() {
            if script == target_script {
                extraction.matched_outputs.push(MatchedOutput { txid, vout: vout as u32, value });
            }
        }
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_tx(script: &[u8], value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes()); // version
        write_varint(&mut out, 1); // in_count
        out.extend_from_slice(&[9u8; 32]); // prev_txid
        out.extend_from_slice(&0u32.to_le_bytes()); // prev_vout
        write_varint(&mut out, 0); // empty scriptSig
        out.extend_from_slice(&0xffffffffu32.to_le_bytes()); // sequence
        write_varint(&mut out, 1); // out_count
        out.extend_from_slice(&value.to_le_bytes());
        write_varint(&mut out, script.len() as u64);
        out.extend_from_slice(script);
        out.extend_from_slice(&0u32.to_le_bytes()); // locktime
        out
    }

    #[test]
    fn extracts_spent_and_matched_from_legacy_tx() {
        let header_length = 80;
        let script = vec![0x00, 0x14, 1, 2, 3];
        let mut block = vec![0u8; header_length as usize];
        write_varint(&mut block, 1); // tx_count
        block.extend_from_slice(&legacy_tx(&script, 50_000));

        let extraction = extract(&block, header_length, &script).unwrap();
        assert_eq!(extraction.spent.len(), 1);
        assert_eq!(extraction.matched_outputs.len(), 1);
        assert_eq!(extraction.matched_outputs[0].value, 50_000);
    }

    #[test]
    fn ignores_non_matching_script() {
        let header_length = 80;
        let script = vec![0x00, 0x14, 1, 2, 3];
        let other = vec![0x00, 0x14, 9, 9, 9];
        let mut block = vec![0u8; header_length as usize];
        write_varint(&mut block, 1);
        block.extend_from_slice(&legacy_tx(&other, 1_000));

        let extraction = extract(&block, header_length, &script).unwrap();
        assert!(extraction.matched_outputs.is_empty());
    }
}
