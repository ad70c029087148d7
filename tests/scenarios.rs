//! End-to-end scenarios from the spec's testable-properties section: header
//! sync from empty, filter-probe-and-fetch, spend-with-change, sweep, reorg,
//! and a BIP143 sighash determinism check.

use lwallet::address::{derive_address, AddressType};
use lwallet::block::extract;
use lwallet::chain::BlockHeader;
use lwallet::config::ChainParams;
use lwallet::filters::gcs;
use lwallet::signer::{compute_sighash, sign_sighash, SighashInput, SighashOutput};
use lwallet::txbuilder::{plan_sweep, plan_transaction, AvailableUtxo, SelectionMode};
use lwallet::wallet::{Utxo, UtxoSet};
use lwallet::ChainStore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tempfile::tempdir;

fn genesis_hash_le(params: &ChainParams) -> [u8; 32] {
    let bytes = hex::decode(&params.genesis_hash_hex).unwrap();
    let mut le = [0u8; 32];
    for (i, b) in bytes.iter().rev().enumerate() {
        le[i] = *b;
    }
    le
}

fn linked_header(prev: [u8; 32], timestamp: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: prev,
        merkle_root: [nonce as u8; 32],
        timestamp,
        bits: 0x1d00ffff,
        nonce,
        proof_blob: Vec::new(),
    }
}

/// S1: header sync from empty reaches height 3 with a correct genesis hash.
#[test]
fn s1_header_sync_from_empty() {
    let dir = tempdir().unwrap();
    let params = ChainParams::default();
    let mut store = ChainStore::open(dir.path().join("headers.bin"), params.clone()).unwrap();

    let mut prev = genesis_hash_le(&params);
    for i in 0..3u32 {
        let header = linked_header(prev, 1000 + i, i);
        prev = header.hash(&params);
        let raw = header.serialize();
        assert!(store.add_header(header, raw));
    }

    assert_eq!(store.total_height(), 3);
    assert_eq!(store.persisted_count(), 0);
    assert_eq!(store.get_block_hash(0), Some(genesis_hash_le(&params)));
}

fn encode_gcs_single(value: u64) -> Vec<u8> {
    let quotient = value >> gcs::P;
    let remainder = value & ((1u64 << gcs::P) - 1);
    let mut bits = Vec::new();
    for _ in 0..quotient {
        bits.push(true);
    }
    bits.push(false);
    for i in (0..gcs::P).rev() {
        bits.push((remainder >> i) & 1 == 1);
    }
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    bytes
}

/// S2: a filter built to contain script `S` reports a match, and block
/// extraction recovers exactly the matching output.
#[test]
fn s2_filter_probe_and_block_fetch() {
    let header_hash = [0x11u8; 32];
    let target_script: Vec<u8> = vec![0x00, 0x14, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];

    let mut key = [0u8; 16];
    key.copy_from_slice(&header_hash[..16]);
    let encoded_value = gcs::hash_to_range(&key, &target_script, 1);
    let filter_bytes = encode_gcs_single(encoded_value);

    assert!(gcs::filter_matches_scripts(&filter_bytes, 1, &header_hash, &[&target_script]));
    assert!(!gcs::filter_matches_scripts(&filter_bytes, 1, &header_hash, &[b"no-match"]));

    // Build a raw block with one legacy tx carrying a single matching output
    // (value=50000, vout=0). A non-zero in_count keeps the marker/flag peek
    // in the parser from mistaking the input count for a segwit marker.
    let header_length = 80u32;
    let mut block = vec![0u8; header_length as usize];
    block.push(1); // tx_count varint = 1
    block.extend_from_slice(&2u32.to_le_bytes()); // tx version
    block.push(1); // in_count = 1
    block.extend_from_slice(&[9u8; 32]); // prev txid
    block.extend_from_slice(&0u32.to_le_bytes()); // prev vout
    block.push(0); // empty scriptSig
    block.extend_from_slice(&0xffff_ffffu32.to_le_bytes()); // sequence
    block.push(1); // out_count = 1
    block.extend_from_slice(&50_000u64.to_le_bytes());
    block.push(target_script.len() as u8);
    block.extend_from_slice(&target_script);
    block.extend_from_slice(&0u32.to_le_bytes()); // locktime

    let extraction = extract(&block, header_length, &target_script).unwrap();
    assert_eq!(extraction.matched_outputs.len(), 1);
    assert_eq!(extraction.matched_outputs[0].value, 50_000);
    assert_eq!(extraction.matched_outputs[0].vout, 0);
}

/// S3: spend 120000 sats from two UTXOs (100000 + 50000), selecting both,
/// producing a two-output tx where input total minus output total equals
/// the computed fee.
#[test]
fn s3_spend_with_change() {
    let utxos = vec![
        AvailableUtxo { txid: [1u8; 32], vout: 0, value: 100_000 },
        AvailableUtxo { txid: [2u8; 32], vout: 0, value: 50_000 },
    ];
    let plan = plan_transaction(&utxos, 120_000, 2, SelectionMode::Auto, false).unwrap();

    assert_eq!(plan.selected.len(), 2);
    let total_input: u64 = plan.selected.iter().map(|u| u.value).sum();
    let total_output = plan.outputs.recipient_value + plan.outputs.change_value.unwrap_or(0);
    assert_eq!(total_input - total_output, plan.fee);
    assert!(plan.fee >= lwallet::txbuilder::estimate_vsize(2, 2) * 2);
}

/// S4: sweep two 50000-sat UTXOs into a single output, fee subtracted from
/// the total, result above dust.
#[test]
fn s4_sweep() {
    let utxos = vec![
        AvailableUtxo { txid: [1u8; 32], vout: 0, value: 50_000 },
        AvailableUtxo { txid: [2u8; 32], vout: 0, value: 50_000 },
    ];
    let plan = plan_sweep(&utxos, 1, false).unwrap();

    assert_eq!(plan.selected.len(), 2);
    assert!(plan.outputs.change_value.is_none());
    let expected_fee = lwallet::txbuilder::estimate_vsize(2, 1);
    assert_eq!(plan.fee, expected_fee);
    assert_eq!(plan.outputs.recipient_value, 100_000 - expected_fee);
    assert!(plan.fee > 0);
    assert!(plan.outputs.recipient_value > 546);
}

/// S5: reorg at height 98 unconfirms the height-98 UTXO but leaves the
/// height-97 UTXO confirmed.
#[test]
fn s5_reorg_unconfirms_only_affected_heights() {
    let mut set = UtxoSet::new();
    set.insert(Utxo {
        txid: "a".to_string(),
        vout: 0,
        value: 1000,
        script_pub_key: "00".to_string(),
        address: "addr".to_string(),
        block_height: Some(97),
        confirmed: true,
        frozen: false,
    });
    set.insert(Utxo {
        txid: "b".to_string(),
        vout: 0,
        value: 2000,
        script_pub_key: "00".to_string(),
        address: "addr".to_string(),
        block_height: Some(98),
        confirmed: true,
        frozen: false,
    });

    set.handle_reorg(98);

    let by_txid = |txid: &str| set.to_vec().into_iter().find(|u| u.txid == txid).unwrap();
    assert!(by_txid("a").confirmed);
    assert!(!by_txid("b").confirmed);
}

/// S6: BIP143 sighash is deterministic for equal inputs, and RFC6979 signing
/// yields bit-identical DER output across repeated signs.
#[test]
fn s6_bip143_sighash_vector_and_deterministic_signature() {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    let pubkey_hash = lwallet::address::hash160(&public_key.serialize());

    let recipient_script = {
        let address = derive_address(&public_key.serialize(), AddressType::P2wpkh, &ChainParams::default()).unwrap();
        lwallet::address::address_to_script(&address, &ChainParams::default()).unwrap().0
    };

    let inputs = vec![SighashInput { prev_txid_wire: [9u8; 32], prev_vout: 0, sequence: 0xffff_fffd }];
    let outputs = vec![SighashOutput { value: 90_000, script_pubkey: recipient_script }];

    let sighash_a = compute_sighash(2, &inputs, &outputs, 0, 100_000, &pubkey_hash, 0);
    let sighash_b = compute_sighash(2, &inputs, &outputs, 0, 100_000, &pubkey_hash, 0);
    assert_eq!(sighash_a, sighash_b);

    let der_a = sign_sighash(&secp, &secret_key, &sighash_a).unwrap();
    let der_b = sign_sighash(&secp, &secret_key, &sighash_b).unwrap();
    assert_eq!(der_a, der_b);
}
