//! Broadcast cache and INV/GETDATA/mempool-verification dance, per §4.10.
//!
//! Grounded on the injectable [`Clock`] (design note 9) instead of ambient
//! wall-clock reads, both for cache expiry here and for the "wait up to 5s
//! for an inv echo" probe step driven from [`crate::client::NetworkState::broadcast_tx`].

use crate::clock::Clock;
use crate::wire::codec::double_sha256;
use std::collections::HashMap;
use std::time::Duration;

pub const MSG_TX: u32 = 1;
pub const MSG_WITNESS_TX: u32 = 0x4000_0001;
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const MEMPOOL_PROBE_DELAY: Duration = Duration::from_secs(3);
pub const MEMPOOL_WAIT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Pending,
    SeenInMempool,
    Expired,
}

struct CacheEntry {
    raw_tx: Vec<u8>,
    inserted_at: Duration,
}

/// Cache of broadcast transactions keyed by the non-witness txid.
pub struct BroadcastCache<C: Clock> {
    clock: C,
    entries: HashMap<[u8; 32], CacheEntry>,
}

fn non_witness_txid(raw_tx: &[u8]) -> [u8; 32] {
    let mut txid = double_sha256(raw_tx);
    txid.reverse();
    txid
}

impl<C: Clock> BroadcastCache<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, entries: HashMap::new() }
    }

    /// Cache `raw_tx` keyed by its non-witness double-SHA-256 txid.
    pub fn insert(&mut self, non_witness_bytes: &[u8], raw_tx: Vec<u8>) -> [u8; 32] {
        let txid = non_witness_txid(non_witness_bytes);
        self.entries.insert(txid, CacheEntry { raw_tx, inserted_at: self.clock.now() });
        txid
    }

    pub fn get(&self, txid: &[u8; 32]) -> Option<&[u8]> {
        self.entries.get(txid).map(|e| e.raw_tx.as_slice())
    }

    pub fn contains(&self, txid: &[u8; 32]) -> bool {
        self.entries.contains_key(txid)
    }

    /// Match either byte orientation of an inv hash against a cached txid.
    pub fn matches_inv_hash(&self, inv_hash: &[u8; 32]) -> Option<[u8; 32]> {
        if self.entries.contains_key(inv_hash) {
            return Some(*inv_hash);
        }
        let mut reversed = *inv_hash;
        reversed.reverse();
        self.entries.contains_key(&reversed).then_some(reversed)
    }

    /// Drop entries older than [`CACHE_TTL`].
    pub fn expire(&mut self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| now.saturating_sub(entry.inserted_at) < CACHE_TTL);
    }

    pub fn remove(&mut self, txid: &[u8; 32]) {
        self.entries.remove(txid);
    }
}

/// Map a `reject` message's numeric code to a symbolic name, per §7.
pub fn reject_code_name(code: u8) -> &'static str {
    match code {
        0x01 => "MALFORMED",
        0x10 => "INVALID",
        0x11 => "OBSOLETE",
        0x12 => "DUPLICATE",
        0x40 => "NONSTANDARD",
        0x41 => "DUST",
        0x42 => "INSUFFICIENT_FEE",
        0x43 => "CHECKPOINT",
        _ => "UNKNOWN",
    }
}
