//! UTXO set: confirmed/frozen/unconfirmed bookkeeping, keyed by outpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    pub address: String,
    #[serde(rename = "blockHeight")]
    pub block_height: Option<u64>,
    pub confirmed: bool,
    pub frozen: bool,
}

impl Utxo {
    pub fn outpoint(&self) -> (String, u32) {
        (self.txid.clone(), self.vout)
    }

    /// Spendable iff confirmed and not frozen.
    pub fn is_spendable(&self) -> bool {
        self.confirmed && !self.frozen
    }
}

#[derive(Debug, Default)]
pub struct UtxoSet {
    by_outpoint: HashMap<(String, u32), Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(utxos: Vec<Utxo>) -> Self {
        let mut set = Self::new();
        for u in utxos {
            set.insert(u);
        }
        set
    }

    pub fn to_vec(&self) -> Vec<Utxo> {
        self.by_outpoint.values().cloned().collect()
    }

    /// Inserts, rejecting a duplicate outpoint by overwriting it (the set is
    /// free of duplicate outpoints by construction).
    pub fn insert(&mut self, utxo: Utxo) {
        self.by_outpoint.insert(utxo.outpoint(), utxo);
    }

    pub fn remove(&mut self, txid: &str, vout: u32) -> Option<Utxo> {
        self.by_outpoint.remove(&(txid.to_string(), vout))
    }

    pub fn spendable(&self) -> Vec<&Utxo> {
        self.by_outpoint.values().filter(|u| u.is_spendable()).collect()
    }

    /// Flip UTXOs at or above `from_height` to unconfirmed, per
    /// `handle_reorg`: no deletion, the next scan reconfirms or discards.
    pub fn handle_reorg(&mut self, from_height: u64) {
        for utxo in self.by_outpoint.values_mut() {
            if let Some(height) = utxo.block_height {
                if height >= from_height {
                    utxo.confirmed = false;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_outpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_outpoint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(txid: &str, vout: u32, confirmed: bool, frozen: bool) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout,
            value: 1000,
            script_pub_key: "00".to_string(),
            address: "addr".to_string(),
            block_height: confirmed.then_some(10),
            confirmed,
            frozen,
        }
    }

    #[test]
    fn spendable_requires_confirmed_and_not_frozen() {
        let mut set = UtxoSet::new();
        set.insert(utxo("a", 0, true, false));
        set.insert(utxo("b", 0, true, true));
        set.insert(utxo("c", 0, false, false));
        assert_eq!(set.spendable().len(), 1);
    }

    #[test]
    fn reorg_unconfirms_without_deleting() {
        let mut set = UtxoSet::new();
        set.insert(utxo("a", 0, true, false));
        set.handle_reorg(5);
        assert_eq!(set.len(), 1);
        assert!(!set.to_vec()[0].confirmed);
    }

    #[test]
    fn duplicate_outpoint_overwrites_not_duplicates() {
        let mut set = UtxoSet::new();
        set.insert(utxo("a", 0, true, false));
        set.insert(utxo("a", 0, false, false));
        assert_eq!(set.len(), 1);
    }
}
