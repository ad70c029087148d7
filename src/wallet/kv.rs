//! Opaque flat-string-key KV persistence, per §6 "Persisted state".
//!
//! `sled` is kept specifically for this layer (the header chain store uses a
//! flat file instead, per §4.3) — grounded on the teacher's dependency on
//! `sled` for exactly this kind of small embedded KV use.

use crate::error::WalletError;
use crate::wallet::cursor::AddressCursor;
use crate::wallet::utxo::Utxo;
use std::collections::HashMap;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError>;
}

pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open(path: &str) -> Result<Self, WalletError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl KvStore for SledKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError> {
        self.db.insert(key, value)?;
        Ok(())
    }
}

/// In-memory `KvStore`, used in tests and anywhere persistence is not
/// required.
#[derive(Default)]
pub struct MemoryKvStore {
    data: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError> {
        self.data.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

fn last_scanned_height_key(wallet_id: &str) -> String {
    format!("wallet_{wallet_id}_lastScannedHeight")
}

fn utxos_key(wallet_id: &str) -> String {
    format!("wallet_{wallet_id}_utxos")
}

fn address_book_key(wallet_id: &str) -> String {
    format!("address_book_v1_{wallet_id}")
}

pub fn load_last_scanned_height(kv: &dyn KvStore, wallet_id: &str) -> Result<Option<u64>, WalletError> {
    match kv.get(&last_scanned_height_key(wallet_id))? {
        Some(bytes) => {
            let s = String::from_utf8_lossy(&bytes);
            Ok(s.parse::<u64>().ok())
        }
        None => Ok(None),
    }
}

pub fn store_last_scanned_height(kv: &dyn KvStore, wallet_id: &str, height: u64) -> Result<(), WalletError> {
    kv.set(&last_scanned_height_key(wallet_id), height.to_string().as_bytes())
}

pub fn load_utxos(kv: &dyn KvStore, wallet_id: &str) -> Result<Vec<Utxo>, WalletError> {
    match kv.get(&utxos_key(wallet_id))? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

pub fn store_utxos(kv: &dyn KvStore, wallet_id: &str, utxos: &[Utxo]) -> Result<(), WalletError> {
    let bytes = serde_json::to_vec(utxos)?;
    kv.set(&utxos_key(wallet_id), &bytes)
}

pub fn load_address_cursor(kv: &dyn KvStore, wallet_id: &str, cursor: &mut AddressCursor) -> Result<(), WalletError> {
    if let Some(bytes) = kv.get(&address_book_key(wallet_id))? {
        let map: HashMap<String, i64> = serde_json::from_slice(&bytes)?;
        cursor.load_from_json_map(&map);
    }
    Ok(())
}

pub fn store_address_cursor(kv: &dyn KvStore, wallet_id: &str, cursor: &AddressCursor) -> Result<(), WalletError> {
    let bytes = serde_json::to_vec(&cursor.to_json_map())?;
    kv.set(&address_book_key(wallet_id), &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_scanned_height_roundtrip() {
        let kv = MemoryKvStore::new();
        store_last_scanned_height(&kv, "w1", 12345).unwrap();
        assert_eq!(load_last_scanned_height(&kv, "w1").unwrap(), Some(12345));
    }

    #[test]
    fn utxos_roundtrip() {
        let kv = MemoryKvStore::new();
        let utxos = vec![Utxo {
            txid: "abc".to_string(),
            vout: 0,
            value: 1000,
            script_pub_key: "00".to_string(),
            address: "addr".to_string(),
            block_height: Some(1),
            confirmed: true,
            frozen: false,
        }];
        store_utxos(&kv, "w1", &utxos).unwrap();
        assert_eq!(load_utxos(&kv, "w1").unwrap(), utxos);
    }
}
