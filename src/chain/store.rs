//! Header chain store: bounded in-memory cache, pending queue, and an
//! append-only fixed-width file.
//!
//! Grounded on the teacher's deleted `storage/chainstate.rs` (sled-backed
//! `ChainInfo` shape) generalized from a KV store to the flat-file layout
//! the spec mandates, since the header chain must be randomly addressable by
//! height at a fixed record width.

use super::header::BlockHeader;
use crate::config::ChainParams;
use crate::error::ChainStoreError;
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const CACHE_CAPACITY: usize = 100;

/// `(height, hash)` pair used for locator construction and reorg pivots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorEntry {
    pub height: u64,
    pub hash: [u8; 32],
}

struct PendingEntry {
    raw: Vec<u8>,
    hash: [u8; 32],
}

pub struct ChainStore {
    path: PathBuf,
    params: ChainParams,
    persisted_count: u64,
    cache: BTreeMap<u64, BlockHeader>,
    pending: Vec<PendingEntry>,
    hash_to_height: HashMap<[u8; 32], u64>,
}

impl ChainStore {
    pub fn open<P: AsRef<Path>>(path: P, params: ChainParams) -> Result<Self, ChainStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let persisted_count = len / params.header_length as u64;

        Ok(Self {
            path,
            params,
            persisted_count,
            cache: BTreeMap::new(),
            pending: Vec::new(),
            hash_to_height: HashMap::new(),
        })
    }

    pub fn genesis_hash(&self) -> Result<[u8; 32], ChainStoreError> {
        let bytes = hex::decode(&self.params.genesis_hash_hex)
            .map_err(|_| ChainStoreError::BadLinkage(0))?;
        let mut le = [0u8; 32];
        if bytes.len() != 32 {
            return Err(ChainStoreError::BadLinkage(0));
        }
        for (i, b) in bytes.iter().rev().enumerate() {
            le[i] = *b;
        }
        Ok(le)
    }

    pub fn persisted_count(&self) -> u64 {
        self.persisted_count
    }

    pub fn total_height(&self) -> u64 {
        self.persisted_count + self.pending.len() as u64
    }

    /// Tip hash, or the genesis hash when the store is empty.
    pub fn tip_hash(&self) -> Result<[u8; 32], ChainStoreError> {
        if self.total_height() == 0 {
            return self.genesis_hash();
        }
        self.get_block_hash(self.total_height() - 1)
            .ok_or(ChainStoreError::BadLinkage(self.total_height() - 1))
    }

    /// Synchronous lookup, cache/pending only.
    pub fn get_header(&self, height: u64) -> Option<BlockHeader> {
        if let Some(h) = self.cache.get(&height) {
            return Some(h.clone());
        }
        if height >= self.persisted_count {
            let idx = (height - self.persisted_count) as usize;
            return self
                .pending
                .get(idx)
                .and_then(|p| BlockHeader::parse(&p.raw, &self.params));
        }
        None
    }

    /// Falls back to disk when not cached.
    pub fn get_header_async(&self, height: u64) -> Result<Option<BlockHeader>, ChainStoreError> {
        if let Some(h) = self.get_header(height) {
            return Ok(Some(h));
        }
        if height >= self.persisted_count {
            return Ok(None);
        }
        let mut file = File::open(&self.path)?;
        let width = self.params.header_length as u64;
        file.seek(SeekFrom::Start(height * width))?;
        let mut buf = vec![0u8; width as usize];
        file.read_exact(&mut buf)?;
        Ok(BlockHeader::parse(&buf, &self.params))
    }

    pub fn get_block_hash(&self, height: u64) -> Option<[u8; 32]> {
        if height == 0 {
            return self.genesis_hash().ok();
        }
        self.get_header(height).map(|h| h.hash(&self.params))
    }

    pub fn get_block_hash_async(&self, height: u64) -> Result<Option<[u8; 32]>, ChainStoreError> {
        if height == 0 {
            return Ok(self.genesis_hash().ok());
        }
        Ok(self.get_header_async(height)?.map(|h| h.hash(&self.params)))
    }

    /// Validates linkage and duplicate-by-hash, then appends to pending.
    pub fn add_header(&mut self, header: BlockHeader, raw_bytes: Vec<u8>) -> bool {
        let height = self.total_height();
        let hash = header.hash(&self.params);

        if self.hash_to_height.contains_key(&hash) {
            return false;
        }

        let expected_prev = if height == 0 {
            match self.genesis_hash() {
                Ok(g) => g,
                Err(_) => return false,
            }
        } else {
            match self.get_block_hash(height - 1) {
                Some(h) => h,
                None => return false,
            }
        };

        if header.prev_hash != expected_prev {
            return false;
        }

        self.hash_to_height.insert(hash, height);
        self.cache.insert(height, header);
        if self.cache.len() > CACHE_CAPACITY {
            if let Some(&lowest) = self.cache.keys().next() {
                self.cache.remove(&lowest);
            }
        }
        self.pending.push(PendingEntry { raw: raw_bytes, hash });
        true
    }

    /// Persists pending records once at least `batch_size` are queued.
    pub fn flush_to_storage(&mut self, batch_size: usize) -> Result<(), ChainStoreError> {
        if self.pending.len() < batch_size {
            return Ok(());
        }
        self.force_flush()
    }

    pub fn force_flush(&mut self) -> Result<(), ChainStoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let mut to_write = std::mem::take(&mut self.pending);
        let mut written = 0usize;
        for entry in &to_write {
            if let Err(e) = file.write_all(&entry.raw) {
                self.persisted_count += written as u64;
                self.pending = to_write.split_off(written);
                return Err(ChainStoreError::Io(e));
            }
            written += 1;
        }
        self.persisted_count += written as u64;
        Ok(())
    }

    /// Drops all state above `keep_count`, truncating the on-disk file.
    pub fn truncate(&mut self, keep_count: u64) -> Result<(), ChainStoreError> {
        self.cache.retain(|&height, _| height < keep_count);
        self.hash_to_height.retain(|_, &mut height| height < keep_count);

        if keep_count < self.persisted_count {
            let width = self.params.header_length as u64;
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(keep_count * width)?;
            self.persisted_count = keep_count;
            self.pending.clear();
        } else {
            let drop_from_pending = (keep_count - self.persisted_count) as usize;
            self.pending.truncate(drop_from_pending);
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), ChainStoreError> {
        self.cache.clear();
        self.pending.clear();
        self.hash_to_height.clear();
        self.persisted_count = 0;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(0)?;
        Ok(())
    }

    /// Locator entries: step=1 for the first 10 heights back from tip, then
    /// doubling, always ending with genesis.
    pub fn build_block_locator(&self) -> Vec<LocatorEntry> {
        let total = self.total_height();
        if total == 0 {
            return vec![LocatorEntry { height: 0, hash: self.genesis_hash().unwrap_or([0u8; 32]) }];
        }

        let mut entries = Vec::new();
        let mut height = total - 1;
        let mut step: u64 = 1;
        let mut count = 0;

        loop {
            if let Some(hash) = self.get_block_hash(height) {
                entries.push(LocatorEntry { height, hash });
            }
            if height == 0 {
                break;
            }
            count += 1;
            if count >= 10 {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step);
        }

        if entries.last().map(|e| e.height) != Some(0) {
            if let Ok(g) = self.genesis_hash() {
                entries.push(LocatorEntry { height: 0, hash: g });
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header_chain(params: &ChainParams, count: u64) -> Vec<(BlockHeader, Vec<u8>)> {
        let mut out = Vec::new();
        let mut prev = {
            let bytes = hex::decode(&params.genesis_hash_hex).unwrap();
            let mut le = [0u8; 32];
            for (i, b) in bytes.iter().rev().enumerate() {
                le[i] = *b;
            }
            le
        };
        for i in 0..count {
            let header = BlockHeader {
                version: 1,
                prev_hash: prev,
                merkle_root: [i as u8; 32],
                timestamp: 1000 + i as u32,
                bits: 0x1d00ffff,
                nonce: i as u32,
                proof_blob: vec![],
            };
            prev = header.hash(params);
            let raw = header.serialize();
            out.push((header, raw));
        }
        out
    }

    #[test]
    fn add_header_enforces_linkage_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let params = ChainParams::default();
        let mut store = ChainStore::open(dir.path().join("headers.bin"), params.clone()).unwrap();

        let chain = header_chain(&params, 3);
        for (header, raw) in &chain {
            assert!(store.add_header(header.clone(), raw.clone()));
        }
        assert_eq!(store.total_height(), 3);

        // duplicate rejected
        assert!(!store.add_header(chain[0].0.clone(), chain[0].1.clone()));
    }

    #[test]
    fn flush_and_reopen_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("headers.bin");
        let params = ChainParams::default();
        let chain = header_chain(&params, 5);

        {
            let mut store = ChainStore::open(&path, params.clone()).unwrap();
            for (header, raw) in &chain {
                store.add_header(header.clone(), raw.clone());
            }
            store.force_flush().unwrap();
            assert_eq!(store.persisted_count(), 5);
            // Nothing left pending once flushed.
            assert_eq!(store.total_height(), store.persisted_count());
        }

        let on_disk_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(on_disk_len / params.header_length as u64, 5);

        let store = ChainStore::open(&path, params).unwrap();
        assert_eq!(store.persisted_count(), 5);
        assert!(store.get_header_async(2).unwrap().is_some());
    }

    #[test]
    fn truncate_drops_above_keep_count() {
        let dir = tempdir().unwrap();
        let params = ChainParams::default();
        let mut store = ChainStore::open(dir.path().join("headers.bin"), params.clone()).unwrap();
        let chain = header_chain(&params, 5);
        for (header, raw) in &chain {
            store.add_header(header.clone(), raw.clone());
        }
        store.force_flush().unwrap();
        store.truncate(2).unwrap();
        assert_eq!(store.total_height(), 2);
        assert_eq!(store.persisted_count(), 2);
    }

    #[test]
    fn locator_ends_with_genesis() {
        let dir = tempdir().unwrap();
        let params = ChainParams::default();
        let mut store = ChainStore::open(dir.path().join("headers.bin"), params.clone()).unwrap();
        let chain = header_chain(&params, 20);
        for (header, raw) in &chain {
            store.add_header(header.clone(), raw.clone());
        }
        let locator = store.build_block_locator();
        assert_eq!(locator.last().unwrap().height, 0);
    }
}
