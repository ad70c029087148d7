//! Wallet repository: UTXO set, address cursor, persistence, and scan
//! orchestration (§4.11).
//!
//! Orchestration shape grounded on bdk's `CompactFiltersBlockchain::setup`
//! (progress-weighted sync loop over filters, then block fetch on match),
//! adapted to this crate's own `FilterSyncState`/`ChainStore` rather than
//! bdk's internal sync state.

pub mod cursor;
pub mod kv;
pub mod utxo;

pub use cursor::{AddressCursor, MAX_CHANGE, MAX_RECEIVE};
pub use utxo::{Utxo, UtxoSet};

use crate::address::{derive_address, address_to_script, AddressType, Script};
use crate::block::extract;
use crate::config::ChainParams;
use crate::error::{Error, WalletError};
use crate::keys::{bip44_path, ExtendedPrivKey};
use crate::wallet::kv::KvStore;
use std::time::Duration;

pub const SCAN_BATCH: u64 = 100;
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Scanning,
    Complete,
}

pub type ProgressCallback<'a> = dyn FnMut(u64, u64, ScanStatus) + 'a;

/// Transport-facing operations the repository needs during a scan, kept as
/// a trait so the repository never depends on the peer manager directly
/// (ownership boundary per §3: "wallet repository holds a shared
/// non-owning reference to the facade").
pub trait ScanDriver {
    fn tip_height(&mut self) -> u64;
    fn prefetch_filters(&mut self, start: u64, end: u64);
    fn filter_matches_scripts(&mut self, height: u64, scripts: &[&[u8]]) -> bool;
    fn fetch_block(&mut self, height: u64) -> Option<Vec<u8>>;
    fn header_length(&self) -> u32;
}

pub struct WalletRepository<K: KvStore> {
    wallet_id: String,
    kv: K,
    utxos: UtxoSet,
    cursor: AddressCursor,
    last_scanned_height: Option<u64>,
}

impl<K: KvStore> WalletRepository<K> {
    pub fn new(wallet_id: impl Into<String>, kv: K) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            kv,
            utxos: UtxoSet::new(),
            cursor: AddressCursor::new(),
            last_scanned_height: None,
        }
    }

    pub fn load(&mut self) -> Result<(), WalletError> {
        self.last_scanned_height = kv::load_last_scanned_height(&self.kv, &self.wallet_id)?;
        self.utxos = UtxoSet::from_vec(kv::load_utxos(&self.kv, &self.wallet_id)?);
        kv::load_address_cursor(&self.kv, &self.wallet_id, &mut self.cursor)?;
        Ok(())
    }

    pub fn persist(&self) -> Result<(), WalletError> {
        if let Some(height) = self.last_scanned_height {
            kv::store_last_scanned_height(&self.kv, &self.wallet_id, height)?;
        }
        kv::store_utxos(&self.kv, &self.wallet_id, &self.utxos.to_vec())?;
        kv::store_address_cursor(&self.kv, &self.wallet_id, &self.cursor)?;
        Ok(())
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn utxos_mut(&mut self) -> &mut UtxoSet {
        &mut self.utxos
    }

    /// First `MAX_RECEIVE+1` receive + `MAX_CHANGE+1` change native-segwit
    /// addresses, derivation-based (no persistence dependency). Taproot
    /// exists for address generation (§4.6) but is excluded from the
    /// default scan path.
    fn scan_scripts(
        &self,
        master: &ExtendedPrivKey,
        secp: &secp256k1::Secp256k1<secp256k1::All>,
        params: &ChainParams,
    ) -> Result<Vec<(Script, String)>, Error> {
        let mut scripts = Vec::new();

        for index in 0..=(MAX_RECEIVE as u32) {
            let path = bip44_path(params.coin_type, 0, 0, index);
            let node = master.derive_path(secp, &path).map_err(Error::Key)?;
            let pubkey = node.public_key(secp).public_key.serialize();
            let address = derive_address(&pubkey, AddressType::P2wpkh, params).map_err(Error::Address)?;
            let script = address_to_script(&address, params).map_err(Error::Address)?;
            scripts.push((script, address));
        }

        for index in 0..=(MAX_CHANGE as u32) {
            let path = bip44_path(params.coin_type, 0, 1, index);
            let node = master.derive_path(secp, &path).map_err(Error::Key)?;
            let pubkey = node.public_key(secp).public_key.serialize();
            let address = derive_address(&pubkey, AddressType::P2wpkh, params).map_err(Error::Address)?;
            let script = address_to_script(&address, params).map_err(Error::Address)?;
            scripts.push((script, address));
        }

        Ok(scripts)
    }

    /// Full scan orchestration per §4.11 steps 1-5.
    pub fn discover_utxos(
        &mut self,
        driver: &mut dyn ScanDriver,
        master: &ExtendedPrivKey,
        secp: &secp256k1::Secp256k1<secp256k1::All>,
        params: &ChainParams,
        full_rescan: bool,
        start_height: u64,
        mut on_progress: Option<&mut ProgressCallback>,
    ) -> Result<(), Error> {
        let scripts = self.scan_scripts(master, secp, params)?;
        let script_refs: Vec<&[u8]> = scripts.iter().map(|(s, _)| s.0.as_slice()).collect();

        let tip = driver.tip_height();
        let effective_start = if full_rescan {
            start_height.min(tip)
        } else {
            match self.last_scanned_height {
                Some(resume) if resume >= start_height => resume,
                _ => start_height,
            }
        };

        let mut matched_heights = Vec::new();
        let mut height = effective_start;
        while height < tip {
            if height % SCAN_BATCH == 0 {
                driver.prefetch_filters(height, height + SCAN_BATCH - 1);
            }
            if driver.filter_matches_scripts(height, &script_refs) {
                matched_heights.push(height);
            }
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(height - effective_start + 1, tip - effective_start, ScanStatus::Scanning);
            }
            height += 1;
        }

        matched_heights.sort_unstable();
        for h in matched_heights {
            self.apply_block_at_height(driver, h, &script_refs, &scripts)?;
        }

        self.last_scanned_height = Some(tip.saturating_sub(1));
        if let Some(cb) = on_progress.as_deref_mut() {
            cb(tip - effective_start, tip - effective_start, ScanStatus::Complete);
        }
        self.persist().map_err(Error::Wallet)?;
        Ok(())
    }

    fn apply_block_at_height(
        &mut self,
        driver: &mut dyn ScanDriver,
        height: u64,
        _script_refs: &[&[u8]],
        scripts: &[(Script, String)],
    ) -> Result<(), Error> {
        let block = match driver.fetch_block(height) {
            Some(b) => b,
            None => return Ok(()),
        };

        for (script, address) in scripts {
            let extraction = extract(&block, driver.header_length(), &script.0).map_err(Error::Wire)?;
            for spent in extraction.spent {
                let txid_hex = hex::encode(spent.txid);
                self.utxos.remove(&txid_hex, spent.vout);
            }
            for output in extraction.matched_outputs {
                let txid_hex = hex::encode(output.txid);
                self.utxos.insert(Utxo {
                    txid: txid_hex,
                    vout: output.vout,
                    value: output.value,
                    script_pub_key: hex::encode(&script.0),
                    address: address.clone(),
                    block_height: Some(height),
                    confirmed: true,
                    frozen: false,
                });
            }
        }
        Ok(())
    }

    /// Equivalent of step 4 for a single newly-announced block.
    pub fn check_block_for_transactions(
        &mut self,
        driver: &mut dyn ScanDriver,
        height: u64,
        scripts: &[(Script, String)],
    ) -> Result<(), Error> {
        let script_refs: Vec<&[u8]> = scripts.iter().map(|(s, _)| s.0.as_slice()).collect();
        self.apply_block_at_height(driver, height, &script_refs, scripts)?;
        self.persist().map_err(Error::Wallet)
    }

    pub fn handle_reorg(&mut self, from_height: u64) {
        self.utxos.handle_reorg(from_height);
    }
}
