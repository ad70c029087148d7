//! Filter-header chain validation and filter-fetch bookkeeping.
//!
//! Pure state machine, decoupled from transport: a peer-manager driver calls
//! `handle_cfcheckpt`/`handle_cfheaders`/`handle_cfilter` as responses
//! arrive. Orchestration shape grounded on bdk's `CFSync`
//! (`compact_filters/mod.rs`), generalized to this crate's own `FilterError`
//! taxonomy and checkpoint-validation policy from §4.5.

use super::header::{chain_hash, filter_hash};
use crate::error::FilterError;
use crate::wire::message::{CfCheckpt, CfHeaders, CfilterPayload};
use std::collections::HashMap;

pub const CHECKPOINT_SPACING: u64 = 1000;
pub const FILTER_BATCH_SIZE: usize = 100;
pub const FILTER_HEADERS_PER_BATCH: u64 = 2000;

#[derive(Default)]
pub struct FilterSyncState {
    pub filter_headers: HashMap<u64, [u8; 32]>,
    pub filter_header_checkpoints: HashMap<u64, [u8; 32]>,
    pub filters: HashMap<u64, Vec<u8>>,
    pub pending_filter_requests: HashMap<u64, [u8; 32]>,
    pending_hash_to_height: HashMap<[u8; 32], u64>,
}

impl FilterSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip_filter_header(&self) -> Option<(u64, [u8; 32])> {
        self.filter_headers.iter().max_by_key(|(h, _)| **h).map(|(h, v)| (*h, *v))
    }

    /// Record checkpoint entries: entry `i` corresponds to height
    /// `min((i+1)*1000 - 1, stop_height)`.
    pub fn handle_cfcheckpt(&mut self, msg: &CfCheckpt, stop_height: u64) {
        for (i, header) in msg.filter_headers.iter().enumerate() {
            let height = ((i as u64 + 1) * CHECKPOINT_SPACING - 1).min(stop_height);
            self.filter_header_checkpoints.insert(height, *header);
        }
    }

    /// Apply a `cfheaders` batch starting at `start_height`, validating any
    /// checkpoint heights that fall within the batch (best-effort: log only
    /// on mismatch, never reject the batch).
    pub fn handle_cfheaders(&mut self, msg: &CfHeaders, start_height: u64) -> Result<(), FilterError> {
        let mut prev = if start_height == 0 {
            msg.prev_filter_header
        } else {
            *self
                .filter_headers
                .get(&(start_height - 1))
                .unwrap_or(&msg.prev_filter_header)
        };

        for (i, fhash) in msg.filter_hashes.iter().enumerate() {
            let height = start_height + i as u64;
            let header = chain_hash(fhash, &prev);
            self.filter_headers.insert(height, header);
            prev = header;
        }

        for (&height, expected) in &self.filter_header_checkpoints {
            if let Some(actual) = self.filter_headers.get(&height) {
                if actual != expected {
                    tracing::warn!(
                        height,
                        "filter-header checkpoint mismatch, continuing best-effort"
                    );
                }
            }
        }
        Ok(())
    }

    /// Record that a filter for `height`/`block_hash` is in flight.
    pub fn begin_filter_request(&mut self, height: u64, block_hash: [u8; 32]) -> Result<(), FilterError> {
        if self.pending_filter_requests.len() >= FILTER_BATCH_SIZE {
            return Err(FilterError::BackpressureExceeded);
        }
        self.pending_filter_requests.insert(height, block_hash);
        self.pending_hash_to_height.insert(block_hash, height);
        Ok(())
    }

    /// Resolve a `cfilter` response against pending requests by block hash,
    /// falling back to the oldest pending request if no exact match exists.
    pub fn handle_cfilter(&mut self, msg: &CfilterPayload) -> Result<u64, FilterError> {
        let height = if let Some(h) = self.pending_hash_to_height.remove(&msg.block_hash) {
            self.pending_filter_requests.remove(&h);
            h
        } else if let Some((&fallback_height, _)) = self.pending_filter_requests.iter().next() {
            tracing::warn!("cfilter response matched no pending request, using oldest pending");
            self.pending_filter_requests.remove(&fallback_height);
            self.pending_hash_to_height.retain(|_, h| *h != fallback_height);
            fallback_height
        } else {
            return Err(FilterError::NotAvailable(0));
        };

        self.filters.insert(height, msg.filter_bytes.clone());
        Ok(height)
    }

    pub fn is_filter_cached(&self, height: u64) -> bool {
        self.filters.contains_key(&height)
    }

    /// Membership test against a cached filter; callers fetch+poll before
    /// calling this when the filter is not yet cached.
    pub fn filter_matches_scripts(
        &self,
        height: u64,
        header_hash: &[u8; 32],
        scripts: &[&[u8]],
    ) -> Result<bool, FilterError> {
        let raw = self.filters.get(&height).ok_or(FilterError::NotAvailable(height))?;
        let mut r = crate::codec::Reader::new(raw);
        let num_elements = r.read_varint().map_err(|_| FilterError::Decode)?;
        let data = r.read_bytes(r.remaining()).map_err(|_| FilterError::Decode)?;
        Ok(super::gcs::filter_matches_scripts(data, num_elements, header_hash, scripts))
    }

    pub fn truncate_above(&mut self, keep_height: u64) {
        self.filter_headers.retain(|&h, _| h <= keep_height);
        self.filter_header_checkpoints.retain(|&h, _| h <= keep_height);
        self.filters.retain(|&h, _| h <= keep_height);
        self.pending_filter_requests.retain(|&h, _| h <= keep_height);
        self.pending_hash_to_height.retain(|_, h| *h <= keep_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_heights_computed_from_spacing() {
        let mut state = FilterSyncState::new();
        let msg = CfCheckpt {
            filter_type: 0,
            stop_hash: [0u8; 32],
            filter_headers: vec![[1u8; 32], [2u8; 32]],
        };
        state.handle_cfcheckpt(&msg, 5000);
        assert_eq!(state.filter_header_checkpoints.get(&999), Some(&[1u8; 32]));
        assert_eq!(state.filter_header_checkpoints.get(&1999), Some(&[2u8; 32]));
    }

    #[test]
    fn cfheaders_chain_builds_sequential_headers() {
        let mut state = FilterSyncState::new();
        let msg = CfHeaders {
            filter_type: 0,
            stop_hash: [0u8; 32],
            prev_filter_header: [0u8; 32],
            filter_hashes: vec![filter_hash(b"a"), filter_hash(b"b")],
        };
        state.handle_cfheaders(&msg, 0).unwrap();
        assert!(state.filter_headers.contains_key(&0));
        assert!(state.filter_headers.contains_key(&1));
    }

    #[test]
    fn backpressure_rejects_past_batch_size() {
        let mut state = FilterSyncState::new();
        for h in 0..FILTER_BATCH_SIZE as u64 {
            state.begin_filter_request(h, [h as u8; 32]).unwrap();
        }
        assert!(state.begin_filter_request(9999, [9u8; 32]).is_err());
    }

    #[test]
    fn cfilter_resolves_by_hash() {
        let mut state = FilterSyncState::new();
        state.begin_filter_request(5, [5u8; 32]).unwrap();
        let msg = CfilterPayload { filter_type: 0, block_hash: [5u8; 32], filter_bytes: vec![0, 1, 2] };
        let height = state.handle_cfilter(&msg).unwrap();
        assert_eq!(height, 5);
        assert!(state.is_filter_cached(5));
    }
}
