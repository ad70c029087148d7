//! Header sync state machine (§4.4): throttled `getheaders` requests,
//! chained pagination, and stall detection.
//!
//! Grounded on the teacher's sync-manager throttle/timeout shape
//! (request_pending + last_request_time + a single retry on timeout),
//! rebuilt around this crate's own `ChainStore`.

use crate::chain::store::ChainStore;
use crate::clock::Clock;
use crate::error::Error;
use std::time::Duration;

pub const REQUEST_THROTTLE: Duration = Duration::from_secs(30);
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const INV_HEADER_PULL_DELAY: Duration = Duration::from_millis(200);
pub const INV_DELTA_CALLBACK_LIMIT: u64 = 10;

#[derive(Debug, Default)]
pub struct HeaderSyncState {
    pub target_height: u64,
    pub request_pending: bool,
    last_request_local_height: Option<u64>,
    last_request_at: Option<Duration>,
    retried_after_timeout: bool,
}

impl HeaderSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_peer_announced_height(&mut self, height: u64) {
        self.target_height = self.target_height.max(height);
    }

    /// Whether a fresh `getheaders` request should be suppressed because the
    /// last one targeted the same local height within the throttle window.
    fn throttled(&self, clock: &dyn Clock, local_height: u64, force: bool) -> bool {
        if force {
            return false;
        }
        match (self.last_request_local_height, self.last_request_at) {
            (Some(h), Some(at)) if h == local_height => clock.now().saturating_sub(at) < REQUEST_THROTTLE,
            _ => false,
        }
    }

    /// Returns `true` if a `getheaders` request should be sent now.
    pub fn should_request(&mut self, clock: &dyn Clock, store: &ChainStore, force: bool) -> bool {
        let local_height = store.total_height();
        if local_height >= self.target_height {
            return false;
        }
        if self.throttled(clock, local_height, force) {
            return false;
        }
        self.request_pending = true;
        self.last_request_local_height = Some(local_height);
        self.last_request_at = Some(clock.now());
        true
    }

    /// Whether the in-flight request has exceeded `SYNC_TIMEOUT` without a
    /// response; allows exactly one retry before the sync is reported as
    /// stalled to the caller.
    pub fn check_timeout(&mut self, clock: &dyn Clock) -> bool {
        if !self.request_pending {
            return false;
        }
        let elapsed = self
            .last_request_at
            .map(|at| clock.now().saturating_sub(at))
            .unwrap_or_default();
        if elapsed < SYNC_TIMEOUT {
            return false;
        }
        if !self.retried_after_timeout {
            self.retried_after_timeout = true;
            self.request_pending = false;
            false
        } else {
            true
        }
    }

    /// Apply a `headers` response: `added` is the count of headers that
    /// extended the store. Returns `Ok(true)` if sync should immediately
    /// re-request (chained pagination), `Ok(false)` if complete, or
    /// `Err(Error::SyncStalled)` if no progress was made below target.
    pub fn handle_headers_response(&mut self, store: &ChainStore, added: usize) -> Result<bool, Error> {
        self.request_pending = false;
        self.retried_after_timeout = false;
        let local_height = store.total_height();

        if added > 0 && local_height < self.target_height {
            return Ok(true);
        }
        if added == 0 && local_height >= self.target_height {
            return Ok(false);
        }
        if added == 0 && local_height < self.target_height {
            return Err(Error::SyncStalled);
        }
        Ok(false)
    }

    pub fn is_at_tip(&self, store: &ChainStore) -> bool {
        store.total_height() >= self.target_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::header::BlockHeader;
    use crate::clock::FakeClock;
    use crate::config::ChainParams;
    use tempfile::tempdir;

    fn genesis_hash_le(params: &ChainParams) -> [u8; 32] {
        let bytes = hex::decode(&params.genesis_hash_hex).unwrap();
        let mut le = [0u8; 32];
        for (i, b) in bytes.iter().rev().enumerate() {
            le[i] = *b;
        }
        le
    }

    fn fresh_store(params: &ChainParams) -> ChainStore {
        let dir = tempdir().unwrap();
        ChainStore::open(dir.path().join("headers.bin"), params.clone()).unwrap()
    }

    #[test]
    fn throttle_suppresses_repeat_request_at_same_height() {
        let clock = FakeClock::new();
        let params = ChainParams::default();
        let store = fresh_store(&params);
        let mut sync = HeaderSyncState::new();
        sync.note_peer_announced_height(3);

        assert!(sync.should_request(&clock, &store, false));
        sync.request_pending = false; // simulate a response handled elsewhere
        assert!(!sync.should_request(&clock, &store, false));

        clock.advance(Duration::from_secs(31));
        assert!(sync.should_request(&clock, &store, false));
    }

    #[test]
    fn stall_reported_when_no_progress_below_target() {
        let params = ChainParams::default();
        let store = fresh_store(&params);
        let mut sync = HeaderSyncState::new();
        sync.note_peer_announced_height(3);
        sync.request_pending = true;
        let result = sync.handle_headers_response(&store, 0);
        assert!(matches!(result, Err(Error::SyncStalled)));
    }

    #[test]
    fn chained_pagination_requested_while_below_target() {
        let params = ChainParams::default();
        let mut store = fresh_store(&params);
        let first = BlockHeader {
            version: 1,
            prev_hash: genesis_hash_le(&params),
            merkle_root: [0u8; 32],
            timestamp: 1000,
            bits: 0x1d00ffff,
            nonce: 0,
            proof_blob: Vec::new(),
        };
        let raw = first.serialize();
        assert!(store.add_header(first, raw));

        let mut sync = HeaderSyncState::new();
        sync.note_peer_announced_height(5);
        sync.request_pending = true;
        let result = sync.handle_headers_response(&store, 1).unwrap();
        assert!(result);
    }
}
