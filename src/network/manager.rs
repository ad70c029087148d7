//! Peer manager: connection set, handshake-complete selection policies,
//! keep-alive pings, and constant-delay reconnects.
//!
//! Selection-cursor shape grounded on the teacher's round-robin peer
//! selection in `network/`; the reconnect backoff is a single comparison
//! against a constant 30s base/cap (§4.2 specifies base=cap=30s, not
//! geometric growth), so it is hand-rolled here rather than routed through
//! a generic backoff helper.

use crate::clock::Clock;
use crate::network::peer::PeerState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

pub const BACKOFF_BASE: Duration = Duration::from_secs(30);
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPurpose {
    Headers,
    Filters,
    Data,
}

struct ReconnectState {
    next_attempt_at: Duration,
    ever_succeeded: bool,
}

pub struct PeerManager<C: Clock> {
    clock: C,
    max_connections: usize,
    peers: HashMap<SocketAddr, PeerState>,
    reconnects: HashMap<SocketAddr, ReconnectState>,
    preferred_peer: Option<SocketAddr>,
    headers_cursor: usize,
    data_cursor: usize,
    discovery_enabled: bool,
    banned: Vec<SocketAddr>,
}

impl<C: Clock> PeerManager<C> {
    pub fn new(clock: C, max_connections: usize, discovery_enabled: bool) -> Self {
        Self {
            clock,
            max_connections,
            peers: HashMap::new(),
            reconnects: HashMap::new(),
            preferred_peer: None,
            headers_cursor: 0,
            data_cursor: 0,
            discovery_enabled,
            banned: Vec::new(),
        }
    }

    pub fn discovery_enabled(&self) -> bool {
        self.discovery_enabled
    }

    pub fn has_capacity(&self) -> bool {
        self.peers.len() < self.max_connections
    }

    pub fn is_banned(&self, addr: &SocketAddr) -> bool {
        self.banned.contains(addr)
    }

    pub fn ban(&mut self, addr: SocketAddr) {
        if !self.banned.contains(&addr) {
            self.banned.push(addr);
        }
        self.remove(&addr);
    }

    pub fn insert(&mut self, peer: PeerState) {
        self.reconnects.remove(&peer.addr);
        self.peers.insert(peer.addr, peer);
    }

    pub fn remove(&mut self, addr: &SocketAddr) {
        self.peers.remove(addr);
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut PeerState> {
        self.peers.get_mut(addr)
    }

    pub fn set_preferred(&mut self, addr: Option<SocketAddr>) {
        self.preferred_peer = addr;
    }

    fn active_peers(&self) -> Vec<&PeerState> {
        self.peers.values().filter(|p| p.is_active()).collect()
    }

    /// Select a peer for the given purpose, honoring the preferred-peer
    /// override, then round-robin among eligible candidates.
    pub fn select(&mut self, purpose: SelectionPurpose) -> Option<SocketAddr> {
        if let Some(preferred) = self.preferred_peer {
            if let Some(peer) = self.peers.get(&preferred) {
                if self.eligible(peer, purpose) {
                    return Some(preferred);
                }
            }
        }

        let mut candidates: Vec<SocketAddr> = self
            .active_peers()
            .into_iter()
            .filter(|p| self.eligible(p, purpose))
            .map(|p| p.addr)
            .collect();
        candidates.sort();
        if candidates.is_empty() {
            return None;
        }

        let cursor = match purpose {
            SelectionPurpose::Headers => &mut self.headers_cursor,
            SelectionPurpose::Filters => &mut self.data_cursor,
            SelectionPurpose::Data => &mut self.data_cursor,
        };
        *cursor %= candidates.len();
        let selected = candidates[*cursor];
        *cursor = (*cursor + 1) % candidates.len();
        Some(selected)
    }

    fn eligible(&self, peer: &PeerState, purpose: SelectionPurpose) -> bool {
        if !peer.is_active() {
            return false;
        }
        match purpose {
            SelectionPurpose::Headers | SelectionPurpose::Data => true,
            SelectionPurpose::Filters => peer.supports_compact_filters(),
        }
    }

    /// Schedule a reconnect for `addr` with the constant 30s base/cap delay,
    /// resetting to immediate retry on the first subsequent success.
    pub fn schedule_reconnect(&mut self, addr: SocketAddr) {
        let now = self.clock.now();
        let state = self.reconnects.entry(addr).or_insert(ReconnectState {
            next_attempt_at: now,
            ever_succeeded: false,
        });
        state.next_attempt_at = now + BACKOFF_BASE.min(BACKOFF_CAP);
    }

    pub fn mark_reconnect_success(&mut self, addr: SocketAddr) {
        self.reconnects.entry(addr).and_modify(|s| s.ever_succeeded = true);
    }

    pub fn ready_to_reconnect(&self, addr: &SocketAddr) -> bool {
        match self.reconnects.get(addr) {
            Some(state) => self.clock.now() >= state.next_attempt_at,
            None => true,
        }
    }

    pub fn due_for_ping(&self, addr: &SocketAddr) -> bool {
        match self.peers.get(addr) {
            Some(peer) => match peer.last_ping_sent_at {
                Some(last) => self.clock.now().saturating_sub(last) >= PING_INTERVAL,
                None => true,
            },
            None => false,
        }
    }
}
