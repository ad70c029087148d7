//! Wallet client facade: owns the peer manager, chain store, header/filter
//! sync state, and wallet repository; dispatches parsed wire messages and
//! exposes the observer callbacks named in the external interface.
//!
//! Grounded on the teacher's node-facade ownership shape (a single struct
//! holding the non-consensus subsystems, never handing peers a back-pointer
//! to itself) — rebuilt around this crate's own sync/filter/wallet state
//! instead of full consensus validation. The network-facing half lives in
//! [`NetworkState`], split out from the wallet repository so a caller can
//! hold a live connection (via [`ClientScanDriver`]) and the wallet
//! repository mutably at the same time, per §3's ownership boundary
//! ("wallet repository holds a shared non-owning reference to the facade").

use crate::broadcast::{BroadcastCache, MEMPOOL_PROBE_DELAY, MSG_WITNESS_TX};
use crate::chain::header::BlockHeader;
use crate::chain::{ChainStore, HeaderSyncState};
use crate::clock::Clock;
use crate::codec::Reader;
use crate::config::ChainParams;
use crate::error::Error;
use crate::filters::FilterSyncState;
use crate::network::peer::{spawn_io_tasks, OutgoingFrame, PeerState};
use crate::network::{PeerManager, SelectionPurpose};
use crate::wallet::kv::KvStore;
use crate::wallet::{ScanDriver, WalletRepository};
use crate::wire::codec::Frame;
use crate::wire::message::{
    GetCfHeaders, GetCfilters, GetHeadersPayload, InventoryVector, InvPayload, Payload,
    VersionPayload, MSG_BLOCK, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Bounds every response-driven loop below: a peer that never sends the
/// expected reply trips this instead of looping forever.
const MAX_DRIVE_ITERATIONS: usize = 10_000;

/// Single-method observer interfaces (§9 design note: callback fields
/// become observer interfaces rather than raw function pointers).
pub trait ScanProgressObserver {
    fn scan_progress(&mut self, scanned: u64, total: u64, status: crate::wallet::ScanStatus);
}

pub trait NewBlockObserver {
    fn on_new_block(&mut self, height: u64);
}

pub trait ReorgObserver {
    fn on_reorg(&mut self, old_height: u64, new_height: u64, common_ancestor: u64);
}

pub trait StateChangedObserver {
    fn on_state_changed(&mut self);
}

/// A no-op observer set for callers that don't need notifications.
#[derive(Default)]
pub struct NullObserver;
impl ScanProgressObserver for NullObserver {
    fn scan_progress(&mut self, _scanned: u64, _total: u64, _status: crate::wallet::ScanStatus) {}
}
impl NewBlockObserver for NullObserver {
    fn on_new_block(&mut self, _height: u64) {}
}
impl ReorgObserver for NullObserver {
    fn on_reorg(&mut self, _old_height: u64, _new_height: u64, _common_ancestor: u64) {}
}
impl StateChangedObserver for NullObserver {
    fn on_state_changed(&mut self) {}
}

/// Peer-reject codes mapped to symbolic names (§4.10/§7).
pub fn reject_code_name(code: u8) -> &'static str {
    crate::broadcast::reject_code_name(code)
}

fn parse_reject(raw: &[u8]) -> (String, u8, String) {
    let mut r = Reader::new(raw);
    let command = r
        .read_varstr()
        .map(|b| String::from_utf8_lossy(&b).to_string())
        .unwrap_or_default();
    let code = r.read_u8().unwrap_or(0);
    let reason = r
        .read_varstr()
        .map(|b| String::from_utf8_lossy(&b).to_string())
        .unwrap_or_default();
    (command, code, reason)
}

/// One live outbound/inbound channel pair to a connected peer, installed by
/// [`spawn_io_tasks`].
struct PeerConnection {
    outgoing: mpsc::Sender<OutgoingFrame>,
    incoming: mpsc::Receiver<Frame>,
}

/// Everything the client needs to drive a live connection: peer bookkeeping,
/// header/filter sync state, the chain store, and the broadcast cache.
/// Deliberately excludes the wallet repository (see module docs) so a
/// caller can borrow this and the wallet disjointly.
pub struct NetworkState<C: Clock + Clone> {
    pub clock: C,
    pub params: ChainParams,
    pub peers: PeerManager<C>,
    pub chain: ChainStore,
    pub header_sync: HeaderSyncState,
    pub filters: FilterSyncState,
    pub broadcast_cache: BroadcastCache<C>,
    connections: HashMap<SocketAddr, PeerConnection>,
    last_error: Option<String>,
}

impl<C: Clock + Clone> NetworkState<C> {
    fn new(clock: C, params: ChainParams, max_connections: usize, discovery_enabled: bool, chain: ChainStore) -> Self {
        let broadcast_cache = BroadcastCache::new(clock.clone());
        Self {
            peers: PeerManager::new(clock.clone(), max_connections, discovery_enabled),
            clock,
            params,
            chain,
            header_sync: HeaderSyncState::new(),
            filters: FilterSyncState::new(),
            broadcast_cache,
            connections: HashMap::new(),
            last_error: None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn set_error(&mut self, err: &Error) {
        self.last_error = Some(err.to_string());
    }

    pub fn record_fatal(&mut self, err: Error) {
        self.set_error(&err);
    }

    /// Select a peer for the given purpose, deferring to the peer manager's
    /// preferred-peer override and round-robin policy.
    pub fn select_peer(&mut self, purpose: SelectionPurpose) -> Option<SocketAddr> {
        self.peers.select(purpose)
    }

    /// Record a `reject` message per §4.10/§7: logged, never auto-retried.
    pub fn handle_reject(&mut self, command: &str, code: u8, reason: &str) {
        tracing::warn!(
            command,
            code = reject_code_name(code),
            reason,
            "peer rejected message"
        );
    }

    fn build_getheaders(&self) -> Option<OutgoingFrame> {
        let locator = self.chain.build_block_locator();
        Some(OutgoingFrame {
            command: "getheaders",
            payload: GetHeadersPayload {
                protocol: PROTOCOL_VERSION,
                locator: locator.into_iter().map(|l| l.hash).collect(),
                stop_hash: [0u8; 32],
            }
            .encode(),
        })
    }

    async fn send_to(&mut self, addr: SocketAddr, frame: OutgoingFrame) -> Result<(), Error> {
        let conn = self.connections.get(&addr).ok_or(Error::SyncStalled)?;
        conn.outgoing.send(frame).await.map_err(|_| Error::SyncStalled)
    }

    async fn recv_from(&mut self, addr: SocketAddr) -> Result<Payload, Error> {
        let header_length = self.params.header_length;
        let conn = self.connections.get_mut(&addr).ok_or(Error::SyncStalled)?;
        let frame = conn.incoming.recv().await.ok_or(Error::SyncStalled)?;
        Payload::decode(&frame.command, &frame.payload, header_length).map_err(Error::Wire)
    }

    /// Dial `addr` over TCP and run the handshake to completion (§4.1).
    pub async fn connect_peer(&mut self, addr: SocketAddr, is_seed: bool) -> Result<(), Error> {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Wire(crate::error::WireError::Io(e)))?;
        self.attach_peer(addr, is_seed, stream).await
    }

    /// Wire an already-established stream (TCP in production, an in-memory
    /// duplex in tests) into a peer connection, send our `version`, and
    /// drive the connection until the handshake completes.
    pub async fn attach_peer<S>(&mut self, addr: SocketAddr, is_seed: bool, stream: S) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let (incoming_tx, incoming_rx) = mpsc::channel(64);
        spawn_io_tasks(stream, self.params.magic, outgoing_rx, incoming_tx);

        self.peers.insert(PeerState::new(addr, is_seed, &self.clock));
        self.connections.insert(addr, PeerConnection { outgoing: outgoing_tx, incoming: incoming_rx });

        let version = VersionPayload::handshake_default(self.clock.now().as_secs() as i64);
        self.send_to(addr, OutgoingFrame { command: "version", payload: version.encode() }).await?;
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.handshake.version_sent = true;
        }

        let mut iterations = 0usize;
        loop {
            let complete = self.peers.get_mut(&addr).map(|p| p.handshake.is_complete()).unwrap_or(false);
            if complete {
                return Ok(());
            }
            iterations += 1;
            if iterations > MAX_DRIVE_ITERATIONS {
                return Err(Error::HandshakeTimeout);
            }
            let payload = self.recv_from(addr).await?;
            let replies = self.handle_message(addr, payload)?;
            for reply in replies {
                self.send_to(addr, reply).await?;
            }
        }
    }

    /// Apply one decoded wire message from `addr`, updating the relevant
    /// state machine and returning any frames that should be sent back.
    pub fn handle_message(&mut self, addr: SocketAddr, payload: Payload) -> Result<Vec<OutgoingFrame>, Error> {
        let mut replies = Vec::new();
        match payload {
            Payload::Version(v) => {
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.service_flags = v.services;
                }
                if v.start_height > 0 {
                    self.header_sync.note_peer_announced_height(v.start_height as u64);
                }
                replies.push(OutgoingFrame { command: "verack", payload: Vec::new() });
            }
            Payload::Verack => {
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.handshake.verack_received = true;
                }
            }
            Payload::Ping(nonce) => {
                replies.push(OutgoingFrame { command: "pong", payload: nonce.to_le_bytes().to_vec() });
            }
            Payload::Pong(nonce) => {
                if let Some(peer) = self.peers.get_mut(&addr) {
                    if peer.last_ping_nonce == Some(nonce) {
                        peer.last_ping_nonce = None;
                    }
                }
            }
            Payload::Headers(headers) => {
                let mut added = 0usize;
                for raw in headers.raw_headers {
                    if let Some(header) = BlockHeader::parse(&raw, &self.params) {
                        if self.chain.add_header(header, raw) {
                            added += 1;
                        }
                    }
                }
                if self.header_sync.handle_headers_response(&self.chain, added)? {
                    if let Some(frame) = self.build_getheaders() {
                        replies.push(frame);
                    }
                }
            }
            Payload::Inv(inv) => {
                let mut wanted = Vec::new();
                for item in inv.items {
                    if item.inv_type == MSG_BLOCK {
                        self.header_sync.note_peer_announced_height(self.chain.total_height() + 1);
                        wanted.push(item);
                    } else if item.inv_type == crate::wire::message::MSG_TX
                        || item.inv_type == MSG_WITNESS_TX
                    {
                        if let Some(txid) = self.broadcast_cache.matches_inv_hash(&item.hash) {
                            self.broadcast_cache.remove(&txid);
                        }
                    }
                }
                if !wanted.is_empty() {
                    replies.push(OutgoingFrame {
                        command: "getdata",
                        payload: InvPayload { items: wanted }.encode(),
                    });
                }
            }
            Payload::Reject(raw) => {
                let (command, code, reason) = parse_reject(&raw);
                self.handle_reject(&command, code, &reason);
            }
            Payload::CfCheckpt(c) => {
                let stop_height = self.chain.total_height().saturating_sub(1);
                self.filters.handle_cfcheckpt(&c, stop_height);
            }
            Payload::CfHeaders(c) => {
                let start_height = self.filters.tip_filter_header().map(|(h, _)| h + 1).unwrap_or(0);
                self.filters.handle_cfheaders(&c, start_height).map_err(Error::Filter)?;
            }
            Payload::Cfilter(c) => {
                self.filters.handle_cfilter(&c).map_err(Error::Filter)?;
            }
            Payload::Addr(_)
            | Payload::AddrV2(_)
            | Payload::SendAddrV2
            | Payload::SendHeaders
            | Payload::SendCmpct(_)
            | Payload::GetHeaders(_)
            | Payload::GetData(_)
            | Payload::NotFound(_)
            | Payload::Tx(_)
            | Payload::Block(_)
            | Payload::CmpctBlock(_)
            | Payload::Mempool
            | Payload::FeeFilter(_)
            | Payload::GetCfCheckpt(_)
            | Payload::GetCfHeaders(_)
            | Payload::GetCfilters(_) => {}
        }
        Ok(replies)
    }

    /// Drive `getheaders`/`headers` exchange with `addr` until the header
    /// store reaches the peer-announced tip (spec property S1), or until
    /// the sync stalls/times out.
    pub async fn sync_to_tip(&mut self, addr: SocketAddr) -> Result<(), Error> {
        if self.header_sync.should_request(&self.clock, &self.chain, true) {
            if let Some(frame) = self.build_getheaders() {
                self.send_to(addr, frame).await?;
            }
        }

        let mut iterations = 0usize;
        while !self.header_sync.is_at_tip(&self.chain) {
            iterations += 1;
            if iterations > MAX_DRIVE_ITERATIONS {
                return Err(Error::SyncStalled);
            }
            let payload = self.recv_from(addr).await?;
            let replies = self.handle_message(addr, payload)?;
            for reply in replies {
                self.send_to(addr, reply).await?;
            }
            if self.header_sync.check_timeout(&self.clock) {
                return Err(Error::SyncStalled);
            }
        }
        Ok(())
    }

    /// Request and apply `[start, end]` filter headers then filters from
    /// `addr`, per §4.5's batch-then-checkpoint-validate flow.
    pub async fn request_filters(&mut self, addr: SocketAddr, start: u64, end: u64) -> Result<(), Error> {
        if start > end {
            return Ok(());
        }
        let stop_hash = self.chain.get_block_hash(end).ok_or(Error::SyncStalled)?;

        self.send_to(
            addr,
            OutgoingFrame {
                command: "getcfheaders",
                payload: GetCfHeaders { filter_type: 0, start_height: start as u32, stop_hash }.encode(),
            },
        )
        .await?;

        let mut iterations = 0usize;
        while self.filters.tip_filter_header().map(|(h, _)| h).unwrap_or(0) < end {
            iterations += 1;
            if iterations > MAX_DRIVE_ITERATIONS {
                return Err(Error::SyncStalled);
            }
            let payload = self.recv_from(addr).await?;
            let replies = self.handle_message(addr, payload)?;
            for reply in replies {
                self.send_to(addr, reply).await?;
            }
        }

        for height in start..=end {
            if let Some(hash) = self.chain.get_block_hash(height) {
                let _ = self.filters.begin_filter_request(height, hash);
            }
        }

        self.send_to(
            addr,
            OutgoingFrame {
                command: "getcfilters",
                payload: GetCfilters { filter_type: 0, start_height: start as u32, stop_hash }.encode(),
            },
        )
        .await?;

        for height in start..=end {
            let mut iterations = 0usize;
            while !self.filters.is_filter_cached(height) {
                iterations += 1;
                if iterations > MAX_DRIVE_ITERATIONS {
                    return Err(Error::SyncStalled);
                }
                let payload = self.recv_from(addr).await?;
                let replies = self.handle_message(addr, payload)?;
                for reply in replies {
                    self.send_to(addr, reply).await?;
                }
            }
        }
        Ok(())
    }

    /// Fetch block `height` via `getdata`, applying any other messages that
    /// arrive first through the normal dispatch path.
    pub async fn fetch_block(&mut self, addr: SocketAddr, height: u64) -> Result<Option<Vec<u8>>, Error> {
        let hash = match self.chain.get_block_hash(height) {
            Some(h) => h,
            None => return Ok(None),
        };
        let inv = InvPayload { items: vec![InventoryVector { inv_type: MSG_BLOCK, hash }] };
        self.send_to(addr, OutgoingFrame { command: "getdata", payload: inv.encode() }).await?;

        let mut iterations = 0usize;
        loop {
            iterations += 1;
            if iterations > MAX_DRIVE_ITERATIONS {
                return Err(Error::SyncStalled);
            }
            let payload = self.recv_from(addr).await?;
            if let Payload::Block(raw) = payload {
                return Ok(Some(raw));
            }
            let replies = self.handle_message(addr, payload)?;
            for reply in replies {
                self.send_to(addr, reply).await?;
            }
        }
    }

    /// Broadcast `raw_tx` via the inv/getdata mempool-probe dance (§4.10):
    /// announce an `inv`, then poll with `mempool` if the cache entry is
    /// still pending after the probe delay.
    pub async fn broadcast_tx(&mut self, addr: SocketAddr, non_witness_bytes: &[u8], raw_tx: Vec<u8>) -> Result<(), Error> {
        let txid = self.broadcast_cache.insert(non_witness_bytes, raw_tx);
        let inv = InvPayload { items: vec![InventoryVector { inv_type: MSG_WITNESS_TX, hash: txid }] };
        self.send_to(addr, OutgoingFrame { command: "inv", payload: inv.encode() }).await?;

        tokio::time::sleep(MEMPOOL_PROBE_DELAY).await;
        if self.broadcast_cache.contains(&txid) {
            self.send_to(addr, OutgoingFrame { command: "mempool", payload: Vec::new() }).await?;
        }
        Ok(())
    }
}

/// Ties the peer manager, chain state, sync state machines, and wallet
/// repository into one owning facade. Reorgs flow: `chain.truncate` then
/// `filters.truncate_above` then `wallet.handle_reorg`, per §4.11's reorg
/// strategy, always in that order.
pub struct WalletClient<C: Clock + Clone, K: KvStore> {
    pub network: NetworkState<C>,
    pub wallet: WalletRepository<K>,
}

impl<C: Clock + Clone, K: KvStore> WalletClient<C, K> {
    pub fn new(
        clock: C,
        params: ChainParams,
        max_connections: usize,
        discovery_enabled: bool,
        chain: ChainStore,
        wallet: WalletRepository<K>,
    ) -> Self {
        Self {
            network: NetworkState::new(clock, params, max_connections, discovery_enabled, chain),
            wallet,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.network.last_error()
    }

    /// Select a peer for the given purpose, deferring to the peer manager's
    /// preferred-peer override and round-robin policy.
    pub fn select_peer(&mut self, purpose: SelectionPurpose) -> Option<SocketAddr> {
        self.network.select_peer(purpose)
    }

    /// Process a `reorg`: invalidate headers, filter state, and UTXOs in the
    /// exact order mandated by §4.11's reorg strategy.
    pub fn handle_reorg(
        &mut self,
        common_ancestor_height: u64,
        old_height: u64,
        observer: &mut dyn ReorgObserver,
    ) -> Result<(), Error> {
        self.network.chain.truncate(common_ancestor_height).map_err(Error::ChainStore)?;
        self.network.filters.truncate_above(common_ancestor_height);
        self.wallet.handle_reorg(common_ancestor_height);
        observer.on_reorg(old_height, common_ancestor_height, common_ancestor_height);
        Ok(())
    }

    /// Record a `reject` message per §4.10/§7: logged, never auto-retried.
    pub fn handle_reject(&mut self, command: &str, code: u8, reason: &str) {
        self.network.handle_reject(command, code, reason);
    }

    /// Entry point driving `chain_store`/`filters`/`wallet` state through a
    /// failed operation's error path: records the visible error string (§7
    /// "Fatal user-visible errors ... set a visible error string on the
    /// client facade") without panicking.
    pub fn record_fatal(&mut self, err: Error) {
        self.network.record_fatal(err);
    }
}

/// Adapts the wallet repository's [`ScanDriver`] trait (pure/synchronous by
/// design, per §3's ownership boundary) onto the async [`NetworkState`]
/// methods, by blocking on a caller-supplied runtime. Construct from a
/// disjoint `&mut NetworkState`/`&mut WalletRepository` pair (e.g. via
/// `let WalletClient { network, wallet } = &mut client;`) so the repository
/// stays borrowable for `discover_utxos` while this holds the connection.
pub struct ClientScanDriver<'a, C: Clock + Clone> {
    network: &'a mut NetworkState<C>,
    rt: &'a tokio::runtime::Runtime,
    peer: SocketAddr,
}

impl<'a, C: Clock + Clone> ClientScanDriver<'a, C> {
    pub fn new(network: &'a mut NetworkState<C>, rt: &'a tokio::runtime::Runtime, peer: SocketAddr) -> Self {
        Self { network, rt, peer }
    }
}

impl<'a, C: Clock + Clone> ScanDriver for ClientScanDriver<'a, C> {
    fn tip_height(&mut self) -> u64 {
        let peer = self.peer;
        if let Err(err) = self.rt.block_on(self.network.sync_to_tip(peer)) {
            tracing::warn!(?err, "header sync did not reach tip before scan");
        }
        self.network.chain.total_height()
    }

    fn prefetch_filters(&mut self, start: u64, end: u64) {
        let peer = self.peer;
        if let Err(err) = self.rt.block_on(self.network.request_filters(peer, start, end)) {
            tracing::warn!(?err, start, end, "filter prefetch failed");
        }
    }

    fn filter_matches_scripts(&mut self, height: u64, scripts: &[&[u8]]) -> bool {
        match self.network.chain.get_block_hash(height) {
            Some(hash) => self.network.filters.filter_matches_scripts(height, &hash, scripts).unwrap_or(false),
            None => false,
        }
    }

    fn fetch_block(&mut self, height: u64) -> Option<Vec<u8>> {
        let peer = self.peer;
        match self.rt.block_on(self.network.fetch_block(peer, height)) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(?err, height, "block fetch failed");
                None
            }
        }
    }

    fn header_length(&self) -> u32 {
        self.network.params.header_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::wallet::kv::MemoryKvStore;
    use tempfile::tempdir;

    fn client(dir: &std::path::Path) -> WalletClient<FakeClock, MemoryKvStore> {
        let clock = FakeClock::new();
        let params = ChainParams::default();
        let chain = ChainStore::open(dir.join("headers.bin"), params.clone()).unwrap();
        let wallet = WalletRepository::new("w1", MemoryKvStore::new());
        WalletClient::new(clock, params, 8, false, chain, wallet)
    }

    #[test]
    fn reorg_truncates_chain_filters_and_wallet_in_order() {
        let dir = tempdir().unwrap();
        let mut c = client(dir.path());
        let mut observer = NullObserver;
        c.wallet.utxos_mut().insert(crate::wallet::Utxo {
            txid: "a".to_string(),
            vout: 0,
            value: 1,
            script_pub_key: "00".to_string(),
            address: "addr".to_string(),
            block_height: Some(5),
            confirmed: true,
            frozen: false,
        });
        c.handle_reorg(3, 10, &mut observer).unwrap();
        assert!(!c.wallet.utxos().to_vec()[0].confirmed);
    }

    #[test]
    fn fatal_error_sets_visible_string() {
        let dir = tempdir().unwrap();
        let mut c = client(dir.path());
        assert!(c.last_error().is_none());
        c.record_fatal(Error::SyncStalled);
        assert!(c.last_error().is_some());
    }

    #[tokio::test]
    async fn handshake_completes_over_in_memory_duplex() {
        let dir = tempdir().unwrap();
        let mut c = client(dir.path());
        let addr: SocketAddr = "127.0.0.1:8333".parse().unwrap();

        let (ours, theirs) = tokio::io::duplex(4096);
        let magic = c.network.params.magic;

        // Drive the peer side: read our version, reply version+verack.
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(theirs);
            let mut reader = crate::wire::codec::FrameReader::new(read_half, magic);
            let _their_version = reader.read_frame().await.unwrap();
            let peer_version = VersionPayload::handshake_default(0).encode();
            crate::wire::codec::write_frame(&mut write_half, magic, "version", &peer_version).await.unwrap();
            crate::wire::codec::write_frame(&mut write_half, magic, "verack", &[]).await.unwrap();
        });

        c.network.attach_peer(addr, true, ours).await.unwrap();
        assert!(c.network.peers.get_mut(&addr).unwrap().handshake.is_complete());
    }
}
