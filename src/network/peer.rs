//! Per-peer connection state: handshake tracking, service flags, and the
//! read/write task split over a TCP stream.
//!
//! Grounded on the pack's protocol-engine `PeerState` shape (seed/non-seed
//! flag, service flags, handshake phase, last-message/ping bookkeeping),
//! rebuilt here over this crate's own [`crate::wire::codec::FrameReader`].

use crate::clock::Clock;
use crate::wire::codec::{write_frame, FrameReader};
use crate::wire::message::NODE_COMPACT_FILTERS;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakePhase {
    pub version_sent: bool,
    pub verack_received: bool,
}

impl HandshakePhase {
    pub fn is_complete(&self) -> bool {
        self.version_sent && self.verack_received
    }
}

#[derive(Debug, Clone)]
pub struct PeerState {
    pub addr: SocketAddr,
    pub is_seed: bool,
    pub service_flags: u64,
    pub handshake: HandshakePhase,
    pub last_message_at: Duration,
    pub last_ping_nonce: Option<u64>,
    pub last_ping_sent_at: Option<Duration>,
    pub last_addr_request_at: Option<Duration>,
    pub banned: bool,
}

impl PeerState {
    pub fn new(addr: SocketAddr, is_seed: bool, clock: &dyn Clock) -> Self {
        Self {
            addr,
            is_seed,
            service_flags: 0,
            handshake: HandshakePhase::default(),
            last_message_at: clock.now(),
            last_ping_nonce: None,
            last_ping_sent_at: None,
            last_addr_request_at: None,
            banned: false,
        }
    }

    pub fn supports_compact_filters(&self) -> bool {
        self.service_flags & NODE_COMPACT_FILTERS != 0
    }

    pub fn is_active(&self) -> bool {
        self.handshake.is_complete() && !self.banned
    }
}

/// An outbound frame queued for a peer's write half.
pub struct OutgoingFrame {
    pub command: &'static str,
    pub payload: Vec<u8>,
}

/// Spawns the read/write task split for a connected peer. The write half
/// drains `outgoing`; the read half forwards parsed frames to `incoming`.
/// The reader must never block the writer (§4.1), hence the split tasks.
pub fn spawn_io_tasks<S>(
    stream: S,
    magic: u32,
    mut outgoing: mpsc::Receiver<OutgoingFrame>,
    incoming: mpsc::Sender<crate::wire::codec::Frame>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    tokio::spawn(async move {
        let mut reader = FrameReader::new(read_half, magic);
        loop {
            match reader.read_frame().await {
                Ok(frame) => {
                    if incoming.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(?err, "peer read loop ending");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if let Err(err) = write_frame(&mut write_half, magic, frame.command, &frame.payload).await {
                tracing::warn!(?err, "peer write loop ending");
                break;
            }
        }
    });
}

pub fn handshake_timed_out(phase: &HandshakePhase) -> bool {
    !phase.is_complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn handshake_incomplete_until_both_sides() {
        let mut phase = HandshakePhase::default();
        assert!(!phase.is_complete());
        phase.version_sent = true;
        assert!(!phase.is_complete());
        phase.verack_received = true;
        assert!(phase.is_complete());
    }

    #[test]
    fn filter_capability_checks_service_bit() {
        let clock = FakeClock::new();
        let addr: SocketAddr = "127.0.0.1:8333".parse().unwrap();
        let mut peer = PeerState::new(addr, false, &clock);
        assert!(!peer.supports_compact_filters());
        peer.service_flags = NODE_COMPACT_FILTERS;
        assert!(peer.supports_compact_filters());
    }
}
