//! Message framing: 4-byte magic, 12-byte zero-padded command, 4-byte LE
//! payload length, 4-byte checksum, then the payload. Resyncs one byte at a
//! time on a magic or checksum mismatch.
//!
//! Grounded on the pack's protocol-engine `network.rs` message-framing
//! shape, rebuilt here over `tokio::io::AsyncRead` with the crate's own
//! checksum/resync contract from §4.1.

use crate::error::WireError;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_LEN: usize = 24;
const MAX_PAYLOAD: usize = 32 * 1024 * 1024;

pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&double_sha256(payload)[..4]);
    out
}

pub fn command_bytes(command: &str) -> [u8; 12] {
    let mut out = [0u8; 12];
    let bytes = command.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

pub fn command_str(raw: &[u8; 12]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(12);
    String::from_utf8_lossy(&raw[..end]).to_string()
}

pub struct Frame {
    pub command: String,
    pub payload: Vec<u8>,
}

pub fn encode_frame(magic: u32, command: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&command_bytes(command));
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&checksum(payload));
    out.extend_from_slice(payload);
    out
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    magic: u32,
    command: &str,
    payload: &[u8],
) -> Result<(), WireError> {
    writer.write_all(&encode_frame(magic, command, payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Byte-accumulating reader with resync-on-mismatch, per §4.1.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    magic: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, magic: u32) -> Self {
        Self { inner, buf: Vec::new(), magic }
    }

    async fn fill(&mut self, at_least: usize) -> Result<(), WireError> {
        let mut chunk = [0u8; 4096];
        while self.buf.len() < at_least {
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Err(WireError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed connection",
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Read the next well-formed frame, discarding garbage bytes until the
    /// magic and checksum both align.
    pub async fn read_frame(&mut self) -> Result<Frame, WireError> {
        loop {
            self.fill(HEADER_LEN).await?;

            let magic = u32::from_le_bytes(self.buf[0..4].try_into().unwrap());
            if magic != self.magic {
                self.buf.remove(0);
                continue;
            }

            let command_raw: [u8; 12] = self.buf[4..16].try_into().unwrap();
            let payload_len = u32::from_le_bytes(self.buf[16..20].try_into().unwrap()) as usize;
            let expected_checksum: [u8; 4] = self.buf[20..24].try_into().unwrap();

            if payload_len > MAX_PAYLOAD {
                self.buf.remove(0);
                continue;
            }

            self.fill(HEADER_LEN + payload_len).await?;
            let payload = self.buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec();

            if checksum(&payload) != expected_checksum {
                tracing::warn!("frame checksum mismatch, resyncing");
                self.buf.remove(0);
                continue;
            }

            self.buf.drain(..HEADER_LEN + payload_len);
            return Ok(Frame { command: command_str(&command_raw), payload });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_single_frame() {
        let magic = 0xd9b4bef9u32;
        let frame = encode_frame(magic, "verack", &[]);
        let mut reader = FrameReader::new(std::io::Cursor::new(frame), magic);
        let parsed = reader.read_frame().await.unwrap();
        assert_eq!(parsed.command, "verack");
        assert!(parsed.payload.is_empty());
    }

    #[tokio::test]
    async fn resyncs_past_garbage_prefix() {
        let magic = 0xd9b4bef9u32;
        let mut stream = vec![0xaau8, 0xbb, 0xcc];
        stream.extend_from_slice(&encode_frame(magic, "ping", &8u64.to_le_bytes()));
        let mut reader = FrameReader::new(std::io::Cursor::new(stream), magic);
        let parsed = reader.read_frame().await.unwrap();
        assert_eq!(parsed.command, "ping");
    }

    #[tokio::test]
    async fn resyncs_past_bad_checksum() {
        let magic = 0xd9b4bef9u32;
        let mut bad = encode_frame(magic, "ping", &8u64.to_le_bytes());
        let len = bad.len();
        bad[len - 1] ^= 0xff; // corrupt payload without touching checksum
        bad.extend_from_slice(&encode_frame(magic, "pong", &8u64.to_le_bytes()));
        let mut reader = FrameReader::new(std::io::Cursor::new(bad), magic);
        let parsed = reader.read_frame().await.unwrap();
        assert_eq!(parsed.command, "pong");
    }
}
