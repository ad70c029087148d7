//! Crate-wide error taxonomy
//!
//! One `thiserror` enum per module boundary, composed into a single top-level
//! [`Error`] via `#[from]`. Library code returns `Result<T, Error>`; the CLI
//! binary widens to `anyhow::Result` at its edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("magic mismatch")]
    MagicMismatch,
    #[error("checksum mismatch for command {0}")]
    ChecksumMismatch(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChainStoreError {
    #[error("header linkage rejected at height {0}")]
    BadLinkage(u64),
    #[error("duplicate header")]
    Duplicate,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("checkpoint mismatch at height {0}")]
    CheckpointMismatch(u64),
    #[error("filter decode failed")]
    Decode,
    #[error("filter not available for height {0}")]
    NotAvailable(u64),
    #[error("too many in-flight filter requests")]
    BackpressureExceeded,
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid witness version")]
    InvalidWitnessVersion,
    #[error("invalid witness program length")]
    InvalidWitnessLength,
    #[error("invalid bech32/bech32m encoding")]
    InvalidEncoding,
    #[error("bech32/bech32m variant does not match witness version")]
    UnsupportedVariant,
    #[error("invalid human-readable part")]
    InvalidHrp,
    #[error("invalid base58check encoding")]
    InvalidBase58,
    #[error("invalid base58check checksum")]
    InvalidChecksum,
    #[error("unrecognized script")]
    UnrecognizedScript,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("seed must be between 16 and 64 bytes")]
    InvalidSeedLength,
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("hardened derivation requested from a public-only node")]
    HardenedFromPublic,
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

#[derive(Debug, Error)]
pub enum TxBuilderError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("sweep output below dust limit: {0} sats")]
    BelowDust(u64),
    #[error("no outpoints specified for explicit selection")]
    NoOutpointsSpecified,
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
    #[error("signature failed post-sign verification")]
    VerificationFailed,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet not initialized")]
    NotInitialized,
    #[error(transparent)]
    Kv(#[from] sled::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    ChainStore(#[from] ChainStoreError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    TxBuilder(#[from] TxBuilderError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("chain sync stalled")]
    SyncStalled,
    #[error("peer handshake timed out")]
    HandshakeTimeout,
}

pub type Result<T> = std::result::Result<T, Error>;
