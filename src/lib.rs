//! A Neutrino-style (BIP157/158) light Bitcoin wallet client.
//!
//! Connects to full-node peers over the Bitcoin wire protocol, syncs block
//! headers and compact filters instead of the full chain, derives BIP32/BIP44
//! keys, and builds, signs, and broadcasts P2WPKH transactions.
//!
//! Module layout follows the dependency order in which the pieces build on
//! each other: wire codec → peer manager → header store → header/filter sync
//! → address codec + key derivation → block parser → transaction builder and
//! signer → wallet repository → client facade.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod address;
pub mod block;
pub mod broadcast;
pub mod chain;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod filters;
pub mod keys;
pub mod network;
pub mod signer;
pub mod txbuilder;
pub mod utils;
pub mod wallet;
pub mod wire;

pub use chain::ChainStore;
pub use client::WalletClient;
pub use config::{ChainParams, WalletConfig};
pub use error::{Error, Result};
