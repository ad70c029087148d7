//! Configuration: chain parameters and wallet/client options.
//!
//! Grounded on the teacher's `NodeConfig` pattern: serde structs with
//! `#[serde(default = "fn")]` field defaults, an explicit `Default` impl, and
//! `from_json_file`/`to_json_file` plus `validate()`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Injectable, chain-specific parameters (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainParams {
    /// Wire-level magic, little-endian on the wire.
    pub magic: u32,
    #[serde(default = "default_p2p_port")]
    pub default_p2p_port: u16,
    /// Total header record width on disk; must be >= 80 (the canonical
    /// Bitcoin fields); bytes beyond 80 are an opaque proof-blob extension.
    pub header_length: u32,
    /// Display (big-endian / human) genesis hash.
    pub genesis_hash_hex: String,
    pub pubkey_address_prefix: u8,
    pub script_address_prefix: u8,
    pub bech32_hrp: String,
    pub coin_type: u32,
    /// Header-hash cutover timestamps (see §6 "Header hash rules").
    pub t1: u32,
    pub t2: u32,
}

fn default_p2p_port() -> u16 {
    8333
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            magic: 0xd9b4bef9,
            default_p2p_port: default_p2p_port(),
            header_length: 80,
            genesis_hash_hex:
                "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26".to_string(),
            pubkey_address_prefix: 0x00,
            script_address_prefix: 0x05,
            bech32_hrp: "bc".to_string(),
            coin_type: 0,
            t1: 0,
            t2: 0,
        }
    }
}

impl ChainParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.header_length < 80 {
            anyhow::bail!("header_length must be at least 80, got {}", self.header_length);
        }
        if hex::decode(&self.genesis_hash_hex)?.len() != 32 {
            anyhow::bail!("genesis_hash_hex must decode to 32 bytes");
        }
        if self.bech32_hrp.is_empty() {
            anyhow::bail!("bech32_hrp must not be empty");
        }
        Ok(())
    }
}

/// Wallet/client runtime options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub discovery_enabled: bool,
    #[serde(default = "default_headers_path")]
    pub headers_path: String,
    #[serde(default = "default_kv_path")]
    pub kv_path: String,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    /// Hex-encoded BIP32 master seed. Absent means the wallet has no key
    /// material configured yet; operations needing signing/derivation fail
    /// with `WalletError::NotInitialized` until this is set.
    #[serde(default)]
    pub seed_hex: Option<String>,
    /// Peer addresses (`host:port`) to dial for network-driven commands. The
    /// first entry is used; later entries are a fallback list for future use.
    #[serde(default)]
    pub seed_peers: Vec<String>,
}

fn default_max_connections() -> usize {
    1
}

fn default_headers_path() -> String {
    "headers.bin".to_string()
}

fn default_kv_path() -> String {
    "wallet.kv".to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            discovery_enabled: false,
            headers_path: default_headers_path(),
            kv_path: default_kv_path(),
            logging: None,
            seed_hex: None,
            seed_peers: Vec::new(),
        }
    }
}

impl WalletConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    #[serde(default)]
    pub json_format: bool,
}
