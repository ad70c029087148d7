//! Thin CLI entry point: parses flags, initializes logging, and drives a
//! single wallet operation against a configured chain.

use clap::{Parser, Subcommand};
use lwallet::client::ClientScanDriver;
use lwallet::clock::SystemClock;
use lwallet::config::{ChainParams, WalletConfig};
use lwallet::error::WalletError;
use lwallet::keys::ExtendedPrivKey;
use lwallet::utils::init_logging;
use lwallet::wallet::kv::SledKvStore;
use lwallet::wallet::WalletRepository;
use lwallet::{ChainStore, WalletClient};

#[derive(Parser)]
#[command(name = "lwallet-cli", about = "Neutrino-style light Bitcoin wallet client")]
struct Cli {
    #[arg(long, default_value = "wallet.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the wallet's current UTXO set.
    Balance,
    /// Rescan the chain for wallet transactions.
    Scan {
        #[arg(long, default_value_t = false)]
        full: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = WalletConfig::from_json_file(&cli.config).unwrap_or_default();
    init_logging(config.logging.as_ref().and_then(|l| l.filter.as_deref()));

    let params = ChainParams::default();
    let chain = ChainStore::open(&config.headers_path, params.clone())?;
    let kv = SledKvStore::open(&config.kv_path)?;
    let mut wallet = WalletRepository::new("default", kv);
    wallet.load()?;

    let mut client = WalletClient::new(
        SystemClock,
        params.clone(),
        config.max_connections,
        config.discovery_enabled,
        chain,
        wallet,
    );

    match cli.command {
        Command::Balance => {
            let spendable: u64 = client.wallet.utxos().spendable().iter().map(|u| u.value).sum();
            println!("spendable balance: {spendable} sats");
        }
        Command::Scan { full } => {
            let seed_hex = match config.seed_hex.as_deref() {
                Some(s) => s,
                None => return Err(lwallet::Error::Wallet(WalletError::NotInitialized).into()),
            };
            let seed = hex::decode(seed_hex)?;
            let master = ExtendedPrivKey::master_from_seed(&seed)?;
            let secp = secp256k1::Secp256k1::new();

            let peer_addr: std::net::SocketAddr = config
                .seed_peers
                .first()
                .ok_or_else(|| anyhow::anyhow!("no seed peers configured"))?
                .parse()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(client.network.connect_peer(peer_addr, true))?;

            let WalletClient { network, wallet } = &mut client;
            let mut driver = ClientScanDriver::new(network, &rt, peer_addr);
            wallet.discover_utxos(&mut driver, &master, &secp, &params, full, 0, None)?;

            println!("scan complete");
        }
    }

    Ok(())
}
