//! fundkit — command-line front end for descriptor wallets and unsigned
//! funding transactions.
//!
//! Every invocation is a fresh process: wallets and master nodes live only
//! as long as the command. `run` executes a JSON array of operations
//! against one shared toolkit so later steps can use earlier results.

mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fundkit_core::{AddressType, NetworkType};
use fundkit_esplora::{EsploraClient, EsploraDiscovery, TapeFaucet, tape_address_url};
use fundkit_wallet::wallet::WalletSource;
use fundkit_wallet::{Operation, OperationOutput, Toolkit, generate_mnemonic};
use serde::Serialize;
use tracing::{debug, info, warn};

use settings::{Overrides, Settings};

type EsploraToolkit = Toolkit<EsploraDiscovery<EsploraClient>, EsploraClient>;

/// Build descriptors, outputs and unsigned PSBTs from BIP39 wallets.
#[derive(Parser, Debug)]
#[command(name = "fundkit", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Settings file (default: <config_dir>/fundkit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network: bitcoin, testnet, regtest or tape
    #[arg(long, global = true)]
    network: Option<String>,

    /// Esplora base URL, overriding the network default
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new BIP39 mnemonic.
    Mnemonic {
        /// Entropy bits: 128, 160, 192, 224 or 256
        #[arg(long, default_value_t = 128)]
        strength: usize,
    },
    /// Print the master key fingerprint of a mnemonic.
    Fingerprint {
        #[arg(long)]
        mnemonic: String,
    },
    /// Register a wallet and print its descriptors.
    Wallet(WalletArgs),
    /// Materialize an output from a descriptor or address.
    Output {
        #[arg(long)]
        descriptor: String,
        /// Child index for ranged descriptors
        #[arg(long)]
        index: Option<u32>,
        /// Hex public keys expected to sign (comma-separated)
        #[arg(long, value_delimiter = ',')]
        signers: Option<Vec<String>>,
    },
    /// Build an unsigned PSBT paying `amount` sats to `to`.
    Fund {
        #[command(flatten)]
        wallet: WalletArgs,
        /// Destination address
        #[arg(long)]
        to: String,
        /// Amount in satoshis
        #[arg(long)]
        amount: u64,
        /// Fee rate in sat/vB (default from settings)
        #[arg(long)]
        fee_rate: Option<u64>,
    },
    /// Request coins from the Tape faucet (tape network only).
    Faucet {
        /// Tape address to receive the coins
        address: String,
    },
    /// Execute a JSON array of operations from a file.
    Run {
        ops: PathBuf,
    },
}

#[derive(Args, Debug)]
struct WalletArgs {
    #[arg(long)]
    mnemonic: String,
    /// Address types (comma-separated): wpkh, pkh, sh-wpkh
    #[arg(long, value_delimiter = ',')]
    types: Option<Vec<String>>,
}

impl WalletArgs {
    fn address_types(&self) -> Result<Option<Vec<AddressType>>> {
        self.types
            .as_ref()
            .map(|names| {
                names
                    .iter()
                    .map(|n| n.parse::<AddressType>().with_context(|| format!("unknown address type {n:?}")))
                    .collect()
            })
            .transpose()
    }
}

/// One entry of the `run` report.
#[derive(Serialize)]
#[serde(untagged)]
enum RunResult {
    Ok(OperationOutput),
    Err { op: &'static str, error: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        network: cli.global.network.clone(),
        esplora_url: cli.global.esplora_url.clone(),
        log_level: cli.global.log_level.clone(),
        log_format: cli.global.log_format.clone(),
    };
    let settings = Settings::load(cli.global.config.as_deref(), &overrides)?;
    init_logging(&settings.log_level, &settings.log_format);
    debug!(?settings, "loaded settings");

    let network = settings.network()?;
    let toolkit = build_toolkit(&settings, network)?;

    match cli.command {
        Command::Mnemonic { strength } => {
            println!("{}", generate_mnemonic(strength)?);
        }
        Command::Fingerprint { mnemonic } => {
            let fingerprint = toolkit.masters().derive_master_node(&mnemonic, network)?;
            println!("{fingerprint}");
        }
        Command::Wallet(args) => {
            let types = args.address_types()?;
            let info = toolkit
                .wallets()
                .create_wallet(WalletSource::Mnemonic(args.mnemonic), network, types.as_deref())?;
            print_json(&info)?;
        }
        Command::Output {
            descriptor,
            index,
            signers,
        } => {
            let out = toolkit
                .execute(Operation::GetOutput {
                    descriptor,
                    network: network.to_string(),
                    signers,
                    index,
                    preimages: Vec::new(),
                })
                .await?;
            print_json(&out)?;
        }
        Command::Fund {
            wallet,
            to,
            amount,
            fee_rate,
        } => {
            let types = wallet.address_types()?;
            let info = toolkit
                .wallets()
                .create_wallet(WalletSource::Mnemonic(wallet.mnemonic), network, types.as_deref())?;
            let fee_rate = match fee_rate {
                Some(rate) => fundkit_core::FeeRate::from_sat_per_vb(rate)?,
                None => settings.fee_rate()?,
            };
            info!(wallet_id = info.wallet_id, %to, amount, %fee_rate, "funding");
            let unsigned = toolkit
                .create_unsigned_tx(info.wallet_id, &to, amount, fee_rate)
                .await
                .context("could not build the funding transaction")?;
            print_json(&serde_json::json!({
                "psbt_base64": unsigned.to_base64(),
                "fee": unsigned.fee(),
                "vsize": unsigned.vsize(),
            }))?;
        }
        Command::Faucet { address } => {
            if network != NetworkType::Tape {
                anyhow::bail!("the faucet only serves the tape network, not {network}");
            }
            let OperationOutput::FaucetTape { address, response } = toolkit.execute(Operation::FaucetTape { address }).await?
            else {
                anyhow::bail!("unexpected faucet reply");
            };
            let response = serde_json::from_str(&response).unwrap_or(serde_json::Value::String(response));
            print_json(&serde_json::json!({
                "address": address,
                "response": response,
                "explorer": tape_address_url(&address),
            }))?;
        }
        Command::Run { ops } => {
            let text = std::fs::read_to_string(&ops).with_context(|| format!("failed to read {}", ops.display()))?;
            let operations: Vec<Operation> =
                serde_json::from_str(&text).with_context(|| format!("{} is not a JSON array of operations", ops.display()))?;
            let mut report = Vec::with_capacity(operations.len());
            for op in operations {
                let name = op.name();
                match toolkit.execute(op).await {
                    Ok(out) => report.push(RunResult::Ok(out)),
                    Err(e) => {
                        warn!(op = name, error = %e, "operation failed");
                        report.push(RunResult::Err {
                            op: name,
                            error: e.to_string(),
                        });
                    }
                }
            }
            print_json(&report)?;
        }
    }
    Ok(())
}

fn build_toolkit(settings: &Settings, network: NetworkType) -> Result<EsploraToolkit> {
    let esplora = settings.esplora()?;
    info!(%network, url = %esplora.url, gap_limit = esplora.gap_limit, "using esplora");
    let gap_limit = esplora.gap_limit;
    let client = EsploraClient::new(esplora).context("failed to build the HTTP client")?;
    let timeout = client.config().timeout;
    let discovery = EsploraDiscovery::new(client.clone(), network).with_gap_limit(gap_limit);
    let toolkit = Toolkit::new(discovery, client);
    if network == NetworkType::Tape {
        let faucet = TapeFaucet::new(network, timeout).context("failed to build the faucet client")?;
        return Ok(toolkit.with_faucet(faucet));
    }
    Ok(toolkit)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing on stderr with the given level and output format.
///
/// `format = "json"` emits structured lines; anything else is plain text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
