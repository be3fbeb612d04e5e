//! Closed set of typed operations and the [`Toolkit`] that executes them.
//!
//! Operations arrive as JSON objects tagged by `op`:
//!
//! ```json
//! {"op": "create_wallet", "mnemonic": "abandon ... about", "network": "regtest"}
//! ```
//!
//! Network and address-type names stay strings on the wire so that bad
//! values surface as `InvalidNetwork` / `UnsupportedAddressType` instead of
//! a generic decode error.

use std::sync::Arc;

use fundkit_core::{AddressType, Chain, DerivationIndex, Discovery, Explorer, Faucet, FeeRate, NetworkType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::builder::{TransactionAssembler, UnsignedTransaction};
use crate::coin_selection::{ensure_network, CoinSelect, CoinSelectionOrchestrator};
use crate::descriptor::DescriptorFactory;
use crate::error::WalletError;
use crate::keys::{parse_fingerprint, MasterNodeRegistry};
use crate::mnemonic::{generate_mnemonic, DEFAULT_STRENGTH};
use crate::output::{OutputMaterializer, Preimage};
use crate::wallet::{WalletInfo, WalletRegistry, WalletSource};

fn default_strength() -> usize {
    DEFAULT_STRENGTH
}

fn default_fee_rate() -> u64 {
    FeeRate::DEFAULT.sat_per_vb()
}

fn default_chain() -> u32 {
    Chain::External.index()
}

fn default_index() -> DerivationIndex {
    DerivationIndex::Wildcard
}

/// A request to the toolkit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    GenerateMnemonic {
        #[serde(default = "default_strength")]
        strength: usize,
    },
    DeriveMasterNode {
        mnemonic: String,
        network: String,
    },
    GetDescriptor {
        fingerprint: String,
        address_type: String,
        network: String,
        #[serde(default)]
        account: u32,
        #[serde(default = "default_chain")]
        chain: u32,
        #[serde(default = "default_index")]
        index: DerivationIndex,
    },
    GetOutput {
        descriptor: String,
        network: String,
        #[serde(default)]
        signers: Option<Vec<String>>,
        #[serde(default)]
        index: Option<u32>,
        #[serde(default)]
        preimages: Vec<Preimage>,
    },
    /// Exactly one of `fingerprint` / `mnemonic` may be set; neither
    /// generates a fresh phrase.
    CreateWallet {
        #[serde(default)]
        fingerprint: Option<String>,
        #[serde(default)]
        mnemonic: Option<String>,
        network: String,
        #[serde(default)]
        descriptor_types: Option<Vec<String>>,
    },
    CreateUnsignedTx {
        wallet_id: u64,
        to: String,
        amount: u64,
        #[serde(default = "default_fee_rate")]
        fee_rate: u64,
    },
    /// Request Tape coins for `address`.
    FaucetTape {
        address: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateMnemonic { .. } => "generate_mnemonic",
            Self::DeriveMasterNode { .. } => "derive_master_node",
            Self::GetDescriptor { .. } => "get_descriptor",
            Self::GetOutput { .. } => "get_output",
            Self::CreateWallet { .. } => "create_wallet",
            Self::CreateUnsignedTx { .. } => "create_unsigned_tx",
            Self::FaucetTape { .. } => "faucet_tape",
        }
    }
}

/// The result of an [`Operation`], tagged with the same `op` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationOutput {
    GenerateMnemonic { mnemonic: String },
    DeriveMasterNode { fingerprint: String },
    GetDescriptor { descriptor: String },
    GetOutput { address: String, kind: String, segwit: bool },
    CreateWallet(WalletInfo),
    CreateUnsignedTx { psbt_base64: String, fee: u64, vsize: u64 },
    FaucetTape { address: String, response: String },
}

/// Owns one instance of every registry and the collaborators, and runs
/// [`Operation`]s against them.
pub struct Toolkit<D, E> {
    masters: Arc<MasterNodeRegistry>,
    factory: DescriptorFactory,
    outputs: Arc<OutputMaterializer>,
    wallets: Arc<WalletRegistry>,
    funding: CoinSelectionOrchestrator<D>,
    assembler: TransactionAssembler<E>,
    faucet: Option<Box<dyn Faucet>>,
}

impl<D: Discovery, E: Explorer> Toolkit<D, E> {
    pub fn new(discovery: D, explorer: E) -> Self {
        let masters = Arc::new(MasterNodeRegistry::new());
        let factory = DescriptorFactory::new(Arc::clone(&masters));
        let outputs = Arc::new(OutputMaterializer::new());
        let wallets = Arc::new(WalletRegistry::new(Arc::clone(&masters), factory.clone()));
        let funding = CoinSelectionOrchestrator::new(Arc::clone(&wallets), Arc::clone(&outputs), discovery);
        Self {
            masters,
            factory,
            outputs,
            wallets,
            funding,
            assembler: TransactionAssembler::new(explorer),
            faucet: None,
        }
    }

    /// Serve `faucet_tape` through `faucet`.
    pub fn with_faucet(mut self, faucet: impl Faucet + 'static) -> Self {
        self.faucet = Some(Box::new(faucet));
        self
    }

    /// Replace the coin-selection strategy.
    pub fn with_selector(mut self, selector: impl CoinSelect + 'static) -> Self {
        self.funding = self.funding.with_selector(selector);
        self
    }

    pub fn masters(&self) -> &MasterNodeRegistry {
        &self.masters
    }

    pub fn factory(&self) -> &DescriptorFactory {
        &self.factory
    }

    pub fn outputs(&self) -> &OutputMaterializer {
        &self.outputs
    }

    pub fn wallets(&self) -> &WalletRegistry {
        &self.wallets
    }

    pub fn discovery(&self) -> &D {
        self.funding.discovery()
    }

    pub fn explorer(&self) -> &E {
        self.assembler.explorer()
    }

    /// Select inputs for `amount` to `to` and assemble the unsigned transaction.
    ///
    /// Both collaborators must serve the wallet's network.
    pub async fn create_unsigned_tx(
        &self,
        wallet_id: u64,
        to: &str,
        amount: u64,
        fee_rate: FeeRate,
    ) -> Result<UnsignedTransaction, WalletError> {
        let wallet = self.wallets.get(wallet_id)?;
        ensure_network(wallet.network, self.explorer().network())?;
        let selection = self.funding.build_funding(wallet_id, to, amount, fee_rate).await?;
        self.assembler.assemble(&selection).await
    }

    /// Ask the configured faucet for Tape coins.
    ///
    /// The address must be Tape-encoded; anything else never reaches the
    /// faucet.
    pub async fn faucet_tape(&self, address: &str) -> Result<OperationOutput, WalletError> {
        let faucet = self
            .faucet
            .as_deref()
            .ok_or(WalletError::FaucetUnavailable(NetworkType::Tape))?;
        ensure_network(NetworkType::Tape, Some(faucet.network()))?;
        let output = self
            .outputs
            .materialize(&format!("addr({})", address.trim()), NetworkType::Tape, None, None, &[])?;
        let address = output.address().to_string();
        let response = faucet.request(&address).await?;
        info!(%address, "faucet request accepted");
        Ok(OperationOutput::FaucetTape { address, response })
    }

    pub async fn execute(&self, op: Operation) -> Result<OperationOutput, WalletError> {
        debug!(op = op.name(), "executing operation");
        match op {
            Operation::GenerateMnemonic { strength } => Ok(OperationOutput::GenerateMnemonic {
                mnemonic: generate_mnemonic(strength)?,
            }),
            Operation::DeriveMasterNode { mnemonic, network } => {
                let network: NetworkType = network.parse()?;
                let fingerprint = self.masters.derive_master_node(&mnemonic, network)?;
                Ok(OperationOutput::DeriveMasterNode {
                    fingerprint: fingerprint.to_string(),
                })
            }
            Operation::GetDescriptor {
                fingerprint,
                address_type,
                network,
                account,
                chain,
                index,
            } => {
                let fingerprint = parse_fingerprint(&fingerprint)?;
                let address_type: AddressType = address_type.parse()?;
                let network: NetworkType = network.parse()?;
                let chain = Chain::try_from(chain)?;
                let descriptor = self
                    .factory
                    .build_descriptor(&fingerprint, address_type, network, account, chain, index)?;
                Ok(OperationOutput::GetDescriptor { descriptor })
            }
            Operation::GetOutput {
                descriptor,
                network,
                signers,
                index,
                preimages,
            } => {
                let network: NetworkType = network.parse()?;
                let output = self
                    .outputs
                    .materialize(&descriptor, network, signers.as_deref(), index, &preimages)?;
                Ok(OperationOutput::GetOutput {
                    address: output.address().to_string(),
                    kind: output.kind().to_string(),
                    segwit: output.is_segwit(),
                })
            }
            Operation::CreateWallet {
                fingerprint,
                mnemonic,
                network,
                descriptor_types,
            } => {
                let network: NetworkType = network.parse()?;
                let source = match (fingerprint, mnemonic) {
                    (Some(fp), None) => WalletSource::Fingerprint(fp),
                    (None, Some(m)) => WalletSource::Mnemonic(m),
                    (None, None) => WalletSource::Generate,
                    (Some(_), Some(_)) => {
                        return Err(WalletError::InvalidMnemonic(
                            "give either a fingerprint or a mnemonic, not both".into(),
                        ))
                    }
                };
                let types = descriptor_types
                    .map(|names| {
                        names
                            .iter()
                            .map(|n| n.parse::<AddressType>())
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                let info = self.wallets.create_wallet(source, network, types.as_deref())?;
                Ok(OperationOutput::CreateWallet(info))
            }
            Operation::CreateUnsignedTx {
                wallet_id,
                to,
                amount,
                fee_rate,
            } => {
                let fee_rate = FeeRate::from_sat_per_vb(fee_rate)?;
                let unsigned = self.create_unsigned_tx(wallet_id, &to, amount, fee_rate).await?;
                Ok(OperationOutput::CreateUnsignedTx {
                    psbt_base64: unsigned.to_base64(),
                    fee: unsigned.fee(),
                    vsize: unsigned.vsize(),
                })
            }
            Operation::FaucetTape { address } => self.faucet_tape(&address).await,
        }
    }
}
