//! # fundkit-wallet — descriptor wallets and unsigned funding transactions.
//!
//! Derives BIP32 master keys from BIP39 mnemonics, builds BIP44/49/84
//! descriptors, materializes outputs (including miniscript spending paths
//! with signer keys and hash preimages), selects coins, and assembles
//! unsigned PSBTs ready for external signing.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`mnemonic`] — BIP39 generation and parsing
//! - [`keys`] — `MasterNodeRegistry`, the only holder of private keys
//! - [`descriptor`] — `DescriptorFactory` and chain-suffix helpers
//! - [`output`] — `OutputMaterializer`, `Output`, `OutputKind`
//! - [`wallet`] — `WalletRegistry`
//! - [`coin_selection`] — `CoinSelect` contract, `LargestFirst`, funding orchestration
//! - [`builder`] — `TransactionAssembler` producing PSBTs
//! - [`ops`] — typed operations and the `Toolkit` that runs them

pub mod builder;
pub mod coin_selection;
pub mod descriptor;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod ops;
pub mod output;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{TransactionAssembler, UnsignedTransaction};
pub use coin_selection::{
    Candidate, CoinSelect, CoinSelectionOrchestrator, CoinSelectionResult, LargestFirst, SelectionRequest,
    Target,
};
pub use descriptor::DescriptorFactory;
pub use error::WalletError;
pub use keys::MasterNodeRegistry;
pub use mnemonic::{generate_mnemonic, parse_mnemonic};
pub use ops::{Operation, OperationOutput, Toolkit};
pub use output::{Output, OutputKind, OutputMaterializer, Preimage, SpendPlan};
pub use wallet::{Wallet, WalletInfo, WalletRegistry, WalletSource};
