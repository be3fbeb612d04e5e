//! Wallet error types.

use fundkit_core::error::{CollaboratorError, CoreError};
use fundkit_core::NetworkType;
use thiserror::Error;

/// Errors that can occur in wallet operations.
///
/// Every variant is terminal for the request that raised it and carries the
/// handle (fingerprint, wallet id, descriptor, coordinate) it concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Network name outside the supported set.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// Invalid BIP-39 mnemonic phrase or strength.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// No master node registered under this fingerprint.
    #[error("no master node found for fingerprint: {0}")]
    UnknownFingerprint(String),

    /// Address type outside {pkh, wpkh, sh-wpkh}.
    #[error("unsupported descriptor type: {0}")]
    UnsupportedAddressType(String),

    /// Descriptor (or `addr()` expression) that cannot be parsed or derived.
    #[error("invalid descriptor {descriptor}: {reason}")]
    InvalidDescriptor {
        /// The offending expression.
        descriptor: String,
        /// Parser or derivation message.
        reason: String,
    },

    /// Ranged descriptor materialized without an index.
    #[error("descriptor is ranged, an index is required: {0}")]
    MissingIndex(String),

    /// Non-ranged descriptor materialized with an index.
    #[error("descriptor is not ranged, index {index} not allowed: {descriptor}")]
    UnexpectedIndex {
        /// The non-ranged descriptor.
        descriptor: String,
        /// The index that was supplied.
        index: u32,
    },

    /// Preimage that does not match its digest.
    #[error("invalid preimage for {digest}: {reason}")]
    InvalidPreimage {
        /// Digest expression, e.g. `sha256(…)`.
        digest: String,
        /// What failed.
        reason: String,
    },

    /// No spending path can be satisfied by the given signers and preimages.
    #[error("no satisfiable spending path for {0}")]
    Unsatisfiable(String),

    /// No wallet registered under this id.
    #[error("wallet {0} does not exist")]
    UnknownWallet(u64),

    /// Wallet (or wallet request) without descriptors.
    #[error("wallet {0} has no descriptors")]
    EmptyWallet(u64),

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Fee rate of zero.
    #[error("invalid fee rate: {0} sat/vB")]
    InvalidFeeRate(u64),

    /// Discovery returned no UTXOs for the wallet.
    #[error("wallet {0} has no UTXOs")]
    NoFunds(u64),

    /// No selection covers the amount plus fees.
    #[error("insufficient funds in wallet {wallet_id}: have {available}, need {requested} plus fees")]
    InsufficientFunds {
        /// Wallet being funded.
        wallet_id: u64,
        /// Sum of spendable UTXO values in satoshis.
        available: u64,
        /// Requested amount in satoshis.
        requested: u64,
    },

    /// Unsigned transaction could not be built.
    #[error("assembly failed at {coordinate}: {reason}")]
    AssemblyFailed {
        /// Input (or `output #n`) being encoded.
        coordinate: String,
        /// What failed.
        reason: String,
    },

    /// Wallet and collaborator serve different networks.
    #[error("wallet is on {wallet} but the collaborator serves {collaborator}")]
    NetworkMismatch {
        /// Network the wallet was created for.
        wallet: NetworkType,
        /// Network the discovery or explorer backend is bound to.
        collaborator: NetworkType,
    },

    /// No faucet is configured for this network.
    #[error("no faucet available for {0}")]
    FaucetUnavailable(NetworkType),

    /// Discovery or explorer call failed.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(#[from] CollaboratorError),
}

impl From<CoreError> for WalletError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidNetwork(n) => WalletError::InvalidNetwork(n),
            CoreError::UnsupportedAddressType(t) => WalletError::UnsupportedAddressType(t),
            CoreError::InvalidFeeRate(r) => WalletError::InvalidFeeRate(r),
            CoreError::InvalidCoordinate(c) => {
                WalletError::CollaboratorUnavailable(CollaboratorError::Malformed(c))
            }
            CoreError::InvalidChain(c) => WalletError::InvalidDescriptor {
                descriptor: format!("chain {c}"),
                reason: "chain must be 0 (external) or 1 (change)".into(),
            },
            CoreError::InvalidIndex(i) => WalletError::InvalidDescriptor {
                descriptor: format!("index {i}"),
                reason: "index must be non-hardened".into(),
            },
        }
    }
}
