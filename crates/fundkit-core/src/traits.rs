//! Collaborator contracts consumed by the funding pipeline.
//!
//! - [`Discovery`] — chain-state discovery for descriptors (fundkit-esplora implements)
//! - [`Explorer`] — raw previous-transaction lookup (fundkit-esplora implements)
//! - [`Faucet`] — test-network coin dispenser (fundkit-esplora implements for Tape)
//!
//! Both are async because every call is network I/O. Implementations apply
//! their own timeouts; the core never retries. A backend bound to one
//! network reports it through `network()` so callers can refuse wallets
//! from another.

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CollaboratorError;
use crate::network::NetworkType;
use crate::types::UtxoSnapshot;

/// UTXO discovery for a set of descriptors.
///
/// `fetch` must be called for a descriptor before the other methods can
/// answer for it.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Populate chain state for every descriptor, walking ranged ones up to
    /// the implementation's gap limit.
    async fn fetch(&self, descriptors: &[String]) -> Result<(), CollaboratorError>;

    /// Unspent outputs owned by `descriptors`.
    async fn utxos_and_balance(&self, descriptors: &[String]) -> Result<UtxoSnapshot, CollaboratorError>;

    /// First never-used child index of a ranged descriptor.
    async fn next_index(&self, descriptor: &str) -> Result<u32, CollaboratorError>;

    /// Network this backend is bound to, `None` when it serves any.
    fn network(&self) -> Option<NetworkType> {
        None
    }
}

/// Raw transaction lookup.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Consensus-serialized bytes of the transaction `txid`.
    async fn fetch_tx(&self, txid: &Txid) -> Result<Vec<u8>, CollaboratorError>;

    /// Network this backend is bound to, `None` when it serves any.
    fn network(&self) -> Option<NetworkType> {
        None
    }
}

/// Test-network faucet.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Faucet: Send + Sync {
    /// Ask for coins to be sent to `address`; returns the server's reply.
    async fn request(&self, address: &str) -> Result<String, CollaboratorError>;

    /// Network whose coins the faucet hands out.
    fn network(&self) -> NetworkType;
}
