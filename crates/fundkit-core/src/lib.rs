//! # fundkit-core
//! Foundation types and collaborator traits shared by the fundkit crates.

pub mod error;
pub mod network;
pub mod traits;
pub mod types;

pub use error::{CollaboratorError, CoreError};
pub use network::{AddressType, NetworkType};
pub use traits::{Discovery, Explorer, Faucet};
pub use types::{Chain, Coordinate, DerivationIndex, FeeRate, TxoInfo, UtxoSnapshot};
