//! # fundkit-esplora — Esplora-backed collaborators.
//!
//! - [`config`] — `EsploraConfig` and per-network server presets
//! - [`client`] — `EsploraClient`, the `EsploraApi` address queries and raw transaction lookup
//! - [`discovery`] — `EsploraDiscovery`, gap-limited descriptor scanning
//! - [`tape`] — `TapeFaucet` and Tape explorer links
//! - [`error`] — `EsploraError`

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod tape;

pub use client::{AddressStats, EsploraApi, EsploraClient, EsploraUtxo};
pub use config::EsploraConfig;
pub use discovery::EsploraDiscovery;
pub use error::EsploraError;
pub use tape::{tape_address_url, tape_tx_url, TapeFaucet};
