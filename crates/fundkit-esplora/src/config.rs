//! Connection settings for the Esplora collaborators.

use std::time::Duration;

use fundkit_core::NetworkType;

/// Consecutive unused addresses after which a ranged descriptor walk stops.
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Configuration for [`EsploraClient`](crate::EsploraClient) and
/// [`EsploraDiscovery`](crate::EsploraDiscovery).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsploraConfig {
    /// Network the server indexes.
    pub network: NetworkType,
    /// Base URL of the REST API, without a trailing slash.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub gap_limit: u32,
}

impl Default for EsploraConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::Regtest)
    }
}

impl EsploraConfig {
    /// Preset pointing at the public server for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            url: default_url(network).to_string(),
            timeout: Duration::from_secs(30),
            gap_limit: DEFAULT_GAP_LIMIT,
        }
    }

    /// Replace the base URL, dropping any trailing slash.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

/// Default Esplora base URL for each network.
pub fn default_url(network: NetworkType) -> &'static str {
    match network {
        NetworkType::Bitcoin => "https://blockstream.info/api",
        NetworkType::Testnet => "https://blockstream.info/testnet/api",
        NetworkType::Regtest => "http://127.0.0.1:3002",
        NetworkType::Tape => "https://tape.rewindbitcoin.com/api",
    }
}
