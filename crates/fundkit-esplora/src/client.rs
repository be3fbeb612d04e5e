//! HTTP client for the Esplora REST API.

use async_trait::async_trait;
use bitcoin::Txid;
use fundkit_core::{CollaboratorError, Explorer, NetworkType};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::EsploraConfig;
use crate::error::EsploraError;

/// Funding/spending counters reported for an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TxStats {
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub funded_txo_sum: u64,
    #[serde(default)]
    pub spent_txo_sum: u64,
}

/// Response of `GET /address/{address}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressStats {
    #[serde(default)]
    pub chain_stats: TxStats,
    #[serde(default)]
    pub mempool_stats: TxStats,
}

impl AddressStats {
    /// Confirmed plus mempool transactions touching the address.
    pub fn tx_count(&self) -> u64 {
        self.chain_stats.tx_count + self.mempool_stats.tx_count
    }

    pub fn is_used(&self) -> bool {
        self.tx_count() > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UtxoStatus {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u32>,
}

/// One entry of `GET /address/{address}/utxo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EsploraUtxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: UtxoStatus,
}

/// Address-level queries used by discovery.
#[async_trait]
pub trait EsploraApi: Send + Sync {
    async fn address_stats(&self, address: &str) -> Result<AddressStats, EsploraError>;

    async fn address_utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>, EsploraError>;
}

/// reqwest-backed Esplora client.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    http: Client,
    config: EsploraConfig,
}

impl EsploraClient {
    pub fn new(config: EsploraConfig) -> Result<Self, EsploraError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| EsploraError::Http {
                url: config.url.clone(),
                source,
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EsploraConfig {
        &self.config
    }

    async fn get(&self, path: &str) -> Result<(String, Response), EsploraError> {
        let url = self.config.endpoint(path);
        trace!(%url, "esplora request");
        let resp = self.http.get(&url).send().await.map_err(|source| EsploraError::Http {
            url: url.clone(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EsploraError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok((url, resp))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EsploraError> {
        let (url, resp) = self.get(path).await?;
        resp.json().await.map_err(|e| EsploraError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    /// Consensus bytes of `txid` from `GET /tx/{txid}/raw`.
    pub async fn raw_tx(&self, txid: &Txid) -> Result<Vec<u8>, EsploraError> {
        let (url, resp) = self.get(&format!("tx/{txid}/raw")).await?;
        let body = resp.bytes().await.map_err(|source| EsploraError::Http { url, source })?;
        debug!(%txid, bytes = body.len(), "fetched raw transaction");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl EsploraApi for EsploraClient {
    async fn address_stats(&self, address: &str) -> Result<AddressStats, EsploraError> {
        self.get_json(&format!("address/{address}")).await
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>, EsploraError> {
        self.get_json(&format!("address/{address}/utxo")).await
    }
}

#[async_trait]
impl Explorer for EsploraClient {
    async fn fetch_tx(&self, txid: &Txid) -> Result<Vec<u8>, CollaboratorError> {
        Ok(self.raw_tx(txid).await?)
    }

    fn network(&self) -> Option<NetworkType> {
        Some(self.config.network)
    }
}
