//! Tape network extras: the public faucet and explorer links.

use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use fundkit_core::{CollaboratorError, Faucet, NetworkType};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EsploraError;

/// Faucet endpoint; takes `{"address": ...}`.
pub const TAPE_FAUCET_URL: &str = "https://tape.rewindbitcoin.com/faucet";

/// Block explorer root.
pub const TAPE_EXPLORER_URL: &str = "https://tape.rewindbitcoin.com/explorer";

/// Explorer page for a transaction.
pub fn tape_tx_url(txid: &Txid) -> String {
    format!("{TAPE_EXPLORER_URL}/tx/{txid}")
}

/// Explorer page for an address.
pub fn tape_address_url(address: &str) -> String {
    format!("{TAPE_EXPLORER_URL}/address/{}", address.trim())
}

#[derive(Serialize)]
struct FaucetRequest<'a> {
    address: &'a str,
}

#[derive(Deserialize)]
struct FaucetRejection {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the Tape faucet.
#[derive(Debug, Clone)]
pub struct TapeFaucet {
    http: Client,
    url: String,
}

impl TapeFaucet {
    /// Only [`NetworkType::Tape`] has a faucet.
    pub fn new(network: NetworkType, timeout: Duration) -> Result<Self, EsploraError> {
        if network != NetworkType::Tape {
            return Err(EsploraError::UnsupportedNetwork(network));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| EsploraError::Http {
                url: TAPE_FAUCET_URL.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            url: TAPE_FAUCET_URL.to_string(),
        })
    }

    /// Point at another faucet endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `address` to the faucet and return the reply body.
    ///
    /// A refusal carries the server's `message` when it sent one, else the
    /// status reason.
    pub async fn send_to(&self, address: &str) -> Result<String, EsploraError> {
        let http_err = |source: reqwest::Error| EsploraError::Http {
            url: self.url.clone(),
            source,
        };
        let resp = self
            .http
            .post(&self.url)
            .json(&FaucetRequest { address })
            .send()
            .await
            .map_err(http_err)?;
        let status = resp.status();
        let body = resp.text().await.map_err(http_err)?;
        if !status.is_success() {
            let message = serde_json::from_str::<FaucetRejection>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            warn!(%address, status = status.as_u16(), %message, "faucet refused");
            return Err(EsploraError::Rejected {
                url: self.url.clone(),
                status: status.as_u16(),
                message,
            });
        }
        info!(%address, explorer = %tape_address_url(address), "faucet paid");
        Ok(body)
    }
}

#[async_trait]
impl Faucet for TapeFaucet {
    async fn request(&self, address: &str) -> Result<String, CollaboratorError> {
        Ok(self.send_to(address).await?)
    }

    fn network(&self) -> NetworkType {
        NetworkType::Tape
    }
}
