//! Errors raised while talking to an Esplora server.
use fundkit_core::{CollaboratorError, NetworkType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EsploraError {
    #[error("http error on {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("invalid descriptor {descriptor}: {reason}")]
    Descriptor { descriptor: String, reason: String },
    #[error("{url} refused the request ({status}): {message}")]
    Rejected { url: String, status: u16, message: String },
    #[error("no such service on {0}")]
    UnsupportedNetwork(NetworkType),
}

impl From<EsploraError> for CollaboratorError {
    fn from(err: EsploraError) -> Self {
        match &err {
            EsploraError::Http { url, source } if source.is_timeout() => Self::Timeout(url.clone()),
            EsploraError::Status { status: 404, url } => Self::NotFound(url.clone()),
            EsploraError::Decode { .. } | EsploraError::Descriptor { .. } => Self::Malformed(err.to_string()),
            _ => Self::Request(err.to_string()),
        }
    }
}
