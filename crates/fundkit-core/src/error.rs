//! Error types shared across fundkit crates.
use thiserror::Error;

/// Parse-level failures for the shared vocabulary types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid network: {0}")] InvalidNetwork(String),
    #[error("unsupported address type: {0}")] UnsupportedAddressType(String),
    #[error("invalid chain branch: {0} (expected 0 or 1)")] InvalidChain(u32),
    #[error("invalid derivation index: {0}")] InvalidIndex(String),
    #[error("invalid coordinate: {0}")] InvalidCoordinate(String),
    #[error("invalid fee rate: {0} sat/vB")] InvalidFeeRate(u64),
}

/// Failure reported by a discovery or explorer collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("request failed: {0}")] Request(String),
    #[error("timed out: {0}")] Timeout(String),
    #[error("not found: {0}")] NotFound(String),
    #[error("malformed response: {0}")] Malformed(String),
    #[error("descriptor not fetched: {0}")] NotFetched(String),
}
