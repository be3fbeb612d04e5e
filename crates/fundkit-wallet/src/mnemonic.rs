//! BIP-39 mnemonic generation and parsing.

use bip39::{Language, Mnemonic};
use zeroize::Zeroize;

use crate::error::WalletError;

/// Entropy strengths (in bits) accepted by [`generate_mnemonic`].
pub const SUPPORTED_STRENGTHS: [usize; 5] = [128, 160, 192, 224, 256];

/// Default strength: 128 bits, 12 words.
pub const DEFAULT_STRENGTH: usize = 128;

/// Generate a random English mnemonic with `strength` bits of OS entropy.
pub fn generate_mnemonic(strength: usize) -> Result<String, WalletError> {
    if !SUPPORTED_STRENGTHS.contains(&strength) {
        return Err(WalletError::InvalidMnemonic(format!(
            "unsupported strength {strength}, expected one of {SUPPORTED_STRENGTHS:?}"
        )));
    }
    use rand::RngCore;
    let mut entropy = vec![0u8; strength / 8];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let m = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(m?.to_string())
}

/// Parse a BIP-39 phrase.
///
/// Normalizes whitespace and converts to lowercase before parsing.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}
