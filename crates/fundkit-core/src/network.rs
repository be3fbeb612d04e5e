//! Supported networks and descriptor address types.

use std::fmt;
use std::str::FromStr;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Network selector accepted by every fundkit operation.
///
/// `Tape` is a public regtest-style network; it shares regtest's address
/// and extended-key encodings.
///
/// ```
/// use fundkit_core::NetworkType;
/// let net: NetworkType = "regtest".parse().unwrap();
/// assert_eq!(net, NetworkType::Regtest);
/// assert_eq!(net.to_string(), "REGTEST");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkType {
    /// Bitcoin mainnet.
    Bitcoin,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
    /// Tape: hosted regtest with a faucet.
    Tape,
}

impl NetworkType {
    /// Every supported network, in declaration order.
    pub const ALL: [NetworkType; 4] = [Self::Bitcoin, Self::Testnet, Self::Regtest, Self::Tape];

    /// The `bitcoin` crate network used for address and key encoding.
    pub fn bitcoin_network(&self) -> Network {
        match self {
            Self::Bitcoin => Network::Bitcoin,
            Self::Testnet => Network::Testnet,
            Self::Regtest | Self::Tape => Network::Regtest,
        }
    }

    /// BIP44 coin type: 0 on mainnet, 1 everywhere else.
    pub fn coin_type(&self) -> u32 {
        match self {
            Self::Bitcoin => 0,
            Self::Testnet | Self::Regtest | Self::Tape => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bitcoin => "BITCOIN",
            Self::Testnet => "TESTNET",
            Self::Regtest => "REGTEST",
            Self::Tape => "TAPE",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BITCOIN" => Ok(Self::Bitcoin),
            "TESTNET" => Ok(Self::Testnet),
            "REGTEST" => Ok(Self::Regtest),
            "TAPE" => Ok(Self::Tape),
            _ => Err(CoreError::InvalidNetwork(s.to_string())),
        }
    }
}

/// Single-key address types a wallet can hold descriptors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    /// Legacy pay-to-pubkey-hash (BIP44).
    #[serde(rename = "pkh")]
    Pkh,
    /// Native segwit v0 (BIP84).
    #[serde(rename = "wpkh")]
    Wpkh,
    /// Segwit v0 wrapped in P2SH (BIP49).
    #[serde(rename = "sh-wpkh")]
    ShWpkh,
}

impl AddressType {
    /// Default wallet composition: native segwit, legacy, wrapped segwit.
    pub const DEFAULT_SET: [AddressType; 3] = [Self::Wpkh, Self::Pkh, Self::ShWpkh];

    /// BIP43 purpose for the account path.
    pub fn purpose(&self) -> u32 {
        match self {
            Self::Pkh => 44,
            Self::ShWpkh => 49,
            Self::Wpkh => 84,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pkh => "pkh",
            Self::Wpkh => "wpkh",
            Self::ShWpkh => "sh-wpkh",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pkh" => Ok(Self::Pkh),
            "wpkh" => Ok(Self::Wpkh),
            "sh-wpkh" => Ok(Self::ShWpkh),
            _ => Err(CoreError::UnsupportedAddressType(s.to_string())),
        }
    }
}
