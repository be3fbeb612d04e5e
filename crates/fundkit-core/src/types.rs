//! Shared value types: chain branches, derivation indices, coordinates, fee rates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest non-hardened BIP32 child number.
pub const MAX_UNHARDENED_INDEX: u32 = (1 << 31) - 1;

/// BIP44 chain branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Chain {
    /// Receive addresses (`/0/...`).
    External,
    /// Change addresses (`/1/...`).
    Change,
}

impl Chain {
    pub fn index(&self) -> u32 {
        match self {
            Self::External => 0,
            Self::Change => 1,
        }
    }
}

impl TryFrom<u32> for Chain {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::External),
            1 => Ok(Self::Change),
            other => Err(CoreError::InvalidChain(other)),
        }
    }
}

impl From<Chain> for u32 {
    fn from(chain: Chain) -> Self {
        chain.index()
    }
}

/// Final path element of a descriptor: a concrete child or the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IndexRepr", into = "IndexRepr")]
pub enum DerivationIndex {
    /// Ranged descriptor covering every child.
    Wildcard,
    /// Single non-hardened child.
    Index(u32),
}

impl DerivationIndex {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl fmt::Display for DerivationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl FromStr for DerivationIndex {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::Wildcard);
        }
        let index: u32 = s.parse().map_err(|_| CoreError::InvalidIndex(s.to_string()))?;
        if index > MAX_UNHARDENED_INDEX {
            return Err(CoreError::InvalidIndex(s.to_string()));
        }
        Ok(Self::Index(index))
    }
}

/// Wire form accepted for a derivation index: `3` or `"*"` (or `"3"`).
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<IndexRepr> for DerivationIndex {
    type Error = CoreError;

    fn try_from(repr: IndexRepr) -> Result<Self, Self::Error> {
        match repr {
            IndexRepr::Number(n) => DerivationIndex::from_str(&n.to_string()),
            IndexRepr::Text(s) => DerivationIndex::from_str(&s),
        }
    }
}

impl From<DerivationIndex> for IndexRepr {
    fn from(index: DerivationIndex) -> Self {
        match index {
            DerivationIndex::Wildcard => IndexRepr::Text("*".into()),
            DerivationIndex::Index(n) => IndexRepr::Number(n),
        }
    }
}

/// On-chain coordinate of an output, written `"<txid>:<vout>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    pub txid: Txid,
    pub vout: u32,
}

impl Coordinate {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for Coordinate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidCoordinate(s.to_string()))?;
        let txid = Txid::from_str(txid).map_err(|_| CoreError::InvalidCoordinate(s.to_string()))?;
        let vout = vout
            .parse()
            .map_err(|_| CoreError::InvalidCoordinate(s.to_string()))?;
        Ok(Self { txid, vout })
    }
}

impl TryFrom<String> for Coordinate {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Coordinate> for String {
    fn from(c: Coordinate) -> Self {
        c.to_string()
    }
}

impl From<OutPoint> for Coordinate {
    fn from(op: OutPoint) -> Self {
        Self::new(op.txid, op.vout)
    }
}

/// Fee rate in whole satoshis per virtual byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct FeeRate(u64);

impl FeeRate {
    /// Rate used when a caller does not supply one.
    pub const DEFAULT: FeeRate = FeeRate(5);

    pub fn from_sat_per_vb(rate: u64) -> Result<Self, CoreError> {
        if rate == 0 {
            return Err(CoreError::InvalidFeeRate(rate));
        }
        Ok(Self(rate))
    }

    pub fn sat_per_vb(&self) -> u64 {
        self.0
    }

    /// Fee owed for `vbytes` virtual bytes, saturating on overflow.
    pub fn fee_for_vsize(&self, vbytes: u64) -> u64 {
        self.0.saturating_mul(vbytes)
    }

    /// Fee owed for a weight in weight units, rounded up to whole vbytes.
    pub fn fee_for_weight(&self, weight_units: u64) -> u64 {
        self.fee_for_vsize(weight_units.div_ceil(4))
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u64> for FeeRate {
    type Error = CoreError;

    fn try_from(rate: u64) -> Result<Self, Self::Error> {
        Self::from_sat_per_vb(rate)
    }
}

impl From<FeeRate> for u64 {
    fn from(rate: FeeRate) -> Self {
        rate.0
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/vB", self.0)
    }
}

/// What discovery knows about one unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxoInfo {
    /// Value in satoshis.
    pub value: u64,
    /// Descriptor that owns the output (the ranged template for wallet outputs).
    pub descriptor: String,
    /// Child index within `descriptor` when it is ranged.
    pub index: Option<u32>,
}

/// Discovery answer for a set of descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSnapshot {
    /// Unspent coordinates, in discovery order.
    pub utxos: Vec<Coordinate>,
    /// Details for every coordinate in `utxos`.
    pub txo_map: HashMap<Coordinate, TxoInfo>,
}

impl UtxoSnapshot {
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Sum of the values of every listed UTXO.
    pub fn balance(&self) -> u64 {
        self.utxos
            .iter()
            .filter_map(|c| self.txo_map.get(c))
            .fold(0u64, |acc, info| acc.saturating_add(info.value))
    }
}
