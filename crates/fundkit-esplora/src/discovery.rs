//! Descriptor discovery over the Esplora address API.
//!
//! Ranged descriptors are walked child by child until `gap_limit`
//! consecutive children have no history. Results are kept per descriptor
//! string until the next `fetch` for it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::Address;
use fundkit_core::types::MAX_UNHARDENED_INDEX;
use fundkit_core::{CollaboratorError, Coordinate, Discovery, NetworkType, TxoInfo, UtxoSnapshot};
use miniscript::descriptor::{Descriptor, DescriptorPublicKey};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::client::EsploraApi;
use crate::config::DEFAULT_GAP_LIMIT;
use crate::error::EsploraError;

/// What discovery learned about one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DescriptorState {
    used: BTreeSet<u32>,
    utxos: Vec<(Coordinate, u64, Option<u32>)>,
}

/// A descriptor split into the addresses discovery must query.
enum Target {
    Address(Address),
    Ranged(Descriptor<DescriptorPublicKey>),
    Single(Descriptor<DescriptorPublicKey>),
}

/// [`Discovery`] backed by any [`EsploraApi`].
pub struct EsploraDiscovery<A> {
    api: A,
    network: NetworkType,
    gap_limit: u32,
    state: RwLock<HashMap<String, DescriptorState>>,
}

impl<A: EsploraApi> EsploraDiscovery<A> {
    pub fn new(api: A, network: NetworkType) -> Self {
        Self {
            api,
            network,
            gap_limit: DEFAULT_GAP_LIMIT,
            state: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit.max(1);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn parse(&self, descriptor: &str) -> Result<Target, EsploraError> {
        let invalid = |reason: String| EsploraError::Descriptor {
            descriptor: descriptor.to_string(),
            reason,
        };
        let trimmed = descriptor.trim();
        if let Some(inner) = trimmed.strip_prefix("addr(") {
            let inner = inner.split('#').next().unwrap_or(inner);
            let text = inner
                .strip_suffix(')')
                .ok_or_else(|| invalid("unterminated addr()".into()))?;
            let address = Address::from_str(text)
                .map_err(|e| invalid(e.to_string()))?
                .require_network(self.network.bitcoin_network())
                .map_err(|e| invalid(e.to_string()))?;
            return Ok(Target::Address(address));
        }
        let desc = Descriptor::<DescriptorPublicKey>::from_str(trimmed).map_err(|e| invalid(e.to_string()))?;
        if desc.is_multipath() {
            return Err(invalid("multipath descriptors are not supported".into()));
        }
        Ok(if desc.has_wildcard() {
            Target::Ranged(desc)
        } else {
            Target::Single(desc)
        })
    }

    fn derive(&self, desc: &Descriptor<DescriptorPublicKey>, index: u32) -> Result<Address, EsploraError> {
        let invalid = |reason: String| EsploraError::Descriptor {
            descriptor: desc.to_string(),
            reason,
        };
        desc.at_derivation_index(index)
            .map_err(|e| invalid(e.to_string()))?
            .address(self.network.bitcoin_network())
            .map_err(|e| invalid(e.to_string()))
    }

    /// Query one address, recording it under `index` when it has history.
    async fn scan(
        &self,
        address: &Address,
        index: Option<u32>,
        state: &mut DescriptorState,
    ) -> Result<bool, EsploraError> {
        let address = address.to_string();
        let stats = self.api.address_stats(&address).await?;
        if !stats.is_used() {
            return Ok(false);
        }
        if let Some(i) = index {
            state.used.insert(i);
        }
        for utxo in self.api.address_utxos(&address).await? {
            state
                .utxos
                .push((Coordinate::new(utxo.txid, utxo.vout), utxo.value, index));
        }
        Ok(true)
    }

    async fn walk(&self, descriptor: &str) -> Result<DescriptorState, EsploraError> {
        let mut state = DescriptorState::default();
        match self.parse(descriptor)? {
            Target::Address(address) => {
                self.scan(&address, None, &mut state).await?;
            }
            Target::Single(desc) => {
                let address = self.derive(&desc, 0)?;
                self.scan(&address, None, &mut state).await?;
            }
            Target::Ranged(desc) => {
                let mut gap = 0;
                let mut index = 0u32;
                while gap < self.gap_limit && index <= MAX_UNHARDENED_INDEX {
                    let address = self.derive(&desc, index)?;
                    if self.scan(&address, Some(index), &mut state).await? {
                        gap = 0;
                    } else {
                        gap += 1;
                    }
                    index += 1;
                }
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl<A: EsploraApi> Discovery for EsploraDiscovery<A> {
    async fn fetch(&self, descriptors: &[String]) -> Result<(), CollaboratorError> {
        for descriptor in descriptors {
            let state = self.walk(descriptor).await?;
            debug!(
                descriptor = %descriptor,
                used = state.used.len(),
                utxos = state.utxos.len(),
                "descriptor discovered"
            );
            self.state.write().insert(descriptor.clone(), state);
        }
        info!(descriptors = descriptors.len(), "discovery fetch complete");
        Ok(())
    }

    async fn utxos_and_balance(&self, descriptors: &[String]) -> Result<UtxoSnapshot, CollaboratorError> {
        let state = self.state.read();
        let mut snapshot = UtxoSnapshot::default();
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            let entry = state
                .get(descriptor)
                .ok_or_else(|| CollaboratorError::NotFetched(descriptor.clone()))?;
            for &(coordinate, value, index) in &entry.utxos {
                if !seen.insert(coordinate) {
                    continue;
                }
                snapshot.utxos.push(coordinate);
                snapshot.txo_map.insert(
                    coordinate,
                    TxoInfo {
                        value,
                        descriptor: descriptor.clone(),
                        index,
                    },
                );
            }
        }
        Ok(snapshot)
    }

    async fn next_index(&self, descriptor: &str) -> Result<u32, CollaboratorError> {
        let state = self.state.read();
        let entry = state
            .get(descriptor)
            .ok_or_else(|| CollaboratorError::NotFetched(descriptor.to_string()))?;
        Ok(entry.used.last().map_or(0, |last| last + 1))
    }

    fn network(&self) -> Option<NetworkType> {
        Some(self.network)
    }
}
