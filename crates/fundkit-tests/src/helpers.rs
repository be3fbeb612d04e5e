//! Shared helpers for scenario tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::{absolute, transaction, Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Txid};
use fundkit_core::{
    AddressType, Chain, CollaboratorError, Coordinate, DerivationIndex, Discovery, Explorer, NetworkType, TxoInfo,
    UtxoSnapshot,
};
use fundkit_wallet::Toolkit;
use parking_lot::RwLock;

/// The BIP39 test phrase with fingerprint `73c5da0a`.
pub const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// A second phrase, used for destinations outside the test wallet.
pub const ZOO: &str = "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong";

#[derive(Debug, Default)]
struct ChainState {
    txs: HashMap<Txid, Transaction>,
    utxos: HashMap<String, Vec<(Coordinate, TxoInfo)>>,
    used: HashMap<String, BTreeSet<u32>>,
    fetched: BTreeSet<String>,
    fetch_calls: usize,
    tx_lookups: usize,
}

/// In-memory chain answering both [`Discovery`] and [`Explorer`].
///
/// Clones share state, so one clone can go to the toolkit as discovery and
/// another as explorer while the test keeps a third for funding.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    state: Arc<RwLock<ChainState>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pay `value` to `script_pubkey`, recording the output under
    /// `descriptor` (at `index` when ranged). Returns the new coordinate.
    pub fn fund(&self, descriptor: &str, index: Option<u32>, script_pubkey: &ScriptBuf, value: u64) -> Coordinate {
        let mut state = self.state.write();
        let tx = funding_tx(state.txs.len() as u32, script_pubkey, value);
        let coordinate = Coordinate::new(tx.compute_txid(), 0);
        state.txs.insert(coordinate.txid, tx);
        state.utxos.entry(descriptor.to_string()).or_default().push((
            coordinate,
            TxoInfo {
                value,
                descriptor: descriptor.to_string(),
                index,
            },
        ));
        if let Some(i) = index {
            state.used.entry(descriptor.to_string()).or_default().insert(i);
        }
        coordinate
    }

    /// Mark a ranged child as used without leaving a spendable output.
    pub fn mark_used(&self, descriptor: &str, index: u32) {
        self.state
            .write()
            .used
            .entry(descriptor.to_string())
            .or_default()
            .insert(index);
    }

    pub fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.state.read().txs.get(txid).cloned()
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.read().fetch_calls
    }

    pub fn tx_lookups(&self) -> usize {
        self.state.read().tx_lookups
    }
}

#[async_trait]
impl Discovery for MemoryChain {
    async fn fetch(&self, descriptors: &[String]) -> Result<(), CollaboratorError> {
        let mut state = self.state.write();
        state.fetch_calls += 1;
        state.fetched.extend(descriptors.iter().cloned());
        Ok(())
    }

    async fn utxos_and_balance(&self, descriptors: &[String]) -> Result<UtxoSnapshot, CollaboratorError> {
        let state = self.state.read();
        let mut snapshot = UtxoSnapshot::default();
        for descriptor in descriptors {
            if !state.fetched.contains(descriptor) {
                return Err(CollaboratorError::NotFetched(descriptor.clone()));
            }
            for (coordinate, info) in state.utxos.get(descriptor).into_iter().flatten() {
                snapshot.utxos.push(*coordinate);
                snapshot.txo_map.insert(*coordinate, info.clone());
            }
        }
        Ok(snapshot)
    }

    async fn next_index(&self, descriptor: &str) -> Result<u32, CollaboratorError> {
        let state = self.state.read();
        if !state.fetched.contains(descriptor) {
            return Err(CollaboratorError::NotFetched(descriptor.to_string()));
        }
        Ok(state
            .used
            .get(descriptor)
            .and_then(|used| used.last())
            .map_or(0, |last| last + 1))
    }
}

#[async_trait]
impl Explorer for MemoryChain {
    async fn fetch_tx(&self, txid: &Txid) -> Result<Vec<u8>, CollaboratorError> {
        let mut state = self.state.write();
        state.tx_lookups += 1;
        state
            .txs
            .get(txid)
            .map(serialize)
            .ok_or_else(|| CollaboratorError::NotFound(txid.to_string()))
    }
}

/// A one-output transaction paying `value` to `script_pubkey`.
///
/// `nonce` feeds the spent outpoint so that every call yields a distinct txid.
pub fn funding_tx(nonce: u32, script_pubkey: &ScriptBuf, value: u64) -> Transaction {
    let mut seed = [0u8; 32];
    seed[..4].copy_from_slice(&nonce.to_le_bytes());
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array(seed), 0),
            ..TxIn::default()
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script_pubkey.clone(),
        }],
    }
}

/// A toolkit wired to `chain` for both collaborators.
pub fn toolkit(chain: &MemoryChain) -> Toolkit<MemoryChain, MemoryChain> {
    Toolkit::new(chain.clone(), chain.clone())
}

/// Fund child `index` of the ranged `descriptor` with `value` sats.
pub fn fund_child(
    toolkit: &Toolkit<MemoryChain, MemoryChain>,
    chain: &MemoryChain,
    descriptor: &str,
    network: NetworkType,
    index: u32,
    value: u64,
) -> Coordinate {
    let output = toolkit
        .outputs()
        .materialize(descriptor, network, None, Some(index), &[])
        .unwrap();
    chain.fund(descriptor, Some(index), output.script_pubkey(), value)
}

/// Receive address `index` of the [`ZOO`] wallet for `address_type`.
pub fn foreign_address<D: Discovery, E: Explorer>(
    toolkit: &Toolkit<D, E>,
    network: NetworkType,
    address_type: AddressType,
    index: u32,
) -> String {
    let fingerprint = toolkit.masters().derive_master_node(ZOO, network).unwrap();
    let descriptor = toolkit
        .factory()
        .build_descriptor(&fingerprint, address_type, network, 0, Chain::External, DerivationIndex::Index(index))
        .unwrap();
    toolkit
        .outputs()
        .materialize(&descriptor, network, None, None, &[])
        .unwrap()
        .address()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_txs_have_distinct_ids() {
        let script = ScriptBuf::new();
        assert_ne!(
            funding_tx(0, &script, 1_000).compute_txid(),
            funding_tx(1, &script, 1_000).compute_txid()
        );
    }

    #[tokio::test]
    async fn unfetched_descriptor_is_rejected() {
        let chain = MemoryChain::new();
        let err = chain.next_index("wpkh(x)").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFetched(_)));
    }
}
