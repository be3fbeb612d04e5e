//! Funding orchestration and the coin-selection contract.
//!
//! [`CoinSelectionOrchestrator`] turns a wallet id, destination and amount
//! into a [`SelectionRequest`]: it asks discovery for the wallet's UTXOs,
//! materializes every candidate and the destination, derives a fresh change
//! output, and hands the lot to a [`CoinSelect`] strategy. The default
//! strategy is [`LargestFirst`].

use std::sync::Arc;

use bitcoin::ScriptBuf;
use fundkit_core::{Chain, CollaboratorError, Coordinate, Discovery, FeeRate, NetworkType};
use tracing::{debug, info, warn};

use crate::descriptor::{chain_of, with_chain};
use crate::error::WalletError;
use crate::output::{Output, OutputMaterializer};
use crate::wallet::WalletRegistry;

/// Version, locktime, and one-byte input and output counts, in weight units.
pub const TX_OVERHEAD_WEIGHT: u64 = (4 + 4 + 1 + 1) * 4;

/// Segwit marker and flag bytes.
pub const SEGWIT_MARKER_WEIGHT: u64 = 2;

/// Outpoint, sequence and scriptSig length, in weight units.
pub const TXIN_BASE_WEIGHT: u64 = (32 + 4 + 4 + 1) * 4;

/// A spendable UTXO with its materialized output.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub coordinate: Coordinate,
    pub value: u64,
    pub output: Arc<Output>,
}

/// An output to create.
#[derive(Debug, Clone)]
pub struct Target {
    pub output: Arc<Output>,
    pub value: u64,
}

/// Everything a selection strategy needs.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub candidates: Vec<Candidate>,
    pub targets: Vec<Target>,
    /// Where any remainder goes.
    pub change: Arc<Output>,
    pub fee_rate: FeeRate,
}

impl SelectionRequest {
    pub fn target_value(&self) -> u64 {
        self.targets.iter().map(|t| t.value).sum()
    }
}

/// Inputs and outputs chosen for one funding transaction.
///
/// Satisfies `input_value() == output_value() + fee` and
/// `fee >= vsize * fee_rate`.
#[derive(Debug, Clone)]
pub struct CoinSelectionResult {
    pub inputs: Vec<Candidate>,
    pub targets: Vec<Target>,
    pub change: Option<Target>,
    pub fee: u64,
    pub vsize: u64,
}

impl CoinSelectionResult {
    /// Destination targets followed by change, in transaction order.
    pub fn outputs(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().chain(self.change.iter())
    }

    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|c| c.value).sum()
    }

    pub fn output_value(&self) -> u64 {
        self.outputs().map(|t| t.value).sum()
    }
}

/// A coin-selection strategy.
///
/// Returns `None` when no subset of the candidates covers the targets plus
/// fees.
pub trait CoinSelect: Send + Sync {
    fn select(&self, request: &SelectionRequest) -> Option<CoinSelectionResult>;
}

/// Serialized weight of one output paying to `script`.
pub fn output_weight(script: &ScriptBuf) -> u64 {
    let len = script.len() as u64;
    (8 + varint_len(len) + len) * 4
}

fn varint_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Estimated weight of a transaction spending `inputs` to `outputs`.
///
/// Inputs without a spend plan contribute only their base weight. The
/// segwit marker is counted as soon as one input has a witness, P2SH-wrapped
/// ones included.
pub fn estimate_weight<'a>(
    inputs: impl IntoIterator<Item = &'a Output>,
    outputs: impl IntoIterator<Item = &'a ScriptBuf>,
) -> u64 {
    let mut weight = TX_OVERHEAD_WEIGHT;
    let mut witness = 0u64;
    let mut legacy = 0u64;
    for input in inputs {
        weight += TXIN_BASE_WEIGHT + input.satisfaction_weight().unwrap_or(0);
        if input.has_witness() {
            witness += 1;
        } else {
            legacy += 1;
        }
    }
    if witness > 0 {
        // legacy inputs of a witness transaction carry an empty stack
        weight += SEGWIT_MARKER_WEIGHT + legacy;
    }
    weight + outputs.into_iter().map(output_weight).sum::<u64>()
}

/// Refuse a wallet on `wallet` when the collaborator is bound elsewhere.
pub(crate) fn ensure_network(wallet: NetworkType, collaborator: Option<NetworkType>) -> Result<(), WalletError> {
    match collaborator {
        Some(collaborator) if collaborator != wallet => {
            warn!(%wallet, %collaborator, "collaborator network mismatch");
            Err(WalletError::NetworkMismatch { wallet, collaborator })
        }
        _ => Ok(()),
    }
}

/// Greedy strategy: spend the largest UTXOs first until the targets and
/// fee are covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl CoinSelect for LargestFirst {
    fn select(&self, request: &SelectionRequest) -> Option<CoinSelectionResult> {
        let rate = request.fee_rate;
        let needed = request.target_value();
        let target_scripts: Vec<&ScriptBuf> =
            request.targets.iter().map(|t| t.output.script_pubkey()).collect();

        let mut pool: Vec<&Candidate> = request
            .candidates
            .iter()
            .filter(|c| {
                let known = c.output.satisfaction_weight().is_some();
                if !known {
                    warn!(coordinate = %c.coordinate, "skipping candidate without a spend plan");
                }
                known
            })
            .collect();
        pool.sort_by(|a, b| b.value.cmp(&a.value).then(a.coordinate.cmp(&b.coordinate)));

        let change_script = request.change.script_pubkey();
        let change_weight = output_weight(change_script);
        let change_spend_weight =
            TXIN_BASE_WEIGHT + request.change.satisfaction_weight().unwrap_or(0);
        let dust = change_script.minimal_non_dust().to_sat();
        let threshold = dust.max(rate.fee_for_weight(change_spend_weight));

        let mut selected: Vec<&Candidate> = Vec::new();
        let mut total: u64 = 0;
        for candidate in pool {
            selected.push(candidate);
            total = total.saturating_add(candidate.value);

            let weight = estimate_weight(
                selected.iter().map(|c| c.output.as_ref()),
                target_scripts.iter().copied(),
            );
            let fee = rate.fee_for_weight(weight);
            let Some(excess) = total.checked_sub(needed.saturating_add(fee)) else {
                continue;
            };

            let with_change = weight + change_weight;
            let fee_with_change = rate.fee_for_weight(with_change);
            let change_value = total
                .checked_sub(needed.saturating_add(fee_with_change))
                .filter(|v| *v > threshold);

            let (change, fee, weight) = match change_value {
                Some(value) => (
                    Some(Target {
                        output: Arc::clone(&request.change),
                        value,
                    }),
                    fee_with_change,
                    with_change,
                ),
                None => (None, fee + excess, weight),
            };
            return Some(CoinSelectionResult {
                inputs: selected.into_iter().cloned().collect(),
                targets: request.targets.clone(),
                change,
                fee,
                vsize: weight.div_ceil(4),
            });
        }
        None
    }
}

/// Builds funding selections for registered wallets.
pub struct CoinSelectionOrchestrator<D> {
    wallets: Arc<WalletRegistry>,
    outputs: Arc<OutputMaterializer>,
    discovery: D,
    selector: Box<dyn CoinSelect>,
}

impl<D: Discovery> CoinSelectionOrchestrator<D> {
    pub fn new(wallets: Arc<WalletRegistry>, outputs: Arc<OutputMaterializer>, discovery: D) -> Self {
        Self {
            wallets,
            outputs,
            discovery,
            selector: Box::new(LargestFirst),
        }
    }

    /// Replace the selection strategy.
    pub fn with_selector(mut self, selector: impl CoinSelect + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Select inputs from wallet `wallet_id` paying `amount` sats to
    /// `destination` at `fee_rate`.
    pub async fn build_funding(
        &self,
        wallet_id: u64,
        destination: &str,
        amount: u64,
        fee_rate: FeeRate,
    ) -> Result<CoinSelectionResult, WalletError> {
        let wallet = self.wallets.get(wallet_id)?;
        if wallet.descriptors.is_empty() {
            return Err(WalletError::EmptyWallet(wallet_id));
        }
        if amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }
        let network = wallet.network;
        ensure_network(network, self.discovery.network())?;

        self.discovery.fetch(&wallet.descriptors).await?;
        let snapshot = self.discovery.utxos_and_balance(&wallet.descriptors).await?;
        if snapshot.is_empty() {
            return Err(WalletError::NoFunds(wallet_id));
        }
        debug!(wallet_id, utxos = snapshot.utxos.len(), balance = snapshot.balance(), "discovered wallet funds");

        let mut candidates = Vec::with_capacity(snapshot.utxos.len());
        for coordinate in &snapshot.utxos {
            let txo = snapshot.txo_map.get(coordinate).ok_or_else(|| {
                CollaboratorError::Malformed(format!("no txo entry for {coordinate}"))
            })?;
            let output = self
                .outputs
                .materialize(&txo.descriptor, network, None, txo.index, &[])?;
            candidates.push(Candidate {
                coordinate: *coordinate,
                value: txo.value,
                output,
            });
        }

        let destination = if destination.trim_start().starts_with("addr(") {
            destination.trim().to_string()
        } else {
            format!("addr({})", destination.trim())
        };
        let target = Target {
            output: self.outputs.materialize(&destination, network, None, None, &[])?,
            value: amount,
        };

        let template = match wallet
            .descriptors
            .iter()
            .find(|d| chain_of(d) == Some(Chain::Change))
        {
            Some(d) => d.clone(),
            None => with_chain(&wallet.descriptors[0], Chain::Change)?,
        };
        let change_index = self.discovery.next_index(&template).await?;
        let change = self
            .outputs
            .materialize(&template, network, None, Some(change_index), &[])?;
        debug!(wallet_id, change_index, change = %change.address(), "derived change output");

        let request = SelectionRequest {
            candidates,
            targets: vec![target],
            change,
            fee_rate,
        };
        let selection = self
            .selector
            .select(&request)
            .ok_or_else(|| WalletError::InsufficientFunds {
                wallet_id,
                available: snapshot.balance(),
                requested: amount,
            })?;

        debug_assert_eq!(selection.input_value(), selection.output_value() + selection.fee);
        debug_assert!(selection.fee >= fee_rate.fee_for_vsize(selection.vsize));
        info!(
            wallet_id,
            inputs = selection.inputs.len(),
            fee = selection.fee,
            vsize = selection.vsize,
            change = selection.change.is_some(),
            "funding selected"
        );
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorFactory;
    use crate::keys::MasterNodeRegistry;
    use crate::wallet::WalletSource;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;
    use fundkit_core::traits::MockDiscovery;
    use fundkit_core::{AddressType, TxoInfo, UtxoSnapshot};
    use proptest::prelude::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const DEST: &str = "bcrt1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

    struct Fixture {
        wallets: Arc<WalletRegistry>,
        outputs: Arc<OutputMaterializer>,
        wallet_id: u64,
        descriptors: Vec<String>,
    }

    fn fixture(types: &[AddressType]) -> Fixture {
        let masters = Arc::new(MasterNodeRegistry::new());
        let wallets = Arc::new(WalletRegistry::new(
            Arc::clone(&masters),
            DescriptorFactory::new(masters),
        ));
        let info = wallets
            .create_wallet(WalletSource::Mnemonic(ABANDON.into()), NetworkType::Regtest, Some(types))
            .unwrap();
        Fixture {
            wallets,
            outputs: Arc::new(OutputMaterializer::new()),
            wallet_id: info.wallet_id,
            descriptors: info.descriptors,
        }
    }

    fn coordinate(n: u8) -> Coordinate {
        Coordinate::new(Txid::from_byte_array([n; 32]), 0)
    }

    fn snapshot(descriptor: &str, values: &[u64]) -> UtxoSnapshot {
        let mut snap = UtxoSnapshot::default();
        for (i, value) in values.iter().enumerate() {
            let c = coordinate(i as u8 + 1);
            snap.utxos.push(c);
            snap.txo_map.insert(
                c,
                TxoInfo {
                    value: *value,
                    descriptor: descriptor.to_string(),
                    index: Some(i as u32),
                },
            );
        }
        snap
    }

    fn discovery(snap: UtxoSnapshot, next_index: u32) -> MockDiscovery {
        let mut mock = MockDiscovery::new();
        mock.expect_fetch().returning(|_| Ok(()));
        mock.expect_utxos_and_balance()
            .returning(move |_| Ok(snap.clone()));
        mock.expect_next_index().returning(move |_| Ok(next_index));
        mock.expect_network().return_const(None::<NetworkType>);
        mock
    }

    fn orchestrator(f: &Fixture, mock: MockDiscovery) -> CoinSelectionOrchestrator<MockDiscovery> {
        CoinSelectionOrchestrator::new(Arc::clone(&f.wallets), Arc::clone(&f.outputs), mock)
    }

    #[tokio::test]
    async fn funds_with_change() {
        let f = fixture(&[AddressType::Wpkh]);
        let snap = snapshot(&f.descriptors[0], &[50_000, 20_000]);
        let o = orchestrator(&f, discovery(snap, 4));

        let sel = o
            .build_funding(f.wallet_id, DEST, 30_000, FeeRate::DEFAULT)
            .await
            .unwrap();
        assert_eq!(sel.inputs.len(), 1);
        assert_eq!(sel.inputs[0].value, 50_000);
        assert_eq!(sel.targets[0].value, 30_000);
        let change = sel.change.as_ref().expect("change output");
        assert_eq!(sel.input_value(), sel.output_value() + sel.fee);
        assert_eq!(sel.fee, FeeRate::DEFAULT.fee_for_vsize(sel.vsize));

        // change comes from the chain-1 descriptor at the discovered index
        let expected = f
            .outputs
            .materialize(&f.descriptors[1], NetworkType::Regtest, None, Some(4), &[])
            .unwrap();
        assert_eq!(change.output.address(), expected.address());
    }

    #[tokio::test]
    async fn spends_several_inputs_when_needed() {
        let f = fixture(&[AddressType::Wpkh]);
        let snap = snapshot(&f.descriptors[0], &[10_000, 30_000, 20_000]);
        let o = orchestrator(&f, discovery(snap, 0));

        let sel = o
            .build_funding(f.wallet_id, DEST, 45_000, FeeRate::DEFAULT)
            .await
            .unwrap();
        let values: Vec<u64> = sel.inputs.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![30_000, 20_000]);
    }

    #[tokio::test]
    async fn no_utxos_is_no_funds() {
        let f = fixture(&[AddressType::Wpkh]);
        let o = orchestrator(&f, discovery(UtxoSnapshot::default(), 0));
        let err = o
            .build_funding(f.wallet_id, DEST, 1_000, FeeRate::DEFAULT)
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::NoFunds(f.wallet_id));
    }

    #[tokio::test]
    async fn overspend_is_insufficient_funds() {
        let f = fixture(&[AddressType::Wpkh]);
        let snap = snapshot(&f.descriptors[0], &[5_000, 6_000]);
        let o = orchestrator(&f, discovery(snap, 0));
        let err = o
            .build_funding(f.wallet_id, DEST, 11_000, FeeRate::DEFAULT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                wallet_id: f.wallet_id,
                available: 11_000,
                requested: 11_000,
            }
        );
    }

    #[tokio::test]
    async fn unknown_wallet_never_calls_discovery() {
        let f = fixture(&[AddressType::Wpkh]);
        let mut mock = MockDiscovery::new();
        mock.expect_fetch().never();
        let o = orchestrator(&f, mock);
        let err = o.build_funding(42, DEST, 1_000, FeeRate::DEFAULT).await.unwrap_err();
        assert_eq!(err, WalletError::UnknownWallet(42));
    }

    #[tokio::test]
    async fn zero_amount_rejected() {
        let f = fixture(&[AddressType::Wpkh]);
        let o = orchestrator(&f, MockDiscovery::new());
        let err = o.build_funding(f.wallet_id, DEST, 0, FeeRate::DEFAULT).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn discovery_failure_surfaces() {
        let f = fixture(&[AddressType::Wpkh]);
        let mut mock = MockDiscovery::new();
        mock.expect_network().return_const(Some(NetworkType::Regtest));
        mock.expect_fetch()
            .returning(|_| Err(CollaboratorError::Timeout("esplora".into())));
        let o = orchestrator(&f, mock);
        let err = o.build_funding(f.wallet_id, DEST, 1_000, FeeRate::DEFAULT).await.unwrap_err();
        assert!(matches!(err, WalletError::CollaboratorUnavailable(CollaboratorError::Timeout(_))));
    }

    #[tokio::test]
    async fn collaborator_on_other_network_is_refused() {
        let f = fixture(&[AddressType::Wpkh]);
        let mut mock = MockDiscovery::new();
        mock.expect_network().return_const(Some(NetworkType::Bitcoin));
        mock.expect_fetch().never();
        let o = orchestrator(&f, mock);
        let err = o.build_funding(f.wallet_id, DEST, 1_000, FeeRate::DEFAULT).await.unwrap_err();
        assert_eq!(
            err,
            WalletError::NetworkMismatch {
                wallet: NetworkType::Regtest,
                collaborator: NetworkType::Bitcoin,
            }
        );
    }

    #[test]
    fn tape_and_regtest_backends_are_distinct() {
        assert!(ensure_network(NetworkType::Tape, None).is_ok());
        assert!(ensure_network(NetworkType::Tape, Some(NetworkType::Tape)).is_ok());
        assert!(ensure_network(NetworkType::Tape, Some(NetworkType::Regtest)).is_err());
    }

    #[tokio::test]
    async fn missing_txo_entry_is_collaborator_fault() {
        let f = fixture(&[AddressType::Wpkh]);
        let mut snap = snapshot(&f.descriptors[0], &[10_000]);
        snap.txo_map.clear();
        let o = orchestrator(&f, discovery(snap, 0));
        let err = o.build_funding(f.wallet_id, DEST, 1_000, FeeRate::DEFAULT).await.unwrap_err();
        assert!(matches!(err, WalletError::CollaboratorUnavailable(CollaboratorError::Malformed(_))));
    }

    #[tokio::test]
    async fn destination_on_wrong_network() {
        let f = fixture(&[AddressType::Wpkh]);
        let snap = snapshot(&f.descriptors[0], &[10_000]);
        let o = orchestrator(&f, discovery(snap, 0));
        let err = o
            .build_funding(f.wallet_id, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu", 1_000, FeeRate::DEFAULT)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidDescriptor { .. }));
    }

    struct Refuse;

    impl CoinSelect for Refuse {
        fn select(&self, _: &SelectionRequest) -> Option<CoinSelectionResult> {
            None
        }
    }

    #[tokio::test]
    async fn custom_selector_is_used() {
        let f = fixture(&[AddressType::Wpkh]);
        let snap = snapshot(&f.descriptors[0], &[100_000]);
        let o = orchestrator(&f, discovery(snap, 0)).with_selector(Refuse);
        let err = o.build_funding(f.wallet_id, DEST, 1_000, FeeRate::DEFAULT).await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }

    fn request(values: &[u64], amount: u64, rate: u64) -> SelectionRequest {
        let f = fixture(&[AddressType::Wpkh]);
        let net = NetworkType::Regtest;
        let candidates = values
            .iter()
            .enumerate()
            .map(|(i, v)| Candidate {
                coordinate: coordinate(i as u8 + 1),
                value: *v,
                output: f
                    .outputs
                    .materialize(&f.descriptors[0], net, None, Some(i as u32), &[])
                    .unwrap(),
            })
            .collect();
        SelectionRequest {
            candidates,
            targets: vec![Target {
                output: f.outputs.materialize(&format!("addr({DEST})"), net, None, None, &[]).unwrap(),
                value: amount,
            }],
            change: f.outputs.materialize(&f.descriptors[1], net, None, Some(0), &[]).unwrap(),
            fee_rate: FeeRate::from_sat_per_vb(rate).unwrap(),
        }
    }

    #[test]
    fn small_excess_goes_to_fee() {
        let req = request(&[10_000], 9_700, 1);
        let sel = LargestFirst.select(&req).unwrap();
        assert!(sel.change.is_none());
        assert_eq!(sel.fee, 300);
        assert_eq!(sel.input_value(), sel.output_value() + sel.fee);
    }

    #[test]
    fn weight_counts_segwit_marker() {
        let req = request(&[10_000], 1_000, 1);
        let input = req.candidates[0].output.as_ref();
        let script = req.targets[0].output.script_pubkey();
        let with = estimate_weight([input], [script]);
        let none: [&Output; 0] = [];
        let without = estimate_weight(none, [script]);
        assert_eq!(
            with - without,
            TXIN_BASE_WEIGHT + input.satisfaction_weight().unwrap() + SEGWIT_MARKER_WEIGHT
        );
        // P2WPKH output: 8 value + 1 length + 22 script
        assert_eq!(output_weight(script), 31 * 4);
    }

    #[test]
    fn weight_counts_marker_for_wrapped_segwit() {
        let f = fixture(&[AddressType::Wpkh, AddressType::Pkh, AddressType::ShWpkh]);
        let net = NetworkType::Regtest;
        let receive = |n: usize| {
            f.outputs
                .materialize(&f.descriptors[n * 2], net, None, Some(0), &[])
                .unwrap()
        };
        let (wpkh, pkh, sh_wpkh) = (receive(0), receive(1), receive(2));
        let dest = f.outputs.materialize(&format!("addr({DEST})"), net, None, None, &[]).unwrap();
        let script = dest.script_pubkey();
        let none: [&Output; 0] = [];
        let base = estimate_weight(none, [script]);
        fn spend(o: &Output) -> u64 {
            TXIN_BASE_WEIGHT + o.satisfaction_weight().unwrap()
        }

        assert_eq!(
            estimate_weight([sh_wpkh.as_ref()], [script]) - base,
            spend(&sh_wpkh) + SEGWIT_MARKER_WEIGHT
        );
        assert_eq!(estimate_weight([pkh.as_ref()], [script]) - base, spend(&pkh));
        // the legacy input gets a one-byte empty witness stack
        assert_eq!(
            estimate_weight([pkh.as_ref(), wpkh.as_ref()], [script]) - base,
            spend(&pkh) + spend(&wpkh) + SEGWIT_MARKER_WEIGHT + 1
        );
    }

    #[test]
    fn surplus_equal_to_threshold_goes_to_fee() {
        let amount = 10_000;
        let mut req = request(&[0], amount, 2);
        let rate = req.fee_rate;
        let change_script = req.change.script_pubkey();
        let weight = estimate_weight(
            [req.candidates[0].output.as_ref()],
            [req.targets[0].output.script_pubkey()],
        ) + output_weight(change_script);
        let threshold = change_script
            .minimal_non_dust()
            .to_sat()
            .max(rate.fee_for_weight(TXIN_BASE_WEIGHT + req.change.satisfaction_weight().unwrap()));
        let fee_with_change = rate.fee_for_weight(weight);

        req.candidates[0].value = amount + fee_with_change + threshold;
        let sel = LargestFirst.select(&req).unwrap();
        assert!(sel.change.is_none());
        assert_eq!(sel.input_value(), sel.output_value() + sel.fee);

        req.candidates[0].value += 1;
        let sel = LargestFirst.select(&req).unwrap();
        assert_eq!(sel.change.as_ref().map(|c| c.value), Some(threshold + 1));
        assert_eq!(sel.fee, fee_with_change);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn selection_contract_holds(
            values in prop::collection::vec(1_000u64..2_000_000, 1..6),
            amount in 1_000u64..3_000_000,
            rate in 1u64..50,
        ) {
            let req = request(&values, amount, rate);
            let fee_rate = req.fee_rate;
            match LargestFirst.select(&req) {
                Some(sel) => {
                    prop_assert_eq!(sel.input_value(), sel.output_value() + sel.fee);
                    prop_assert!(sel.fee >= fee_rate.fee_for_vsize(sel.vsize));
                    prop_assert_eq!(sel.targets[0].value, amount);
                    if let Some(change) = &sel.change {
                        prop_assert!(change.value >= change.output.script_pubkey().minimal_non_dust().to_sat());
                    }
                }
                None => {
                    let total: u64 = values.iter().sum();
                    let all: Vec<&Output> = req.candidates.iter().map(|c| c.output.as_ref()).collect();
                    let weight = estimate_weight(all, [req.targets[0].output.script_pubkey()]);
                    prop_assert!(total < amount + fee_rate.fee_for_weight(weight));
                }
            }
        }
    }
}
