//! Unsigned transaction assembly.
//!
//! Turns a [`CoinSelectionResult`] into a BIP174 PSBT:
//! 1. Lay out inputs and outputs in selection order (version 2)
//! 2. Encode each input: `witness_utxo` for segwit outputs, the full previous
//!    transaction (fetched from the explorer) for everything else
//! 3. Attach key-origin data from the descriptors to inputs and change

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bitcoin::psbt::Psbt;
use bitcoin::transaction::Version;
use bitcoin::{absolute, consensus, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use fundkit_core::Explorer;
use miniscript::psbt::PsbtExt;
use tracing::{debug, info};

use crate::coin_selection::CoinSelectionResult;
use crate::error::WalletError;

/// An unsigned funding transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    psbt: Psbt,
    fee: u64,
    vsize: u64,
}

impl UnsignedTransaction {
    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    /// Fee in satoshis, as computed by coin selection.
    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Estimated virtual size of the signed transaction.
    pub fn vsize(&self) -> u64 {
        self.vsize
    }

    /// Canonical PSBT bytes.
    pub fn serialize(&self) -> Vec<u8> {
        self.psbt.serialize()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.serialize())
    }
}

/// Assembles PSBTs, fetching previous transactions only for non-segwit inputs.
pub struct TransactionAssembler<E> {
    explorer: E,
}

impl<E: Explorer> TransactionAssembler<E> {
    pub fn new(explorer: E) -> Self {
        Self { explorer }
    }

    pub fn explorer(&self) -> &E {
        &self.explorer
    }

    /// Build the unsigned transaction for `selection`.
    pub async fn assemble(&self, selection: &CoinSelectionResult) -> Result<UnsignedTransaction, WalletError> {
        let lock_time = lock_time(selection)?;
        let input = selection
            .inputs
            .iter()
            .map(|c| TxIn {
                previous_output: c.coordinate.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: sequence_for(c.output.plan().and_then(|p| p.relative_timelock), lock_time),
                witness: Witness::new(),
            })
            .collect();
        let output = selection
            .outputs()
            .map(|t| TxOut {
                value: Amount::from_sat(t.value),
                script_pubkey: t.output.script_pubkey().clone(),
            })
            .collect();
        let tx = Transaction {
            version: Version::TWO,
            lock_time,
            input,
            output,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| WalletError::AssemblyFailed {
            coordinate: "transaction".into(),
            reason: e.to_string(),
        })?;

        for (i, candidate) in selection.inputs.iter().enumerate() {
            let coordinate = candidate.coordinate;
            let failed = |reason: String| WalletError::AssemblyFailed {
                coordinate: coordinate.to_string(),
                reason,
            };
            let spent = TxOut {
                value: Amount::from_sat(candidate.value),
                script_pubkey: candidate.output.script_pubkey().clone(),
            };

            if candidate.output.is_segwit() {
                debug!(%coordinate, kind = %candidate.output.kind(), "segwit input, using witness_utxo");
                psbt.inputs[i].witness_utxo = Some(spent);
            } else {
                debug!(%coordinate, kind = %candidate.output.kind(), "legacy input, fetching previous transaction");
                let raw = self
                    .explorer
                    .fetch_tx(&coordinate.txid)
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                let prev: Transaction =
                    consensus::deserialize(&raw).map_err(|e| failed(format!("decode previous transaction: {e}")))?;
                if prev.compute_txid() != coordinate.txid {
                    return Err(failed(format!("explorer returned transaction {}", prev.compute_txid())));
                }
                let prev_out = prev
                    .output
                    .get(coordinate.vout as usize)
                    .ok_or_else(|| failed(format!("previous transaction has {} outputs", prev.output.len())))?;
                if *prev_out != spent {
                    return Err(failed("previous output does not match the discovered UTXO".into()));
                }
                psbt.inputs[i].non_witness_utxo = Some(prev);
            }

            if let Some(descriptor) = candidate.output.descriptor() {
                psbt.update_input_with_descriptor(i, descriptor)
                    .map_err(|e| failed(format!("key origin: {e:?}")))?;
            }
        }

        for (i, target) in selection.outputs().enumerate() {
            if let Some(descriptor) = target.output.descriptor() {
                psbt.update_output_with_descriptor(i, descriptor)
                    .map_err(|e| WalletError::AssemblyFailed {
                        coordinate: format!("output #{i}"),
                        reason: format!("key origin: {e:?}"),
                    })?;
            }
        }

        info!(
            inputs = psbt.inputs.len(),
            outputs = psbt.outputs.len(),
            fee = selection.fee,
            vsize = selection.vsize,
            "assembled unsigned transaction"
        );
        Ok(UnsignedTransaction {
            psbt,
            fee: selection.fee,
            vsize: selection.vsize,
        })
    }
}

/// Highest absolute lock required by any input's spend plan.
fn lock_time(selection: &CoinSelectionResult) -> Result<absolute::LockTime, WalletError> {
    let mut lock = absolute::LockTime::ZERO;
    for candidate in &selection.inputs {
        let Some(required) = candidate.output.plan().and_then(|p| p.absolute_timelock) else {
            continue;
        };
        if lock == absolute::LockTime::ZERO {
            lock = required;
        } else if !lock.is_same_unit(required) {
            return Err(WalletError::AssemblyFailed {
                coordinate: candidate.coordinate.to_string(),
                reason: "inputs mix height and time locks".into(),
            });
        } else if required.to_consensus_u32() > lock.to_consensus_u32() {
            lock = required;
        }
    }
    Ok(lock)
}

fn sequence_for(relative: Option<Sequence>, lock_time: absolute::LockTime) -> Sequence {
    match relative {
        Some(seq) => seq,
        None if lock_time != absolute::LockTime::ZERO => Sequence::ENABLE_LOCKTIME_NO_RBF,
        None => Sequence::MAX,
    }
}
