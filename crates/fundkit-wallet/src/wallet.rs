//! Wallet registry: numbered sets of external/change descriptor pairs.
//!
//! A [`Wallet`] is immutable once registered. Creation builds every
//! descriptor first and only then registers the master node and allocates
//! an id, so a failed request leaves both registries untouched.

use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::bip32::Fingerprint;
use fundkit_core::{AddressType, Chain, DerivationIndex, NetworkType};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::descriptor::{describe, DescriptorFactory};
use crate::error::WalletError;
use crate::keys::{parse_fingerprint, MasterNode, MasterNodeRegistry};
use crate::mnemonic::{generate_mnemonic, DEFAULT_STRENGTH};

/// Account index used for every wallet descriptor.
pub const DEFAULT_ACCOUNT: u32 = 0;

/// Where a new wallet's master node comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSource {
    /// A master node registered earlier.
    Fingerprint(String),
    /// A phrase to register first.
    Mnemonic(String),
    /// A fresh 12-word phrase, returned once in [`WalletInfo`].
    Generate,
}

/// A registered wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub id: u64,
    #[serde(serialize_with = "fingerprint_str")]
    pub fingerprint: Fingerprint,
    pub network: NetworkType,
    /// External then change ranged descriptor for each address type.
    pub descriptors: Vec<String>,
}

fn fingerprint_str<S: Serializer>(fp: &Fingerprint, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(fp)
}

/// Result of [`WalletRegistry::create_wallet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    pub wallet_id: u64,
    pub fingerprint: String,
    pub network: NetworkType,
    pub descriptors: Vec<String>,
    /// Set only when the registry generated the phrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_mnemonic: Option<String>,
}

#[derive(Debug)]
struct Wallets {
    next_id: u64,
    by_id: HashMap<u64, Arc<Wallet>>,
}

/// Process-lifetime wallet map keyed by id.
#[derive(Debug)]
pub struct WalletRegistry {
    masters: Arc<MasterNodeRegistry>,
    factory: DescriptorFactory,
    wallets: Mutex<Wallets>,
}

impl WalletRegistry {
    pub fn new(masters: Arc<MasterNodeRegistry>, factory: DescriptorFactory) -> Self {
        Self {
            masters,
            factory,
            wallets: Mutex::new(Wallets {
                next_id: 1,
                by_id: HashMap::new(),
            }),
        }
    }

    /// Create (or find) the wallet for `source` on `network`.
    ///
    /// `types` defaults to [`AddressType::DEFAULT_SET`]. An identical
    /// (fingerprint, network, descriptors) request returns the wallet that
    /// already exists.
    pub fn create_wallet(
        &self,
        source: WalletSource,
        network: NetworkType,
        types: Option<&[AddressType]>,
    ) -> Result<WalletInfo, WalletError> {
        let types = types.unwrap_or(&AddressType::DEFAULT_SET);
        if types.is_empty() {
            // no id exists yet for a rejected request
            return Err(WalletError::EmptyWallet(0));
        }

        // a derived node is only registered once every descriptor is built
        let (fingerprint, pending, generated_mnemonic) = match source {
            WalletSource::Fingerprint(fp) => {
                let fingerprint = parse_fingerprint(&fp)?;
                if !self.masters.contains(&fingerprint) {
                    return Err(WalletError::UnknownFingerprint(fp));
                }
                (fingerprint, None, None)
            }
            WalletSource::Mnemonic(phrase) => {
                let node = MasterNode::from_mnemonic(&phrase, network)?;
                (node.fingerprint(self.masters.secp()), Some(node), None)
            }
            WalletSource::Generate => {
                let phrase = generate_mnemonic(DEFAULT_STRENGTH)?;
                let node = MasterNode::from_mnemonic(&phrase, network)?;
                (node.fingerprint(self.masters.secp()), Some(node), Some(phrase))
            }
        };

        let mut descriptors = Vec::with_capacity(types.len() * 2);
        for &address_type in types {
            for chain in [Chain::External, Chain::Change] {
                let descriptor = match &pending {
                    Some(node) => describe(
                        node,
                        self.masters.secp(),
                        address_type,
                        network,
                        DEFAULT_ACCOUNT,
                        chain,
                        DerivationIndex::Wildcard,
                    )?,
                    None => self.factory.build_descriptor(
                        &fingerprint,
                        address_type,
                        network,
                        DEFAULT_ACCOUNT,
                        chain,
                        DerivationIndex::Wildcard,
                    )?,
                };
                descriptors.push(descriptor);
            }
        }
        if let Some(node) = pending {
            self.masters.register(node);
        }

        let mut wallets = self.wallets.lock();
        let existing = wallets.by_id.values().find(|w| {
            w.fingerprint == fingerprint && w.network == network && w.descriptors == descriptors
        });
        let wallet = match existing {
            Some(w) => {
                info!(wallet_id = w.id, %fingerprint, %network, "wallet already registered");
                Arc::clone(w)
            }
            None => {
                let id = wallets.next_id;
                wallets.next_id += 1;
                let wallet = Arc::new(Wallet {
                    id,
                    fingerprint,
                    network,
                    descriptors,
                });
                wallets.by_id.insert(id, Arc::clone(&wallet));
                info!(wallet_id = id, %fingerprint, %network, descriptors = wallet.descriptors.len(), "created wallet");
                wallet
            }
        };

        Ok(WalletInfo {
            wallet_id: wallet.id,
            fingerprint: wallet.fingerprint.to_string(),
            network: wallet.network,
            descriptors: wallet.descriptors.clone(),
            generated_mnemonic,
        })
    }

    pub fn get(&self, id: u64) -> Result<Arc<Wallet>, WalletError> {
        self.wallets
            .lock()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(WalletError::UnknownWallet(id))
    }

    /// Number of registered wallets.
    pub fn len(&self) -> usize {
        self.wallets.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.lock().by_id.is_empty()
    }
}
