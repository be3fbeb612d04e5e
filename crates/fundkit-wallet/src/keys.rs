//! Master-node registry: BIP-39 mnemonic → BIP-32 master key, keyed by fingerprint.
//!
//! The registry is the only owner of private key material. Callers get a
//! [`Fingerprint`] handle back and never see the key itself; crate-internal
//! consumers borrow a node through [`MasterNodeRegistry::lookup`] for the
//! duration of a closure.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::NetworkKind;
use fundkit_core::NetworkType;
use parking_lot::RwLock;
use tracing::info;
use zeroize::Zeroizing;

use crate::error::WalletError;
use crate::mnemonic::parse_mnemonic;

/// A derived BIP-32 master key and the phrase it came from.
///
/// Secret material is wiped on drop and redacted from `Debug`.
pub struct MasterNode {
    mnemonic: Zeroizing<String>,
    network: NetworkType,
    xpriv: Xpriv,
}

impl MasterNode {
    pub(crate) fn from_mnemonic(phrase: &str, network: NetworkType) -> Result<Self, WalletError> {
        let mnemonic = parse_mnemonic(phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let xpriv = Xpriv::new_master(network.bitcoin_network(), seed.as_ref())
            .map_err(|e| WalletError::InvalidMnemonic(format!("master key derivation: {e}")))?;
        Ok(Self {
            mnemonic: Zeroizing::new(mnemonic.to_string()),
            network,
            xpriv,
        })
    }

    /// Fingerprint of the master public key.
    pub fn fingerprint(&self, secp: &Secp256k1<All>) -> Fingerprint {
        self.xpriv.fingerprint(secp)
    }

    /// Network the node was last registered for.
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// Derive the extended public key at `path`, encoded for `network`.
    ///
    /// Key derivation is network-independent; only the serialization prefix
    /// follows `network`.
    pub(crate) fn account_xpub(
        &self,
        secp: &Secp256k1<All>,
        path: &DerivationPath,
        network: NetworkType,
    ) -> Result<Xpub, WalletError> {
        let child = self
            .xpriv
            .derive_priv(secp, path)
            .map_err(|e| WalletError::InvalidDescriptor {
                descriptor: format!("m/{path}"),
                reason: e.to_string(),
            })?;
        let mut xpub = Xpub::from_priv(secp, &child);
        xpub.network = NetworkKind::from(network.bitcoin_network());
        Ok(xpub)
    }

    #[cfg(test)]
    pub(crate) fn phrase(&self) -> &str {
        &self.mnemonic
    }
}

impl Drop for MasterNode {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for MasterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterNode")
            .field("network", &self.network)
            .field("mnemonic", &"[REDACTED]")
            .field("xpriv", &"[REDACTED]")
            .finish()
    }
}

/// Process-lifetime map of fingerprint → master node.
///
/// Registering the same fingerprint again replaces the stored entry.
pub struct MasterNodeRegistry {
    nodes: RwLock<HashMap<Fingerprint, MasterNode>>,
    secp: Secp256k1<All>,
}

impl MasterNodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            secp: Secp256k1::new(),
        }
    }

    /// Derive the master node for `mnemonic` on `network` and register it.
    ///
    /// Returns the 8-hex-character fingerprint handle. Deterministic: the
    /// same phrase always yields the same fingerprint.
    pub fn derive_master_node(
        &self,
        mnemonic: &str,
        network: NetworkType,
    ) -> Result<Fingerprint, WalletError> {
        let node = MasterNode::from_mnemonic(mnemonic, network)?;
        Ok(self.register(node))
    }

    /// Store an already derived node, replacing any entry with the same
    /// fingerprint.
    pub(crate) fn register(&self, node: MasterNode) -> Fingerprint {
        let fingerprint = node.fingerprint(&self.secp);
        let network = node.network();
        let replaced = self.nodes.write().insert(fingerprint, node).is_some();
        info!(%fingerprint, %network, replaced, "registered master node");
        fingerprint
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Whether a master node is registered under `fingerprint`.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.nodes.read().contains_key(fingerprint)
    }

    /// Number of registered master nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Run `f` against the node registered under `fingerprint`.
    ///
    /// The read lock is held only for the duration of `f`.
    pub(crate) fn lookup<R>(
        &self,
        fingerprint: &Fingerprint,
        f: impl FnOnce(&MasterNode, &Secp256k1<All>) -> R,
    ) -> Result<R, WalletError> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(fingerprint)
            .ok_or_else(|| WalletError::UnknownFingerprint(fingerprint.to_string()))?;
        Ok(f(node, &self.secp))
    }
}

impl Default for MasterNodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MasterNodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterNodeRegistry")
            .field("nodes", &self.len())
            .finish()
    }
}

/// Parse a fingerprint handle, mapping malformed input to `UnknownFingerprint`.
pub fn parse_fingerprint(s: &str) -> Result<Fingerprint, WalletError> {
    Fingerprint::from_str(s.trim()).map_err(|_| WalletError::UnknownFingerprint(s.to_string()))
}
