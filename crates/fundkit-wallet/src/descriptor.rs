//! BIP44/49/84 descriptor construction rooted at a registered master node.

use std::str::FromStr;
use std::sync::Arc;

use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint};
use bitcoin::secp256k1::{All, Secp256k1};
use fundkit_core::types::MAX_UNHARDENED_INDEX;
use fundkit_core::{AddressType, Chain, DerivationIndex, NetworkType};
use miniscript::descriptor::{Descriptor, DescriptorPublicKey};
use tracing::debug;

use crate::error::WalletError;
use crate::keys::{MasterNode, MasterNodeRegistry};

/// Builds public-key-only descriptors for registered master nodes.
#[derive(Debug, Clone)]
pub struct DescriptorFactory {
    masters: Arc<MasterNodeRegistry>,
}

impl DescriptorFactory {
    pub fn new(masters: Arc<MasterNodeRegistry>) -> Self {
        Self { masters }
    }

    /// Build `wpkh([fp/84'/coin'/account']xpub/chain/index)#checksum` (or the
    /// `pkh` / `sh(wpkh)` equivalent) for the master node under `fingerprint`.
    ///
    /// The xpub is serialized with `network`'s prefix.
    pub fn build_descriptor(
        &self,
        fingerprint: &Fingerprint,
        address_type: AddressType,
        network: NetworkType,
        account: u32,
        chain: Chain,
        index: DerivationIndex,
    ) -> Result<String, WalletError> {
        if account > MAX_UNHARDENED_INDEX {
            return Err(WalletError::InvalidDescriptor {
                descriptor: format!("account {account}"),
                reason: "account must be below 2^31".into(),
            });
        }
        if let DerivationIndex::Index(i) = index {
            if i > MAX_UNHARDENED_INDEX {
                return Err(WalletError::InvalidDescriptor {
                    descriptor: format!("index {i}"),
                    reason: "index must be non-hardened".into(),
                });
            }
        }

        self.masters.lookup(fingerprint, |node, secp| {
            describe(node, secp, address_type, network, account, chain, index)
        })?
    }
}

/// Descriptor for `node`, which need not be registered yet.
pub(crate) fn describe(
    node: &MasterNode,
    secp: &Secp256k1<All>,
    address_type: AddressType,
    network: NetworkType,
    account: u32,
    chain: Chain,
    index: DerivationIndex,
) -> Result<String, WalletError> {
    let fingerprint = node.fingerprint(secp);
    let purpose = address_type.purpose();
    let coin = network.coin_type();
    let path = account_path(purpose, coin, account)?;
    let xpub = node.account_xpub(secp, &path, network)?;

    let key = format!(
        "[{fingerprint}/{purpose}'/{coin}'/{account}']{xpub}/{}/{index}",
        chain.index()
    );
    let body = match address_type {
        AddressType::Pkh => format!("pkh({key})"),
        AddressType::Wpkh => format!("wpkh({key})"),
        AddressType::ShWpkh => format!("sh(wpkh({key}))"),
    };
    let descriptor = with_checksum(&body)?;
    debug!(%fingerprint, %address_type, %network, account, descriptor = %descriptor, "built descriptor");
    Ok(descriptor)
}

fn account_path(purpose: u32, coin: u32, account: u32) -> Result<DerivationPath, WalletError> {
    let hardened = |i: u32| {
        ChildNumber::from_hardened_idx(i).map_err(|e| WalletError::InvalidDescriptor {
            descriptor: format!("m/{purpose}'/{coin}'/{account}'"),
            reason: e.to_string(),
        })
    };
    Ok(DerivationPath::from(vec![
        hardened(purpose)?,
        hardened(coin)?,
        hardened(account)?,
    ]))
}

/// Parse `body` as a public descriptor and return it with its checksum.
fn with_checksum(body: &str) -> Result<String, WalletError> {
    Descriptor::<DescriptorPublicKey>::from_str(body)
        .map(|d| d.to_string())
        .map_err(|e| WalletError::InvalidDescriptor {
            descriptor: body.to_string(),
            reason: e.to_string(),
        })
}

fn strip_checksum(descriptor: &str) -> &str {
    descriptor.split('#').next().unwrap_or(descriptor)
}

/// Chain branch of a ranged `.../<0|1>/*` descriptor, if it has one.
pub fn chain_of(descriptor: &str) -> Option<Chain> {
    let body = strip_checksum(descriptor).trim_end_matches(')');
    if body.ends_with("/0/*") {
        Some(Chain::External)
    } else if body.ends_with("/1/*") {
        Some(Chain::Change)
    } else {
        None
    }
}

/// Rewrite the `/<chain>/*` suffix of a ranged descriptor and recompute its
/// checksum.
pub fn with_chain(descriptor: &str, chain: Chain) -> Result<String, WalletError> {
    let body = strip_checksum(descriptor);
    let current = chain_of(body).ok_or_else(|| WalletError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: "not a ranged /<chain>/* descriptor".into(),
    })?;
    let from = format!("/{}/*", current.index());
    let to = format!("/{}/*", chain.index());
    // chain_of guarantees the suffix exists
    let at = body.rfind(&from).unwrap_or(body.len());
    let rewritten = format!("{}{}{}", &body[..at], to, &body[at + from.len()..]);
    with_checksum(&rewritten)
}
