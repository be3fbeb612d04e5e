//! Output materialization: descriptor (or `addr()`) + index → concrete spend target.
//!
//! Classification into [`OutputKind`] happens exactly once, when the output is
//! materialized. Everything downstream (weight estimation, PSBT input
//! encoding) reads the tag instead of re-inspecting scripts.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::hashes::{hash160, ripemd160, sha256, sha256d, Hash};
use bitcoin::key::XOnlyPublicKey;
use bitcoin::{absolute, Address, ScriptBuf, Sequence};
use fundkit_core::NetworkType;
use miniscript::descriptor::{DefiniteDescriptorKey, Descriptor, DescriptorPublicKey, DescriptorType};
use miniscript::plan::{Assets, Plan};
use miniscript::{hash256, ForEachKey, ToPublicKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WalletError;

/// Script template of a materialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Bare,
    Pkh,
    Sh,
    ShWpkh,
    ShWsh,
    Wpkh,
    Wsh,
    Tr,
}

impl OutputKind {
    /// Whether inputs spending this kind are encoded with `witness_utxo`.
    ///
    /// P2SH-wrapped forms count as non-segwit and carry the full previous
    /// transaction.
    pub fn is_segwit(&self) -> bool {
        matches!(self, Self::Wpkh | Self::Wsh | Self::Tr)
    }

    /// Whether a spend of this kind puts data in the witness, wrapped
    /// forms included.
    pub fn has_witness(&self) -> bool {
        self.is_segwit() || matches!(self, Self::ShWpkh | Self::ShWsh)
    }

    fn from_address(address: &Address) -> Self {
        match address.address_type() {
            Some(bitcoin::AddressType::P2pkh) => Self::Pkh,
            Some(bitcoin::AddressType::P2sh) => Self::Sh,
            Some(bitcoin::AddressType::P2wpkh) => Self::Wpkh,
            Some(bitcoin::AddressType::P2wsh) => Self::Wsh,
            Some(bitcoin::AddressType::P2tr) => Self::Tr,
            _ => Self::Bare,
        }
    }
}

impl From<DescriptorType> for OutputKind {
    fn from(t: DescriptorType) -> Self {
        match t {
            DescriptorType::Bare => Self::Bare,
            DescriptorType::Pkh => Self::Pkh,
            DescriptorType::Sh | DescriptorType::ShSortedMulti => Self::Sh,
            DescriptorType::ShWpkh => Self::ShWpkh,
            DescriptorType::ShWsh | DescriptorType::ShWshSortedMulti => Self::ShWsh,
            DescriptorType::Wpkh => Self::Wpkh,
            DescriptorType::Wsh | DescriptorType::WshSortedMulti => Self::Wsh,
            DescriptorType::Tr => Self::Tr,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bare => "bare",
            Self::Pkh => "pkh",
            Self::Sh => "sh",
            Self::ShWpkh => "sh-wpkh",
            Self::ShWsh => "sh-wsh",
            Self::Wpkh => "wpkh",
            Self::Wsh => "wsh",
            Self::Tr => "tr",
        };
        f.write_str(s)
    }
}

/// Hash preimage supplied for a hash-locked branch.
///
/// `digest` is written `<fn>(<hex>)` with `fn` one of sha256, hash256,
/// ripemd160, hash160; `preimage` is 32 bytes of hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Preimage {
    pub digest: String,
    pub preimage: String,
}

/// Validated preimage, ready to be offered to the planner.
#[derive(Debug, Clone, Copy)]
enum HashAsset {
    Sha256(sha256::Hash),
    Hash256(hash256::Hash),
    Ripemd160(ripemd160::Hash),
    Hash160(hash160::Hash),
}

impl Preimage {
    fn validate(&self) -> Result<HashAsset, WalletError> {
        let invalid = |reason: String| WalletError::InvalidPreimage {
            digest: self.digest.clone(),
            reason,
        };
        let (func, digest_hex) = self
            .digest
            .trim()
            .strip_suffix(')')
            .and_then(|d| d.split_once('('))
            .ok_or_else(|| invalid("expected <fn>(<hex>)".into()))?;
        let digest = hex::decode(digest_hex).map_err(|e| invalid(format!("digest hex: {e}")))?;
        let preimage = hex::decode(&self.preimage).map_err(|e| invalid(format!("preimage hex: {e}")))?;
        if preimage.len() != 32 {
            return Err(invalid(format!("preimage must be 32 bytes, got {}", preimage.len())));
        }

        let expect_len = match func {
            "sha256" | "hash256" => 32,
            "ripemd160" | "hash160" => 20,
            other => return Err(invalid(format!("unknown hash function {other}"))),
        };
        if digest.len() != expect_len {
            return Err(invalid(format!(
                "{func} digest must be {expect_len} bytes, got {}",
                digest.len()
            )));
        }

        let (computed, asset) = match func {
            "sha256" => {
                let h = sha256::Hash::hash(&preimage);
                (h.to_byte_array().to_vec(), HashAsset::Sha256(h))
            }
            "hash256" => {
                let h = sha256d::Hash::hash(&preimage).to_byte_array();
                (h.to_vec(), HashAsset::Hash256(hash256::Hash::from_byte_array(h)))
            }
            "ripemd160" => {
                let h = ripemd160::Hash::hash(&preimage);
                (h.to_byte_array().to_vec(), HashAsset::Ripemd160(h))
            }
            _ => {
                let h = hash160::Hash::hash(&preimage);
                (h.to_byte_array().to_vec(), HashAsset::Hash160(h))
            }
        };
        if computed != digest {
            return Err(invalid("preimage does not hash to digest".into()));
        }
        Ok(asset)
    }
}

/// Cost and timelocks of the spending path chosen for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendPlan {
    /// Weight of scriptSig plus witness, in weight units.
    pub satisfaction_weight: u64,
    /// Minimum `nLockTime` the path requires.
    pub absolute_timelock: Option<absolute::LockTime>,
    /// `nSequence` the path requires.
    pub relative_timelock: Option<Sequence>,
}

impl SpendPlan {
    fn has_timelock(&self) -> bool {
        self.absolute_timelock.is_some() || self.relative_timelock.is_some()
    }
}

impl From<&Plan> for SpendPlan {
    fn from(plan: &Plan) -> Self {
        Self {
            satisfaction_weight: plan.satisfaction_weight() as u64,
            absolute_timelock: plan.absolute_timelock.map(absolute::LockTime::from),
            relative_timelock: plan.relative_timelock.map(|l| l.to_sequence()),
        }
    }
}

/// A descriptor instance resolved to a script, with what is needed to spend it.
#[derive(Debug, Clone)]
pub struct Output {
    address: Address,
    script_pubkey: ScriptBuf,
    kind: OutputKind,
    descriptor: Option<Descriptor<DefiniteDescriptorKey>>,
    signers: Vec<bitcoin::PublicKey>,
    preimages: Vec<Preimage>,
    plan: Option<SpendPlan>,
}

impl Output {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn script_pubkey(&self) -> &ScriptBuf {
        &self.script_pubkey
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn is_segwit(&self) -> bool {
        self.kind.is_segwit()
    }

    pub fn has_witness(&self) -> bool {
        self.kind.has_witness()
    }

    /// The concrete descriptor, absent for `addr()` outputs.
    pub fn descriptor(&self) -> Option<&Descriptor<DefiniteDescriptorKey>> {
        self.descriptor.as_ref()
    }

    /// Public keys assumed to sign on the planned path.
    pub fn signers(&self) -> &[bitcoin::PublicKey] {
        &self.signers
    }

    pub fn preimages(&self) -> &[Preimage] {
        &self.preimages
    }

    /// Spending plan; `None` when no path is satisfiable with what is known
    /// (and always for `addr()` outputs).
    pub fn plan(&self) -> Option<&SpendPlan> {
        self.plan.as_ref()
    }

    pub fn satisfaction_weight(&self) -> Option<u64> {
        self.plan.map(|p| p.satisfaction_weight)
    }
}

/// Signer key as supplied by the caller: compressed or x-only.
#[derive(Debug, Clone, Copy)]
enum SignerKey {
    Full(bitcoin::PublicKey),
    XOnly(XOnlyPublicKey),
}

impl SignerKey {
    fn parse(hex_key: &str) -> Result<Self, WalletError> {
        let invalid = |reason: String| WalletError::InvalidDescriptor {
            descriptor: hex_key.to_string(),
            reason,
        };
        let bytes = hex::decode(hex_key.trim()).map_err(|e| invalid(format!("signer key hex: {e}")))?;
        match bytes.len() {
            32 => XOnlyPublicKey::from_slice(&bytes)
                .map(Self::XOnly)
                .map_err(|e| invalid(e.to_string())),
            33 | 65 => bitcoin::PublicKey::from_slice(&bytes)
                .map(Self::Full)
                .map_err(|e| invalid(e.to_string())),
            n => Err(invalid(format!("signer key must be 32, 33 or 65 bytes, got {n}"))),
        }
    }

    fn matches(&self, key: &bitcoin::PublicKey) -> bool {
        match self {
            Self::Full(pk) => pk.inner == key.inner,
            Self::XOnly(x) => key.inner.x_only_public_key().0 == *x,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    descriptor: String,
    network: NetworkType,
    index: Option<u32>,
    signers: Option<Vec<String>>,
    preimages: Vec<Preimage>,
}

/// Resolves descriptors into [`Output`]s and caches the results.
#[derive(Debug, Default)]
pub struct OutputMaterializer {
    by_request: RwLock<HashMap<RequestKey, Arc<Output>>>,
    by_address: RwLock<HashMap<String, Arc<Output>>>,
}

impl OutputMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize `descriptor` (or `addr(<address>)`) for `network`.
    ///
    /// `index` is required for ranged descriptors and rejected otherwise.
    /// `signers` narrows the keys assumed available; `None` assumes every key
    /// in the descriptor can sign.
    pub fn materialize(
        &self,
        descriptor: &str,
        network: NetworkType,
        signers: Option<&[String]>,
        index: Option<u32>,
        preimages: &[Preimage],
    ) -> Result<Arc<Output>, WalletError> {
        let key = RequestKey {
            descriptor: descriptor.trim().to_string(),
            network,
            index,
            signers: signers.map(|s| {
                let mut v: Vec<String> = s.iter().map(|k| k.trim().to_ascii_lowercase()).collect();
                v.sort();
                v
            }),
            preimages: preimages.to_vec(),
        };
        if let Some(hit) = self.by_request.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let output = Arc::new(resolve(&key)?);
        debug!(
            descriptor = %key.descriptor,
            address = %output.address,
            kind = %output.kind,
            segwit = output.is_segwit(),
            "materialized output"
        );
        self.by_address
            .write()
            .insert(output.address.to_string(), Arc::clone(&output));
        self.by_request.write().insert(key, Arc::clone(&output));
        Ok(output)
    }

    /// Previously materialized output for `address`.
    pub fn get(&self, address: &str) -> Option<Arc<Output>> {
        self.by_address.read().get(address).cloned()
    }

    /// Number of distinct addresses materialized so far.
    pub fn len(&self) -> usize {
        self.by_address.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.read().is_empty()
    }
}

fn resolve(req: &RequestKey) -> Result<Output, WalletError> {
    let text = req.descriptor.as_str();
    let invalid = |reason: String| WalletError::InvalidDescriptor {
        descriptor: text.to_string(),
        reason,
    };

    if let Some(address) = parse_addr_expression(text) {
        if let Some(index) = req.index {
            return Err(WalletError::UnexpectedIndex {
                descriptor: text.to_string(),
                index,
            });
        }
        let address = Address::from_str(address)
            .map_err(|e| invalid(e.to_string()))?
            .require_network(req.network.bitcoin_network())
            .map_err(|_| invalid(format!("address is not valid on {}", req.network)))?;
        return Ok(Output {
            script_pubkey: address.script_pubkey(),
            kind: OutputKind::from_address(&address),
            address,
            descriptor: None,
            signers: Vec::new(),
            preimages: Vec::new(),
            plan: None,
        });
    }

    let ranged = Descriptor::<DescriptorPublicKey>::from_str(text).map_err(|e| invalid(e.to_string()))?;
    if ranged.is_multipath() {
        return Err(invalid("multi-path descriptors must be split before materializing".into()));
    }
    let definite = match (ranged.has_wildcard(), req.index) {
        (true, None) => return Err(WalletError::MissingIndex(text.to_string())),
        (false, Some(index)) => {
            return Err(WalletError::UnexpectedIndex {
                descriptor: text.to_string(),
                index,
            })
        }
        (_, index) => ranged
            .at_derivation_index(index.unwrap_or(0))
            .map_err(|e| invalid(e.to_string()))?,
    };

    let kind = OutputKind::from(definite.desc_type());
    let address = definite
        .address(req.network.bitcoin_network())
        .map_err(|e| invalid(e.to_string()))?;
    let script_pubkey = definite.script_pubkey();

    let hashes = req
        .preimages
        .iter()
        .map(Preimage::validate)
        .collect::<Result<Vec<_>, _>>()?;

    let mut keys: Vec<DefiniteDescriptorKey> = Vec::new();
    definite.for_each_key(|k| {
        keys.push(k.clone());
        true
    });
    if let Some(signers) = &req.signers {
        let wanted = signers
            .iter()
            .map(|s| SignerKey::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        keys.retain(|k| {
            let pk = k.to_public_key();
            wanted.iter().any(|w| w.matches(&pk))
        });
    }

    let plan = plan_spend(&definite, &keys, &hashes);
    if plan.is_none() && req.signers.is_some() {
        return Err(WalletError::Unsatisfiable(text.to_string()));
    }

    Ok(Output {
        address,
        script_pubkey,
        kind,
        signers: keys.iter().map(|k| k.to_public_key()).collect(),
        descriptor: Some(definite),
        preimages: req.preimages.clone(),
        plan,
    })
}

/// Inner address of an `addr(...)` expression, ignoring any checksum.
fn parse_addr_expression(text: &str) -> Option<&str> {
    let body = text.split('#').next().unwrap_or(text).trim();
    body.strip_prefix("addr(")?.strip_suffix(')').map(str::trim)
}

/// Timelock assumptions tried when planning: none first, then the largest
/// height- and time-based locks so that timelocked paths can be priced.
fn timelock_assumptions() -> [(Option<absolute::LockTime>, Option<Sequence>); 5] {
    let max_height = absolute::LockTime::from_consensus(absolute::LOCK_TIME_THRESHOLD - 1);
    let max_time = absolute::LockTime::from_consensus(u32::MAX);
    let older_blocks = Sequence::from_height(u16::MAX);
    let older_time = Sequence::from_512_second_intervals(u16::MAX);
    [
        (None, None),
        (Some(max_height), Some(older_blocks)),
        (Some(max_time), Some(older_time)),
        (Some(max_height), Some(older_time)),
        (Some(max_time), Some(older_blocks)),
    ]
}

/// Lowest-weight satisfiable path for `keys` and `hashes`, preferring paths
/// without timelocks on a tie.
fn plan_spend(
    descriptor: &Descriptor<DefiniteDescriptorKey>,
    keys: &[DefiniteDescriptorKey],
    hashes: &[HashAsset],
) -> Option<SpendPlan> {
    let assets = || {
        let mut assets = Assets::new();
        for key in keys {
            assets = assets.add(key.as_descriptor_public_key().clone());
        }
        for hash in hashes {
            assets = match *hash {
                HashAsset::Sha256(h) => assets.add(h),
                HashAsset::Hash256(h) => assets.add(h),
                HashAsset::Ripemd160(h) => assets.add(h),
                HashAsset::Hash160(h) => assets.add(h),
            };
        }
        assets
    };

    timelock_assumptions()
        .into_iter()
        .filter_map(|(after, older)| {
            let mut a = assets();
            if let Some(lock) = after {
                a = a.after(lock);
            }
            if let Some(Ok(lock)) = older.map(bitcoin::relative::LockTime::from_sequence) {
                a = a.older(lock);
            }
            descriptor.clone().plan(&a).ok()
        })
        .map(|plan| SpendPlan::from(&plan))
        .min_by_key(|p| (p.satisfaction_weight, p.has_timelock()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorFactory;
    use crate::keys::MasterNodeRegistry;
    use fundkit_core::{AddressType, Chain, DerivationIndex};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    const G3: &str = "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

    fn ranged(address_type: AddressType, network: NetworkType, chain: Chain) -> String {
        let masters = Arc::new(MasterNodeRegistry::new());
        let fp = masters.derive_master_node(ABANDON, network).unwrap();
        DescriptorFactory::new(masters)
            .build_descriptor(&fp, address_type, network, 0, chain, DerivationIndex::Wildcard)
            .unwrap()
    }

    fn address_at(address_type: AddressType, network: NetworkType, chain: Chain, index: u32) -> String {
        let desc = ranged(address_type, network, chain);
        OutputMaterializer::new()
            .materialize(&desc, network, None, Some(index), &[])
            .unwrap()
            .address()
            .to_string()
    }

    #[test]
    fn bip84_reference_addresses() {
        let net = NetworkType::Bitcoin;
        assert_eq!(
            address_at(AddressType::Wpkh, net, Chain::External, 0),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
        assert_eq!(
            address_at(AddressType::Wpkh, net, Chain::External, 1),
            "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g"
        );
        assert_eq!(
            address_at(AddressType::Wpkh, net, Chain::Change, 0),
            "bc1q8c6fshw2dlwun7ekn9qwf37cu2rn755upcp6el"
        );
    }

    #[test]
    fn bip44_reference_address() {
        assert_eq!(
            address_at(AddressType::Pkh, NetworkType::Bitcoin, Chain::External, 0),
            "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
        );
    }

    #[test]
    fn bip49_reference_address() {
        assert_eq!(
            address_at(AddressType::ShWpkh, NetworkType::Testnet, Chain::External, 0),
            "2Mww8dCYPUpKHofjgcXcBCEGmniw9CoaiD2"
        );
    }

    #[test]
    fn regtest_and_tape_share_encoding() {
        let a = address_at(AddressType::Wpkh, NetworkType::Regtest, Chain::External, 0);
        let b = address_at(AddressType::Wpkh, NetworkType::Tape, Chain::External, 0);
        assert_eq!(a, b);
        assert!(a.starts_with("bcrt1q"), "{a}");
    }

    #[test]
    fn classification_and_segwit_flag() {
        let m = OutputMaterializer::new();
        let net = NetworkType::Regtest;
        let cases = [
            (AddressType::Wpkh, OutputKind::Wpkh, true, true),
            (AddressType::Pkh, OutputKind::Pkh, false, false),
            (AddressType::ShWpkh, OutputKind::ShWpkh, false, true),
        ];
        for (address_type, kind, segwit, witness) in cases {
            let desc = ranged(address_type, net, Chain::External);
            let out = m.materialize(&desc, net, None, Some(3), &[]).unwrap();
            assert_eq!(out.kind(), kind);
            assert_eq!(out.is_segwit(), segwit, "{address_type}");
            assert_eq!(out.has_witness(), witness, "{address_type}");
            assert!(out.plan().is_some());
            assert!(out.descriptor().is_some());
            assert_eq!(out.signers().len(), 1);
        }
    }

    #[test]
    fn wpkh_is_cheaper_to_satisfy_than_pkh() {
        let m = OutputMaterializer::new();
        let net = NetworkType::Regtest;
        let weight = |t| {
            m.materialize(&ranged(t, net, Chain::External), net, None, Some(0), &[])
                .unwrap()
                .satisfaction_weight()
                .unwrap()
        };
        assert!(weight(AddressType::Wpkh) < weight(AddressType::Pkh));
    }

    #[test]
    fn ranged_requires_index() {
        let desc = ranged(AddressType::Wpkh, NetworkType::Regtest, Chain::External);
        let err = OutputMaterializer::new()
            .materialize(&desc, NetworkType::Regtest, None, None, &[])
            .unwrap_err();
        assert_eq!(err, WalletError::MissingIndex(desc));
    }

    #[test]
    fn single_rejects_index() {
        let desc = format!("wpkh({G})");
        let err = OutputMaterializer::new()
            .materialize(&desc, NetworkType::Regtest, None, Some(4), &[])
            .unwrap_err();
        assert_eq!(err, WalletError::UnexpectedIndex { descriptor: desc, index: 4 });
    }

    #[test]
    fn addr_destination() {
        let m = OutputMaterializer::new();
        let out = m
            .materialize("addr(bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu)", NetworkType::Bitcoin, None, None, &[])
            .unwrap();
        assert_eq!(out.kind(), OutputKind::Wpkh);
        assert!(out.descriptor().is_none());
        assert!(out.plan().is_none());

        let legacy = m
            .materialize("addr(1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA)", NetworkType::Bitcoin, None, None, &[])
            .unwrap();
        assert_eq!(legacy.kind(), OutputKind::Pkh);
        assert!(!legacy.is_segwit());
    }

    #[test]
    fn addr_on_wrong_network() {
        let err = OutputMaterializer::new()
            .materialize("addr(bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu)", NetworkType::Regtest, None, None, &[])
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidDescriptor { .. }));
    }

    #[test]
    fn addr_rejects_index() {
        let err = OutputMaterializer::new()
            .materialize("addr(bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu)", NetworkType::Bitcoin, None, Some(0), &[])
            .unwrap_err();
        assert!(matches!(err, WalletError::UnexpectedIndex { index: 0, .. }));
    }

    #[test]
    fn garbage_descriptor() {
        let err = OutputMaterializer::new()
            .materialize("wpkh(nope)", NetworkType::Regtest, None, None, &[])
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidDescriptor { .. }));
    }

    #[test]
    fn cached_by_request_and_address() {
        let m = OutputMaterializer::new();
        let desc = ranged(AddressType::Wpkh, NetworkType::Bitcoin, Chain::External);
        let first = m.materialize(&desc, NetworkType::Bitcoin, None, Some(0), &[]).unwrap();
        let second = m.materialize(&desc, NetworkType::Bitcoin, None, Some(0), &[]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let by_addr = m.get("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").unwrap();
        assert!(Arc::ptr_eq(&first, &by_addr));
        assert_eq!(m.len(), 1);

        let other = m.materialize(&desc, NetworkType::Bitcoin, None, Some(1), &[]).unwrap();
        assert_ne!(other.address(), first.address());
        assert_eq!(m.len(), 2);
    }

    fn timelocked_policy() -> String {
        format!("wsh(or_d(pk({G}),and_v(v:pk({G2}),older(144))))")
    }

    #[test]
    fn all_keys_assumed_picks_cheapest_path() {
        let out = OutputMaterializer::new()
            .materialize(&timelocked_policy(), NetworkType::Regtest, None, None, &[])
            .unwrap();
        let plan = out.plan().unwrap();
        assert_eq!(plan.relative_timelock, None);
        assert_eq!(out.kind(), OutputKind::Wsh);
        assert!(out.is_segwit());
    }

    #[test]
    fn signers_narrow_the_path() {
        let signers = vec![G2.to_string()];
        let out = OutputMaterializer::new()
            .materialize(&timelocked_policy(), NetworkType::Regtest, Some(&signers), None, &[])
            .unwrap();
        let plan = out.plan().unwrap();
        assert_eq!(plan.relative_timelock, Some(Sequence::from_height(144)));
        assert_eq!(out.signers().len(), 1);
        assert_eq!(out.signers()[0].to_string(), G2);
    }

    #[test]
    fn foreign_signer_is_unsatisfiable() {
        let signers = vec![G3.to_string()];
        let err = OutputMaterializer::new()
            .materialize(&timelocked_policy(), NetworkType::Regtest, Some(&signers), None, &[])
            .unwrap_err();
        assert_eq!(err, WalletError::Unsatisfiable(timelocked_policy()));
    }

    fn hashlock() -> (String, Preimage) {
        let secret = [7u8; 32];
        let digest = sha256::Hash::hash(&secret);
        let desc = format!("wsh(and_v(v:pk({G}),sha256({digest})))");
        let preimage = Preimage {
            digest: format!("sha256({digest})"),
            preimage: hex::encode(secret),
        };
        (desc, preimage)
    }

    #[test]
    fn preimage_enables_hash_branch() {
        let (desc, preimage) = hashlock();
        let m = OutputMaterializer::new();
        let with = m
            .materialize(&desc, NetworkType::Regtest, None, None, std::slice::from_ref(&preimage))
            .unwrap();
        assert!(with.plan().is_some());
        assert_eq!(with.preimages(), &[preimage]);

        let without = m.materialize(&desc, NetworkType::Regtest, None, None, &[]).unwrap();
        assert!(without.plan().is_none());
    }

    #[test]
    fn mismatched_preimage_rejected() {
        let (desc, mut preimage) = hashlock();
        preimage.preimage = hex::encode([8u8; 32]);
        let err = OutputMaterializer::new()
            .materialize(&desc, NetworkType::Regtest, None, None, &[preimage])
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidPreimage { .. }));
    }

    #[test]
    fn preimage_shape_checks() {
        let short = Preimage {
            digest: format!("sha256({})", "00".repeat(32)),
            preimage: "00".repeat(16),
        };
        assert!(matches!(short.validate(), Err(WalletError::InvalidPreimage { .. })));

        let wrong_len = Preimage {
            digest: format!("hash160({})", "00".repeat(32)),
            preimage: "00".repeat(32),
        };
        let err = wrong_len.validate().unwrap_err();
        assert!(err.to_string().contains("20 bytes"), "{err}");

        let unknown = Preimage {
            digest: format!("sha512({})", "00".repeat(32)),
            preimage: "00".repeat(32),
        };
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn every_hash_function_validates() {
        let secret = [1u8; 32];
        let cases = [
            format!("sha256({})", sha256::Hash::hash(&secret)),
            format!("hash256({})", hex::encode(sha256d::Hash::hash(&secret).to_byte_array())),
            format!("ripemd160({})", ripemd160::Hash::hash(&secret)),
            format!("hash160({})", hash160::Hash::hash(&secret)),
        ];
        for digest in cases {
            let p = Preimage { digest: digest.clone(), preimage: hex::encode(secret) };
            assert!(p.validate().is_ok(), "{digest}");
        }
    }
}
