//! Funding through the Esplora collaborators against a local axum server
//! that speaks the Esplora address, raw-transaction and Tape faucet routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bitcoin::consensus::encode::serialize;
use bitcoin::Txid;
use fundkit_core::{AddressType, FeeRate, NetworkType};
use fundkit_esplora::{EsploraClient, EsploraConfig, EsploraDiscovery, TapeFaucet};
use fundkit_tests::helpers::*;
use fundkit_wallet::wallet::WalletSource;
use fundkit_wallet::{Operation, OperationOutput, Toolkit, WalletError};
use parking_lot::RwLock;
use serde_json::{json, Value};

const NET: NetworkType = NetworkType::Regtest;

/// Chain state served over HTTP. An address with an entry in `history`
/// counts as used.
#[derive(Default)]
struct Backend {
    history: HashMap<String, Vec<(Txid, u32, u64)>>,
    raw: HashMap<Txid, Vec<u8>>,
    faucet: Vec<String>,
    requests: usize,
}

type Shared = Arc<RwLock<Backend>>;

async fn address_stats(State(backend): State<Shared>, Path(address): Path<String>) -> Json<Value> {
    let mut backend = backend.write();
    backend.requests += 1;
    let tx_count = backend.history.get(&address).map_or(0, |h| h.len().max(1));
    Json(json!({
        "address": address,
        "chain_stats": {"tx_count": tx_count},
        "mempool_stats": {"tx_count": 0},
    }))
}

async fn address_utxos(State(backend): State<Shared>, Path(address): Path<String>) -> Json<Value> {
    let mut backend = backend.write();
    backend.requests += 1;
    let utxos: Vec<Value> = backend
        .history
        .get(&address)
        .into_iter()
        .flatten()
        .map(|(txid, vout, value)| {
            json!({"txid": txid.to_string(), "vout": vout, "value": value, "status": {"confirmed": true}})
        })
        .collect();
    Json(Value::Array(utxos))
}

async fn raw_tx(State(backend): State<Shared>, Path(txid): Path<String>) -> Result<Vec<u8>, StatusCode> {
    let mut backend = backend.write();
    backend.requests += 1;
    let txid: Txid = txid.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    backend.raw.get(&txid).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn faucet(State(backend): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let address = body["address"].as_str().unwrap_or_default().to_string();
    if !address.starts_with("bcrt1") {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "not a tape address"})));
    }
    backend.write().faucet.push(address);
    (StatusCode::OK, Json(json!({"txId": "11".repeat(32)})))
}

/// Local Esplora stand-in; returns its base URL.
async fn serve(backend: Shared) -> String {
    let router = Router::new()
        .route("/address/:address", get(address_stats))
        .route("/address/:address/utxo", get(address_utxos))
        .route("/tx/:txid/raw", get(raw_tx))
        .route("/faucet", post(faucet))
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

type EsploraToolkit = Toolkit<EsploraDiscovery<EsploraClient>, EsploraClient>;

fn esplora_toolkit(url: &str, network: NetworkType) -> EsploraToolkit {
    let config = EsploraConfig {
        timeout: Duration::from_secs(5),
        ..EsploraConfig::for_network(network)
    }
    .with_url(url);
    let client = EsploraClient::new(config).unwrap();
    let discovery = EsploraDiscovery::new(client.clone(), network).with_gap_limit(3);
    Toolkit::new(discovery, client)
}

/// Pay `value` to child `index` of `descriptor` on the mock chain.
fn fund(backend: &Shared, kit: &EsploraToolkit, descriptor: &str, index: u32, value: u64) -> Txid {
    let output = kit
        .outputs()
        .materialize(descriptor, NET, None, Some(index), &[])
        .unwrap();
    let mut backend = backend.write();
    let tx = funding_tx(backend.raw.len() as u32, output.script_pubkey(), value);
    let txid = tx.compute_txid();
    backend.raw.insert(txid, serialize(&tx));
    backend
        .history
        .entry(output.address().to_string())
        .or_default()
        .push((txid, 0, value));
    txid
}

#[tokio::test]
async fn esplora_toolkit_funds_mixed_wallet() {
    let backend = Shared::default();
    let url = serve(Arc::clone(&backend)).await;
    let kit = esplora_toolkit(&url, NET);
    let info = kit
        .wallets()
        .create_wallet(
            WalletSource::Mnemonic(ABANDON.into()),
            NET,
            Some(&[AddressType::Wpkh, AddressType::Pkh]),
        )
        .unwrap();
    // wpkh, wpkh-change, pkh, pkh-change
    fund(&backend, &kit, &info.descriptors[0], 0, 20_000);
    let legacy = fund(&backend, &kit, &info.descriptors[2], 1, 30_000);
    // a spent change output: history but nothing left to spend
    let spent_change = kit
        .outputs()
        .materialize(&info.descriptors[1], NET, None, Some(0), &[])
        .unwrap();
    backend
        .write()
        .history
        .insert(spent_change.address().to_string(), Vec::new());

    let to = foreign_address(&kit, NET, AddressType::Wpkh, 0);
    let unsigned = kit
        .create_unsigned_tx(info.wallet_id, &to, 40_000, FeeRate::DEFAULT)
        .await
        .unwrap();
    let psbt = unsigned.psbt();

    assert_eq!(psbt.inputs.len(), 2);
    let prev = psbt
        .inputs
        .iter()
        .find_map(|i| i.non_witness_utxo.as_ref())
        .expect("pkh input carries its previous transaction");
    assert_eq!(prev.compute_txid(), legacy);

    let fresh_change = kit
        .outputs()
        .materialize(&info.descriptors[1], NET, None, Some(1), &[])
        .unwrap();
    assert!(
        psbt.unsigned_tx
            .output
            .iter()
            .any(|o| o.script_pubkey == *fresh_change.script_pubkey())
    );
    let total_out: u64 = psbt.unsigned_tx.output.iter().map(|o| o.value.to_sat()).sum();
    assert_eq!(50_000, total_out + unsigned.fee());
}

#[tokio::test]
async fn esplora_for_another_network_is_never_queried() {
    let backend = Shared::default();
    let url = serve(Arc::clone(&backend)).await;
    let kit = esplora_toolkit(&url, NetworkType::Tape);
    let info = kit
        .wallets()
        .create_wallet(WalletSource::Mnemonic(ABANDON.into()), NetworkType::Bitcoin, None)
        .unwrap();

    let err = kit
        .create_unsigned_tx(
            info.wallet_id,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
            10_000,
            FeeRate::DEFAULT,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WalletError::NetworkMismatch {
            wallet: NetworkType::Bitcoin,
            collaborator: NetworkType::Tape,
        }
    );
    assert_eq!(backend.read().requests, 0);
}

#[tokio::test]
async fn faucet_tape_operation_reaches_the_faucet() {
    let backend = Shared::default();
    let url = serve(Arc::clone(&backend)).await;
    let faucet = TapeFaucet::new(NetworkType::Tape, Duration::from_secs(5))
        .unwrap()
        .with_url(format!("{url}/faucet"));
    let kit = esplora_toolkit(&url, NetworkType::Tape).with_faucet(faucet);
    let info = kit
        .wallets()
        .create_wallet(WalletSource::Mnemonic(ABANDON.into()), NetworkType::Tape, Some(&[AddressType::Wpkh]))
        .unwrap();
    let receive = kit
        .outputs()
        .materialize(&info.descriptors[0], NetworkType::Tape, None, Some(0), &[])
        .unwrap()
        .address()
        .to_string();

    let out = kit
        .execute(Operation::FaucetTape { address: receive.clone() })
        .await
        .unwrap();
    let OperationOutput::FaucetTape { address, response } = out else {
        panic!("expected a faucet reply");
    };
    assert_eq!(address, receive);
    let reply: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(reply["txId"], "11".repeat(32));
    assert_eq!(backend.read().faucet, vec![receive]);
}
