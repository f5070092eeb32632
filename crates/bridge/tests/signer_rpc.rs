//! Exercises [`TransactionSigner`] against a local JSON-RPC node mock.

use std::{str::FromStr, sync::Arc};

use alloy::{
    consensus::{Transaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, Bytes, U256, address, keccak256},
    signers::local::PrivateKeySigner,
};
use axum::{Json, Router, extract::State, routing::post};
use hopper_bridge::{
    BridgeError, ChainConfig, ChainRegistry, HopSubmitter, TransactionSigner, WalletCredential,
    error::RetryClass,
    signer::{ORDER_SELECTOR, OrderRequest, SignedOrder},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const BRIDGE_CONTRACT: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
const TEN_ETH: &str = "0x8ac7230489e80000";

/// Scripted node answers plus a log of every request.
struct Node {
    balance: &'static str,
    estimate_error: Option<&'static str>,
    send_error: Option<&'static str>,
    mined: bool,
    requests: Mutex<Vec<(String, Value)>>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            balance: TEN_ETH,
            estimate_error: None,
            send_error: None,
            mined: false,
            requests: Mutex::default(),
        }
    }
}

impl Node {
    fn methods(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    fn params(&self, method: &str) -> Option<Value> {
        self.requests
            .lock()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
    }
}

fn receipt(hash: &str) -> Value {
    json!({
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": format!("0x{}", "11".repeat(32)),
        "blockNumber": "0x10",
        "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        "to": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "contractAddress": null,
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "type": "0x0",
        "status": "0x1",
        "effectiveGasPrice": "0x3b9aca00"
    })
}

async fn rpc(State(node): State<Arc<Node>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();
    node.requests.lock().push((method.clone(), params.clone()));

    let outcome: Result<Value, &str> = match method.as_str() {
        "eth_gasPrice" => Ok(json!("0x3b9aca00")),
        "eth_estimateGas" => node.estimate_error.map_or(Ok(json!("0x5208")), Err),
        "eth_getBalance" => Ok(json!(node.balance)),
        "eth_getTransactionCount" => Ok(json!("0x7")),
        "eth_sendRawTransaction" => match node.send_error {
            Some(message) => Err(message),
            None => {
                let raw = Bytes::from_str(params[0].as_str().unwrap_or_default()).unwrap();
                Ok(json!(keccak256(&raw).to_string()))
            }
        },
        "eth_getTransactionByHash" => Ok(Value::Null),
        "eth_getTransactionReceipt" if node.mined => {
            Ok(receipt(params[0].as_str().unwrap_or_default()))
        }
        "eth_getTransactionReceipt" => Ok(Value::Null),
        _ => Err("method not found"),
    };

    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32000, "message": message }
        }),
    })
}

async fn spawn_node(node: Node) -> (Arc<Node>, Url) {
    let node = Arc::new(node);
    let app = Router::new().route("/", post(rpc)).with_state(Arc::clone(&node));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (node, format!("http://{addr}/").parse().unwrap())
}

fn chain(name: &str, code: &str, chain_id: u64, rpc_url: &Url) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        chain_id,
        rpc_url: rpc_url.clone(),
        bridge_contract: BRIDGE_CONTRACT,
        api_code: code.to_string(),
        native_asset: "eth".to_string(),
    }
}

async fn signer(node: Node) -> (Arc<Node>, TransactionSigner) {
    let (node, url) = spawn_node(node).await;
    let registry = ChainRegistry::new([
        chain("base_sepolia", "bast", 84532, &url),
        chain("optimism_sepolia", "opst", 11155420, &url),
    ]);
    let credential = WalletCredential::new(KEY.parse::<PrivateKeySigner>().unwrap());
    let signer = TransactionSigner::new(credential, &registry, None, 1.5).unwrap();
    (node, signer)
}

fn order() -> OrderRequest {
    // 0.1 native
    OrderRequest::without_estimate(
        "base_sepolia",
        "optimism_sepolia",
        U256::from(100_000_000_000_000_000u128),
    )
}

async fn signed(signer: &TransactionSigner) -> SignedOrder {
    signer.sign_order(&order()).await.unwrap()
}

#[tokio::test]
async fn signed_order_uses_scaled_price_buffered_gas_and_pending_nonce() {
    let (node, signer) = signer(Node::default()).await;
    let signed = signed(&signer).await;

    assert_eq!(signed.nonce, 7);
    assert_eq!(signed.hash, keccak256(&signed.raw));

    let tx = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
    assert_eq!(tx.gas_price(), Some(1_500_000_000));
    assert_eq!(tx.gas_limit(), 23_100);
    assert_eq!(tx.nonce(), 7);
    assert_eq!(tx.chain_id(), Some(84532));
    assert_eq!(tx.to(), Some(BRIDGE_CONTRACT));
    assert_eq!(tx.value(), order().amount);
    assert_eq!(tx.input()[..4], ORDER_SELECTOR);
    assert_eq!(&tx.input()[4..8], b"opst");

    let nonce_params = node.params("eth_getTransactionCount").unwrap();
    assert_eq!(nonce_params[1], "pending");

    let methods = node.methods();
    let position = |m: &str| methods.iter().position(|x| x == m).unwrap();
    assert!(position("eth_getBalance") < position("eth_getTransactionCount"));
    assert!(!methods.contains(&"eth_sendRawTransaction".to_string()));
}

#[tokio::test]
async fn balance_short_of_value_plus_gas_stops_before_signing() {
    // exactly the order value, nothing left for gas
    let (node, signer) = signer(Node {
        balance: "0x16345785d8a0000",
        ..Node::default()
    })
    .await;

    let err = signer.sign_order(&order()).await.unwrap_err();
    match err {
        BridgeError::InsufficientBalance {
            available,
            required,
            ..
        } => {
            assert_eq!(available, order().amount);
            assert_eq!(
                required,
                order().amount + U256::from(23_100u64 * 1_500_000_000u64)
            );
        }
        other => panic!("expected insufficient balance, got {other}"),
    }
    assert!(!node.methods().contains(&"eth_getTransactionCount".to_string()));
}

#[tokio::test]
async fn saturated_bridge_revert_is_busy() {
    let (_node, signer) = signer(Node {
        estimate_error: Some("execution reverted: RO#7"),
        ..Node::default()
    })
    .await;

    let err = signer.sign_order(&order()).await.unwrap_err();
    assert!(matches!(err, BridgeError::RetryableBridgeBusy(_)), "{err}");
    assert_eq!(err.retry_class(), RetryClass::Busy);
}

#[tokio::test]
async fn other_reverts_are_rejected() {
    let (_node, signer) = signer(Node {
        estimate_error: Some("execution reverted: paused"),
        ..Node::default()
    })
    .await;

    let err = signer.sign_order(&order()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Rejected { .. }), "{err}");
}

#[tokio::test]
async fn broadcast_returns_node_hash() {
    let (_node, signer) = signer(Node::default()).await;
    let signed = signed(&signer).await;
    assert_eq!(signer.broadcast(&signed).await.unwrap(), signed.hash);
}

#[tokio::test]
async fn already_known_bytes_count_as_accepted() {
    let (_node, signer) = signer(Node {
        send_error: Some("already known"),
        ..Node::default()
    })
    .await;
    let signed = signed(&signer).await;
    assert_eq!(signer.broadcast(&signed).await.unwrap(), signed.hash);
}

#[tokio::test]
async fn nonce_taken_by_another_transaction_is_rejected() {
    let (node, signer) = signer(Node {
        send_error: Some("nonce too low: next nonce 8, tx nonce 7"),
        ..Node::default()
    })
    .await;
    let signed = signed(&signer).await;

    let err = signer.broadcast(&signed).await.unwrap_err();
    assert!(matches!(err, BridgeError::Rejected { .. }), "{err}");
    assert_eq!(err.retry_class(), RetryClass::Fatal);
    assert_eq!(
        node.params("eth_getTransactionByHash").unwrap()[0],
        signed.hash.to_string()
    );
}

#[tokio::test]
async fn destination_receipt_status() {
    let tx = keccak256(b"destination");

    let (_node, pending) = signer(Node::default()).await;
    assert!(!pending.transaction_succeeded("optimism_sepolia", tx).await.unwrap());

    let (_node, mined) = signer(Node {
        mined: true,
        ..Node::default()
    })
    .await;
    assert!(mined.transaction_succeeded("optimism_sepolia", tx).await.unwrap());
}
