//! Exercises [`BridgeStatusClient`] against a local mock of the bridge API.

use std::{collections::HashMap, time::Duration};

use alloy::primitives::{Address, TxHash, U256};
use axum::{
    Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hopper_bridge::{
    BridgeApi, BridgeError, BridgeState, BridgeStatusClient, ChainConfig,
    error::RetryClass,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

const DESTINATION_TX: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

async fn order(
    Path(hash): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let from_ui = headers
        .get("origin")
        .is_some_and(|v| v == "https://unlock3d.t3rn.io");
    if !from_ui || query.get("fromChain").map(String::as_str) != Some("bast") {
        return (StatusCode::FORBIDDEN, "bad origin or route").into_response();
    }

    match &hash[hash.len() - 2..] {
        "01" => (StatusCode::NOT_FOUND, "order not found").into_response(),
        "02" => Json(json!({
            "id": hash,
            "status": "Claimed",
            "confirmationTxHash": DESTINATION_TX,
        }))
        .into_response(),
        "03" => (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response(),
        "04" => (StatusCode::BAD_REQUEST, "malformed hash").into_response(),
        "05" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "execution reverted", "errorCode": "RO#7" })),
        )
            .into_response(),
        "06" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "status": "Pending" })).into_response()
        }
        "07" => "<html>maintenance</html>".into_response(),
        "08" => Json(json!({ "status": "Claimed Refund" })).into_response(),
        _ => Json(json!({ "status": "Bid" })).into_response(),
    }
}

async fn estimate(Json(body): Json<Value>) -> Response {
    if body["fromAsset"] != "eth"
        || body["toChain"] != "opst"
        || body["amountWei"] != "110000000000000000"
        || body["executorTipUSD"] != 0
    {
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    Json(json!({
        "estimatedReceivedAmountWei": { "hex": "0x0184cfb5f3c2e000", "type": "BigNumber" },
        "maxReward": { "hex": "0x01876a49fd5c0000", "type": "BigNumber" },
    }))
    .into_response()
}

async fn spawn_api() -> Url {
    let app = Router::new()
        .route("/order/{hash}", get(order))
        .route("/estimate", post(estimate));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/").parse().unwrap()
}

async fn client() -> BridgeStatusClient {
    BridgeStatusClient::new(spawn_api().await, Duration::from_millis(500), None).unwrap()
}

fn chain(name: &str, code: &str) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        chain_id: 1,
        rpc_url: "http://127.0.0.1:8545".parse().unwrap(),
        bridge_contract: Address::repeat_byte(1),
        api_code: code.to_string(),
        native_asset: "eth".to_string(),
    }
}

async fn poll(client: &BridgeStatusClient, last_byte: u8) -> Result<BridgeState, BridgeError> {
    client
        .poll_status(TxHash::with_last_byte(last_byte), "bast", "opst")
        .await
}

#[tokio::test]
async fn unindexed_order_is_pending() {
    let client = client().await;
    assert_eq!(poll(&client, 0x01).await.unwrap(), BridgeState::Pending);
    assert_eq!(poll(&client, 0x09).await.unwrap(), BridgeState::Pending);
}

#[tokio::test]
async fn claimed_order_reports_destination_tx() {
    let client = client().await;
    assert_eq!(
        poll(&client, 0x02).await.unwrap(),
        BridgeState::Executed {
            destination_tx: Some(DESTINATION_TX.parse().unwrap())
        }
    );
}

#[tokio::test]
async fn refund_is_a_failure_with_reason() {
    let client = client().await;
    assert_eq!(
        poll(&client, 0x08).await.unwrap(),
        BridgeState::FailedWithReason("Claimed Refund".into())
    );
}

#[tokio::test]
async fn http_errors_are_classified() {
    let client = client().await;

    let unavailable = poll(&client, 0x03).await.unwrap_err();
    assert_eq!(unavailable.retry_class(), RetryClass::Transient);

    let bad_request = poll(&client, 0x04).await.unwrap_err();
    assert!(matches!(
        bad_request,
        BridgeError::BridgeApi {
            permanent: true,
            ..
        }
    ));

    let busy = poll(&client, 0x05).await.unwrap_err();
    assert_eq!(busy.retry_class(), RetryClass::Busy);

    let garbage = poll(&client, 0x07).await.unwrap_err();
    assert_eq!(garbage.retry_class(), RetryClass::Transient);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let client = client().await;
    assert!(matches!(
        poll(&client, 0x06).await,
        Err(BridgeError::BridgeApiTimeout(_))
    ));
}

#[tokio::test]
async fn estimate_reads_hex_amounts() {
    let client = client().await;
    let amount = U256::from(110_000_000_000_000_000u128);
    let estimate = client
        .estimate(&chain("base_sepolia", "bast"), &chain("optimism_sepolia", "opst"), amount)
        .await
        .unwrap();

    assert_eq!(estimate.receive_amount, U256::from(0x0184cfb5f3c2e000u128));
    assert_eq!(estimate.max_reward, U256::from(0x01876a49fd5c0000u128));
}

#[tokio::test]
async fn rejected_estimate_is_permanent() {
    let client = client().await;
    let err = client
        .estimate(
            &chain("base_sepolia", "bast"),
            &chain("optimism_sepolia", "opst"),
            U256::from(1u64),
        )
        .await
        .unwrap_err();
    assert_eq!(err.retry_class(), RetryClass::Fatal);
}
