//! Client for the bridge's HTTP API: order status and fee estimates.

use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use async_trait::async_trait;
use reqwest::{
    RequestBuilder, StatusCode,
    header::{HeaderMap, HeaderValue, ORIGIN, REFERER},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    chains::ChainConfig,
    error::{BRIDGE_BUSY_CODE, BridgeError},
    inputs::client_builder,
};

/// Origin the public bridge UI sends; the API expects it.
const UI_ORIGIN: &str = "https://unlock3d.t3rn.io";

/// Longest body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Where an order stands, as far as the bridge API knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Pending,
    Executed { destination_tx: Option<TxHash> },
    /// Unrecognised status that names a destination transaction; its receipt decides.
    Unverified { destination_tx: TxHash },
    FailedWithReason(String),
}

impl BridgeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::FailedWithReason(_))
    }
}

/// Order lifecycle statuses reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Placed,
    Pending,
    Bid,
    Executed,
    Attested,
    Claimed,
    ClaimedInsurance,
    Expired,
    PendingRefund,
    AttestedRefund,
    ClaimedRefund,
    Failed,
    Unknown(String),
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s {
            "Placed" => Self::Placed,
            "Pending" => Self::Pending,
            "Bid" => Self::Bid,
            "Executed" => Self::Executed,
            "Attested" => Self::Attested,
            "Claimed" => Self::Claimed,
            "ClaimedInsurance" => Self::ClaimedInsurance,
            "Expired" => Self::Expired,
            "Pending Refund" => Self::PendingRefund,
            "Attested Refund" => Self::AttestedRefund,
            "Claimed Refund" => Self::ClaimedRefund,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Body of `GET /order/{hash}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub status: String,
    #[serde(default)]
    pub execution_tx_hash: Option<String>,
    #[serde(default)]
    pub confirmation_tx_hash: Option<String>,
}

impl OrderResponse {
    fn destination_tx(&self) -> Option<TxHash> {
        self.confirmation_tx_hash
            .as_deref()
            .or(self.execution_tx_hash.as_deref())
            .and_then(|hash| hash.parse().ok())
    }

    /// Folds the API status into a [`BridgeState`].
    pub fn state(&self) -> BridgeState {
        match OrderStatus::from(self.status.as_str()) {
            OrderStatus::Placed | OrderStatus::Pending | OrderStatus::Bid => BridgeState::Pending,
            OrderStatus::Executed
            | OrderStatus::Attested
            | OrderStatus::Claimed
            | OrderStatus::ClaimedInsurance => BridgeState::Executed {
                destination_tx: self.destination_tx(),
            },
            // expired orders may still have been filled; otherwise the refund window is open
            OrderStatus::Expired => match self.execution_tx_hash.as_deref() {
                Some(hash) if !hash.is_empty() => BridgeState::Executed {
                    destination_tx: self.destination_tx(),
                },
                _ => BridgeState::Pending,
            },
            OrderStatus::PendingRefund
            | OrderStatus::AttestedRefund
            | OrderStatus::ClaimedRefund
            | OrderStatus::Failed => BridgeState::FailedWithReason(self.status.clone()),
            OrderStatus::Unknown(status) => match self.destination_tx() {
                Some(destination_tx) => {
                    warn!(%status, %destination_tx, "unknown order status, checking destination");
                    BridgeState::Unverified { destination_tx }
                }
                None => {
                    warn!(%status, "unknown order status, treating as pending");
                    BridgeState::Pending
                }
            },
        }
    }
}

/// Amounts the bridge expects for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub receive_amount: U256,
    pub max_reward: U256,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest<'a> {
    from_asset: &'a str,
    to_asset: &'a str,
    from_chain: &'a str,
    to_chain: &'a str,
    amount_wei: String,
    #[serde(rename = "executorTipUSD")]
    executor_tip_usd: u64,
    overpay_option_percentage: u64,
    spread_option_percentage: u64,
}

#[derive(Debug, Deserialize)]
struct HexAmount {
    hex: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    #[serde(default)]
    estimated_received_amount_wei: Option<HexAmount>,
    #[serde(default)]
    max_reward: Option<HexAmount>,
}

fn parse_hex_amount(amount: Option<&HexAmount>) -> Option<U256> {
    amount.and_then(|a| a.hex.parse().ok())
}

/// Bridge API operations used by the orchestrator.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// One status lookup for the order placed by `source_tx`. Never loops.
    async fn poll_status(
        &self,
        source_tx: TxHash,
        from_code: &str,
        to_code: &str,
    ) -> Result<BridgeState, BridgeError>;

    /// Receive amount and reward cap for bridging `amount` wei.
    async fn estimate(
        &self,
        from: &ChainConfig,
        to: &ChainConfig,
        amount: U256,
    ) -> Result<Estimate, BridgeError>;
}

/// [`BridgeApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct BridgeStatusClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl BridgeStatusClient {
    pub fn new(base_url: Url, timeout: Duration, proxy: Option<&Url>) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(UI_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static("https://unlock3d.t3rn.io/"));

        let client = client_builder(proxy)?
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Sends `request`, returning status and body. Transport failures and
    /// saturation replies become errors here.
    async fn fetch(&self, request: RequestBuilder) -> Result<(StatusCode, String), BridgeError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if body.contains(BRIDGE_BUSY_CODE) {
            return Err(BridgeError::RetryableBridgeBusy(excerpt(&body)));
        }
        Ok((status, body))
    }

    fn transport_error(&self, err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::BridgeApiTimeout(self.timeout)
        } else {
            BridgeError::BridgeApi {
                message: err.to_string(),
                permanent: false,
            }
        }
    }
}

/// Maps a non-success HTTP status to an error. Rate limiting and server
/// errors are worth retrying; other client errors are not.
fn status_error(status: StatusCode, body: &str) -> BridgeError {
    let permanent = status.is_client_error()
        && status != StatusCode::TOO_MANY_REQUESTS
        && status != StatusCode::REQUEST_TIMEOUT;
    BridgeError::BridgeApi {
        message: format!("{status}: {}", excerpt(body)),
        permanent,
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, BridgeError> {
    serde_json::from_str(body).map_err(|e| BridgeError::BridgeApi {
        message: format!("unparseable response: {e}"),
        permanent: false,
    })
}

#[async_trait]
impl BridgeApi for BridgeStatusClient {
    async fn poll_status(
        &self,
        source_tx: TxHash,
        from_code: &str,
        to_code: &str,
    ) -> Result<BridgeState, BridgeError> {
        let request = self
            .client
            .get(self.endpoint(&format!("order/{source_tx}")))
            .query(&[("fromChain", from_code), ("toChain", to_code)]);
        let (status, body) = self.fetch(request).await?;

        if status == StatusCode::NOT_FOUND {
            debug!(tx_hash = %source_tx, "order not indexed yet");
            return Ok(BridgeState::Pending);
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let order: OrderResponse = decode(&body)?;
        debug!(tx_hash = %source_tx, status = %order.status, "order status");
        Ok(order.state())
    }

    async fn estimate(
        &self,
        from: &ChainConfig,
        to: &ChainConfig,
        amount: U256,
    ) -> Result<Estimate, BridgeError> {
        let payload = EstimateRequest {
            from_asset: &from.native_asset,
            to_asset: &to.native_asset,
            from_chain: &from.api_code,
            to_chain: &to.api_code,
            amount_wei: amount.to_string(),
            executor_tip_usd: 0,
            overpay_option_percentage: 0,
            spread_option_percentage: 0,
        };
        let request = self.client.post(self.endpoint("estimate")).json(&payload);
        let (status, body) = self.fetch(request).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let estimate: EstimateResponse = decode(&body)?;
        Ok(Estimate {
            receive_amount: parse_hex_amount(estimate.estimated_received_amount_wei.as_ref())
                .unwrap_or(amount),
            max_reward: parse_hex_amount(estimate.max_reward.as_ref()).unwrap_or(amount),
        })
    }
}
