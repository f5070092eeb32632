//! Builds, signs and broadcasts bridge orders on the source chain.

use std::time::Duration;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, FixedBytes, TxHash, U256},
    providers::{Provider, RootProvider},
    rpc::{client::RpcClient, types::TransactionRequest},
    sol_types::SolValue,
    transports::http::Http,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};
use url::Url;

use crate::{
    chains::{ChainConfig, ChainRegistry},
    error::BridgeError,
    inputs::{WalletCredential, client_builder},
};

/// Selector of the bridge contract's `order` entry point.
pub const ORDER_SELECTOR: [u8; 4] = [0x56, 0x59, 0x1d, 0x59];

/// Headroom added on top of the node's gas estimate, in percent.
const GAS_LIMIT_BUFFER_PERCENT: u64 = 10;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one bridge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub from_chain: String,
    pub to_chain: String,
    /// Native value sent with the transaction.
    pub amount: U256,
    /// Amount the destination should release, usually from the bridge's estimate.
    pub receive_amount: U256,
    pub max_reward: U256,
}

impl OrderRequest {
    /// An order that asks for the sent amount back, capped at the same reward.
    pub fn without_estimate(from_chain: &str, to_chain: &str, amount: U256) -> Self {
        Self {
            from_chain: from_chain.to_string(),
            to_chain: to_chain.to_string(),
            amount,
            receive_amount: amount,
            max_reward: amount,
        }
    }
}

/// A signed order ready for (re-)broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOrder {
    pub chain: String,
    pub raw: Bytes,
    pub hash: TxHash,
    pub nonce: u64,
}

/// ABI call data for `order(bytes4,uint32,bytes32,uint256,address,uint256,uint256)`.
///
/// The target is the wallet itself and the reward is paid in the native asset.
pub fn encode_order_calldata(
    destination: [u8; 4],
    target: Address,
    receive_amount: U256,
    max_reward: U256,
) -> Bytes {
    let params = (
        FixedBytes::<4>::from(destination),
        0u32,
        target.into_word(),
        receive_amount,
        Address::ZERO,
        U256::ZERO,
        max_reward,
    )
        .abi_encode_params();

    let mut data = Vec::with_capacity(ORDER_SELECTOR.len() + params.len());
    data.extend_from_slice(&ORDER_SELECTOR);
    data.extend_from_slice(&params);
    data.into()
}

/// Everything a wallet does against chain RPCs.
#[async_trait]
pub trait HopSubmitter: Send + Sync {
    fn address(&self) -> Address;

    /// Native balance of the wallet on `chain`.
    async fn balance(&self, chain: &str) -> Result<U256, BridgeError>;

    /// Prices, checks funding and signs the order. Nothing is sent.
    async fn sign_order(&self, order: &OrderRequest) -> Result<SignedOrder, BridgeError>;

    /// Sends signed bytes and returns once the node accepted them into its pool.
    async fn broadcast(&self, signed: &SignedOrder) -> Result<TxHash, BridgeError>;

    /// Whether `tx` was mined successfully on `chain`. `false` while it is unknown.
    async fn transaction_succeeded(&self, chain: &str, tx: TxHash) -> Result<bool, BridgeError>;
}

/// How a node's refusal of raw transaction bytes relates to an earlier send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BroadcastRefusal {
    /// The pool already holds these exact bytes.
    AlreadyKnown,
    /// The nonce is spent, by these bytes or by another transaction.
    NonceUsed,
    Other,
}

impl BroadcastRefusal {
    fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("already known") {
            Self::AlreadyKnown
        } else if lower.contains("nonce too low") {
            Self::NonceUsed
        } else {
            Self::Other
        }
    }
}

fn scale_gas_price(gas_price: u128, multiplier: f64) -> u128 {
    (gas_price as f64 * multiplier).round() as u128
}

struct ChainClient {
    config: ChainConfig,
    provider: RootProvider,
}

/// [`HopSubmitter`] backed by JSON-RPC providers, one per configured chain.
pub struct TransactionSigner {
    credential: WalletCredential,
    wallet: EthereumWallet,
    chains: IndexMap<String, ChainClient>,
    gas_multiplier: f64,
}

impl TransactionSigner {
    /// Connects to every chain in `registry`, through `proxy` when given.
    pub fn new(
        credential: WalletCredential,
        registry: &ChainRegistry,
        proxy: Option<&Url>,
        gas_multiplier: f64,
    ) -> Result<Self, BridgeError> {
        let http = client_builder(proxy)?
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Client(e.to_string()))?;

        let chains = registry
            .iter()
            .map(|config| {
                let transport = Http::with_client(http.clone(), config.rpc_url.clone());
                let provider = RootProvider::new(RpcClient::new(transport, false));
                (
                    config.name.clone(),
                    ChainClient {
                        config: config.clone(),
                        provider,
                    },
                )
            })
            .collect();

        Ok(Self {
            wallet: EthereumWallet::from(credential.signer().clone()),
            credential,
            chains,
            gas_multiplier,
        })
    }

    fn chain(&self, name: &str) -> Result<&ChainClient, BridgeError> {
        self.chains
            .get(name)
            .ok_or_else(|| BridgeError::UnknownChain(name.to_string()))
    }
}

#[async_trait]
impl HopSubmitter for TransactionSigner {
    fn address(&self) -> Address {
        self.credential.address()
    }

    async fn balance(&self, chain: &str) -> Result<U256, BridgeError> {
        let client = self.chain(chain)?;
        client
            .provider
            .get_balance(self.address())
            .await
            .map_err(|e| BridgeError::from_node_message(chain, e.to_string()))
    }

    async fn sign_order(&self, order: &OrderRequest) -> Result<SignedOrder, BridgeError> {
        let source = self.chain(&order.from_chain)?;
        let destination = self.chain(&order.to_chain)?;
        let chain = source.config.name.as_str();
        let provider = &source.provider;
        let from = self.address();
        let node_err = |e: alloy::transports::TransportError| {
            BridgeError::from_node_message(chain, e.to_string())
        };

        let gas_price = provider.get_gas_price().await.map_err(node_err)?;
        let gas_price = scale_gas_price(gas_price, self.gas_multiplier);

        let calldata = encode_order_calldata(
            destination.config.api_code_bytes(),
            from,
            order.receive_amount,
            order.max_reward,
        );
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(source.config.bridge_contract)
            .with_value(order.amount)
            .with_input(calldata)
            .with_gas_price(gas_price)
            .with_chain_id(source.config.chain_id);

        let estimated = provider.estimate_gas(request.clone()).await.map_err(node_err)?;
        let gas_limit = estimated + estimated * GAS_LIMIT_BUFFER_PERCENT / 100;

        let required = order.amount + U256::from(gas_limit) * U256::from(gas_price);
        let available = provider.get_balance(from).await.map_err(node_err)?;
        if available < required {
            return Err(BridgeError::InsufficientBalance {
                chain: chain.to_string(),
                available,
                required,
            });
        }

        let nonce = provider
            .get_transaction_count(from)
            .pending()
            .await
            .map_err(node_err)?;

        let envelope = request
            .with_gas_limit(gas_limit)
            .with_nonce(nonce)
            .build(&self.wallet)
            .await
            .map_err(|e| BridgeError::Signing(e.to_string()))?;

        let hash = *envelope.tx_hash();
        debug!(
            chain,
            %hash,
            nonce,
            gas_limit,
            gas_price,
            "signed bridge order"
        );

        Ok(SignedOrder {
            chain: chain.to_string(),
            raw: envelope.encoded_2718().into(),
            hash,
            nonce,
        })
    }

    async fn broadcast(&self, signed: &SignedOrder) -> Result<TxHash, BridgeError> {
        let client = self.chain(&signed.chain)?;
        let err = match client.provider.send_raw_transaction(&signed.raw).await {
            Ok(pending) => {
                let hash = *pending.tx_hash();
                info!(chain = %signed.chain, tx_hash = %hash, "bridge order broadcast");
                return Ok(hash);
            }
            Err(e) => e.to_string(),
        };

        match BroadcastRefusal::classify(&err) {
            BroadcastRefusal::AlreadyKnown => {
                debug!(chain = %signed.chain, tx_hash = %signed.hash, error = %err, "order already in pool");
                Ok(signed.hash)
            }
            BroadcastRefusal::NonceUsed => {
                let known = client
                    .provider
                    .get_transaction_by_hash(signed.hash)
                    .await
                    .map_err(|e| BridgeError::from_node_message(&signed.chain, e.to_string()))?;
                if known.is_some() {
                    debug!(chain = %signed.chain, tx_hash = %signed.hash, "order already accepted");
                    Ok(signed.hash)
                } else {
                    Err(BridgeError::Rejected {
                        chain: signed.chain.clone(),
                        reason: format!("nonce {} used by another transaction: {err}", signed.nonce),
                    })
                }
            }
            BroadcastRefusal::Other => Err(BridgeError::from_node_message(&signed.chain, err)),
        }
    }

    async fn transaction_succeeded(&self, chain: &str, tx: TxHash) -> Result<bool, BridgeError> {
        let client = self.chain(chain)?;
        let receipt = client
            .provider
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| BridgeError::from_node_message(chain, e.to_string()))?;
        Ok(receipt.is_some_and(|receipt| receipt.status()))
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    #[test]
    fn order_calldata_layout() {
        let target = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let data = encode_order_calldata(*b"opst", target, U256::from(1_000u64), U256::from(2_000u64));

        assert_eq!(data.len(), 4 + 7 * 32);
        assert_eq!(data[..4], ORDER_SELECTOR);
        // bytes4 destination, left aligned
        assert_eq!(&data[4..8], b"opst");
        assert!(data[8..36].iter().all(|b| *b == 0));
        // uint32 asset
        assert!(data[36..68].iter().all(|b| *b == 0));
        // bytes32 target, address right aligned
        assert_eq!(&data[68 + 12..100], target.as_slice());
        assert_eq!(U256::from_be_slice(&data[100..132]), U256::from(1_000u64));
        assert!(data[132..196].iter().all(|b| *b == 0));
        assert_eq!(U256::from_be_slice(&data[196..228]), U256::from(2_000u64));
    }

    #[test]
    fn estimate_free_order_mirrors_amount() {
        let order = OrderRequest::without_estimate("base_sepolia", "optimism_sepolia", U256::from(7u64));
        assert_eq!(order.receive_amount, order.amount);
        assert_eq!(order.max_reward, order.amount);
    }

    #[test]
    fn broadcast_refusals() {
        assert_eq!(BroadcastRefusal::classify("already known"), BroadcastRefusal::AlreadyKnown);
        assert_eq!(
            BroadcastRefusal::classify(
                "server returned an error response: error code -32000: nonce too low: next nonce 8, tx nonce 7"
            ),
            BroadcastRefusal::NonceUsed
        );
        assert_eq!(
            BroadcastRefusal::classify("insufficient funds for gas * price + value"),
            BroadcastRefusal::Other
        );
    }

    #[test]
    fn gas_price_multiplier() {
        assert_eq!(scale_gas_price(1_000_000_000, 1.1), 1_100_000_000);
        assert_eq!(scale_gas_price(7, 1.0), 7);
    }
}
