//! Static chain parameters keyed by chain name.

use alloy::primitives::Address;
use indexmap::IndexMap;
use url::Url;

use crate::error::BridgeError;

/// Network parameters for one bridgeable chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub bridge_contract: Address,
    /// Short code the bridge protocol uses for this chain, e.g. `bast`.
    pub api_code: String,
    /// Native asset symbol the bridge API expects, e.g. `eth`.
    pub native_asset: String,
}

impl ChainConfig {
    /// Destination code as the `bytes4` the bridge contract takes.
    pub fn api_code_bytes(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        let code = self.api_code.as_bytes();
        let len = code.len().min(4);
        out[..len].copy_from_slice(&code[..len]);
        out
    }
}

/// Native asset symbol for chains whose gas token is not ETH.
pub fn default_native_asset(chain_name: &str) -> &'static str {
    match chain_name {
        "monad_testnet" => "mon",
        "sei_testnet" => "sei",
        _ => "eth",
    }
}

/// Read-only lookup from chain name to [`ChainConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: IndexMap<String, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&ChainConfig, BridgeError> {
        self.chains
            .get(name)
            .ok_or_else(|| BridgeError::UnknownChain(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// Chains in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn chain(name: &str, code: &str) -> ChainConfig {
        ChainConfig {
            name: name.to_string(),
            chain_id: 84532,
            rpc_url: "https://sepolia.base.org".parse().unwrap(),
            bridge_contract: address!("fe1a1db2da6b1be6df1b0ee3b1c5a0a83b1d1ca9"),
            api_code: code.to_string(),
            native_asset: default_native_asset(name).to_string(),
        }
    }

    #[test]
    fn resolves_known_and_rejects_unknown() {
        let registry = ChainRegistry::new([chain("base_sepolia", "bast"), chain("optimism_sepolia", "opst")]);

        assert_eq!(registry.resolve("base_sepolia").unwrap().api_code, "bast");
        assert!(matches!(
            registry.resolve("arbitrum_sepolia"),
            Err(BridgeError::UnknownChain(name)) if name == "arbitrum_sepolia"
        ));
    }

    #[test]
    fn preserves_configuration_order() {
        let registry = ChainRegistry::new([
            chain("optimism_sepolia", "opst"),
            chain("base_sepolia", "bast"),
            chain("monad_testnet", "mont"),
        ]);
        let names: Vec<_> = registry.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["optimism_sepolia", "base_sepolia", "monad_testnet"]);
    }

    #[test]
    fn api_code_is_left_aligned_bytes4() {
        assert_eq!(chain("base_sepolia", "bast").api_code_bytes(), *b"bast");
        assert_eq!(chain("l1", "l1").api_code_bytes(), [b'l', b'1', 0, 0]);
    }

    #[test]
    fn native_asset_defaults() {
        assert_eq!(default_native_asset("monad_testnet"), "mon");
        assert_eq!(default_native_asset("sei_testnet"), "sei");
        assert_eq!(default_native_asset("base_sepolia"), "eth");
    }
}
