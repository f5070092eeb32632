use std::path::PathBuf;

use alloy::primitives::utils::format_ether;
use clap::Parser;
use eyre::Result;
use futures::future::join_all;
use hopper_bridge::{
    HopSubmitter, ProxyPool, RunConfig, TransactionSigner, inputs::load_private_keys,
};
use url::Url;

#[derive(Parser, Debug)]
pub struct BalancesArgs {
    /// Path to the run configuration
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// File with one private key per line
    #[arg(short, long, default_value = "private_keys.txt")]
    keys: PathBuf,

    /// File with one proxy per line, used when `use_proxy` is set
    #[arg(short, long)]
    proxies: Option<PathBuf>,
}

impl BalancesArgs {
    pub async fn run(self) -> Result<()> {
        let config = RunConfig::load(&self.config)?;
        let wallets = load_private_keys(&self.keys)?;
        let proxies = match &self.proxies {
            Some(path) => ProxyPool::load(path)?,
            None => ProxyPool::default(),
        };

        println!("Wallet Balances");
        println!("===============");

        for (index, wallet) in wallets.into_iter().enumerate() {
            println!();
            println!("[{index}] {}", wallet.address());

            let proxy = proxy_for(&config, &proxies, index);
            let signer = TransactionSigner::new(
                wallet,
                config.chains(),
                proxy,
                config.bridge.gas_multiplier,
            )?;
            let chains: Vec<_> = config.chains().iter().collect();
            let balances = join_all(chains.iter().map(|chain| signer.balance(&chain.name))).await;

            for (chain, balance) in chains.iter().zip(balances) {
                match balance {
                    Ok(wei) => println!(
                        "  {:<20} {} {}",
                        chain.name,
                        format_ether(wei),
                        chain.native_asset.to_uppercase()
                    ),
                    Err(e) => println!("  {:<20} error: {e}", chain.name),
                }
            }
        }

        Ok(())
    }
}

/// The wallet's proxy, honouring `use_proxy` the way `run` does.
fn proxy_for<'a>(config: &RunConfig, proxies: &'a ProxyPool, index: usize) -> Option<&'a Url> {
    if config.use_proxy {
        proxies.for_wallet(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(use_proxy: bool) -> RunConfig {
        let raw = format!(
            r#"{{
                "use_proxy": {use_proxy},
                "bridge": {{ "amount": {{ "min": 0.1, "max": 0.2 }} }},
                "chains": {{
                    "base_sepolia": {{
                        "chain_id": 84532,
                        "rpc_url": "https://sepolia.base.org",
                        "bridge_contract": "0xCEE0372632a37Ba4d0499D1E2116eCff3A17d3C3",
                        "api_name": "bast"
                    }},
                    "optimism_sepolia": {{
                        "chain_id": 11155420,
                        "rpc_url": "https://sepolia.optimism.io",
                        "bridge_contract": "0xb6Def636914Ae60173d9007E732684a9eEDEF26E",
                        "api_name": "opst"
                    }}
                }},
                "api": {{ "base_url": "https://api.t2rn.io" }}
            }}"#
        );
        RunConfig::from_json_str(&raw).unwrap()
    }

    #[test]
    fn proxies_follow_use_proxy() {
        let proxies = ProxyPool::parse("10.0.0.1:8080\n10.0.0.2:8080").unwrap();

        let proxied = config(true);
        assert_eq!(
            proxy_for(&proxied, &proxies, 3).map(Url::as_str),
            Some("http://10.0.0.2:8080/")
        );

        let direct = config(false);
        assert_eq!(proxy_for(&direct, &proxies, 3), None);
    }
}
