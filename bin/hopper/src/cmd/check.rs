use std::path::PathBuf;

use clap::Parser;
use eyre::Result;
use hopper_bridge::RunConfig;

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path to the run configuration
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

impl CheckArgs {
    pub async fn run(self) -> Result<()> {
        let config = RunConfig::load(&self.config)?;

        println!("Configuration OK: {}", self.config.display());
        println!();
        println!("Chains:");
        for chain in config.chains().iter() {
            println!(
                "  {:<20} id {:<10} code {:<5} asset {:<4} contract {}",
                chain.name, chain.chain_id, chain.api_code, chain.native_asset, chain.bridge_contract
            );
        }

        println!();
        println!("Flow ({} hops): {}", config.flow().len(), config.flow());
        for (i, hop) in config.flow().hops().iter().enumerate() {
            println!(
                "  {i}: {:<40} amount {}..{}",
                hop.path.to_string(),
                hop.amount.min,
                hop.amount.max
            );
        }

        println!();
        let passes = config
            .passes()
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string());
        println!("Threads:  {}", config.thread_count);
        println!("Passes:   {passes}");
        println!(
            "Waiting:  {} (timeout {}s, poll every {}s)",
            config.bridge.wait_for_completion,
            config.bridge.completion_timeout.as_secs(),
            config.bridge.status_poll_interval.as_secs()
        );

        Ok(())
    }
}
