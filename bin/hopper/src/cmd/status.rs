use std::path::PathBuf;

use alloy::primitives::TxHash;
use clap::Parser;
use eyre::Result;
use hopper_bridge::{BridgeApi, BridgeState, BridgeStatusClient, RunConfig};

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to the run configuration
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Source transaction hash of the order
    #[arg(long)]
    tx: TxHash,

    /// Source chain name
    #[arg(long)]
    from: String,

    /// Destination chain name
    #[arg(long)]
    to: String,
}

impl StatusArgs {
    pub async fn run(self) -> Result<()> {
        let config = RunConfig::load(&self.config)?;
        let from = config.chains().resolve(&self.from)?;
        let to = config.chains().resolve(&self.to)?;

        let client = BridgeStatusClient::new(config.api.base_url.clone(), config.api.timeout, None)?;
        let state = client
            .poll_status(self.tx, &from.api_code, &to.api_code)
            .await?;

        println!("Order {}", self.tx);
        println!("  Route:   {} -> {}", from.name, to.name);
        match state {
            BridgeState::Pending => println!("  Status:  pending"),
            BridgeState::Executed { destination_tx } => {
                println!("  Status:  executed");
                if let Some(tx) = destination_tx {
                    println!("  Dest tx: {tx}");
                }
            }
            BridgeState::Unverified { destination_tx } => {
                println!("  Status:  unrecognised, destination tx not yet verified");
                println!("  Dest tx: {destination_tx}");
            }
            BridgeState::FailedWithReason(reason) => println!("  Status:  failed ({reason})"),
        }

        Ok(())
    }
}
