use clap::Parser;
use opts::{HopperCli, HopperSubcommand};

mod cmd;
mod opts;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = HopperCli::parse();

    match args.cmd {
        HopperSubcommand::Run(cmd) => cmd.run().await,
        HopperSubcommand::Check(cmd) => cmd.run().await,
        HopperSubcommand::Balances(cmd) => cmd.run().await,
        HopperSubcommand::Status(cmd) => cmd.run().await,
    }
}
