use crate::cmd::{balances::BalancesArgs, check::CheckArgs, run::RunArgs, status::StatusArgs};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hopper")]
#[command(version, about = "Repeated native-token bridging across EVM testnets", long_about = None)]
pub struct HopperCli {
    #[command(subcommand)]
    pub cmd: HopperSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum HopperSubcommand {
    /// Run the configured flow for every wallet
    Run(RunArgs),

    /// Validate the configuration and print the flow
    Check(CheckArgs),

    /// Show each wallet's native balance on every configured chain
    Balances(BalancesArgs),

    /// Look up the bridge status of one order
    Status(StatusArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let cli = HopperCli::try_parse_from([
            "hopper",
            "run",
            "--config",
            "cfg.toml",
            "--threads",
            "4",
            "--continuous",
            "--report",
            "out.json",
        ])
        .unwrap();
        let HopperSubcommand::Run(args) = cli.cmd else {
            panic!("expected run");
        };
        assert_eq!(args.threads, Some(4));
        assert!(args.continuous);
        assert_eq!(args.keys.to_str(), Some("private_keys.txt"));
    }

    #[test]
    fn status_requires_tx_hash() {
        assert!(HopperCli::try_parse_from(["hopper", "status", "--from", "a", "--to", "b"]).is_err());
        assert!(
            HopperCli::try_parse_from([
                "hopper",
                "status",
                "--tx",
                "0x1111111111111111111111111111111111111111111111111111111111111111",
                "--from",
                "base_sepolia",
                "--to",
                "optimism_sepolia",
            ])
            .is_ok()
        );
    }
}
