use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use eyre::{Result, WrapErr};
use hopper_bridge::{
    LiveSessionFactory, ProxyPool, RunConfig, RunSession, SessionReport, WalletRunReport,
    WalletScheduler, inputs::load_private_keys,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the run configuration (JSON, or TOML by extension)
    #[arg(short, long, default_value = "config.json")]
    pub(crate) config: PathBuf,

    /// File with one private key per line
    #[arg(short, long, default_value = "private_keys.txt")]
    pub(crate) keys: PathBuf,

    /// File with one proxy per line, used when `use_proxy` is set
    #[arg(short, long)]
    pub(crate) proxies: Option<PathBuf>,

    /// Number of wallets processed concurrently (overrides config)
    #[arg(short, long)]
    pub(crate) threads: Option<usize>,

    /// Keep running passes until `repeat_count` is reached or interrupted
    #[arg(long)]
    pub(crate) continuous: bool,

    /// Write the full run report as JSON
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,
}

impl RunArgs {
    pub async fn run(self) -> Result<()> {
        let mut config = RunConfig::load(&self.config)
            .wrap_err_with(|| format!("loading {}", self.config.display()))?;
        if let Some(threads) = self.threads {
            config = config.with_thread_count(threads);
        }
        if self.continuous {
            config = config.with_continuous(true);
        }

        let wallets = load_private_keys(&self.keys)?;
        let proxies = match &self.proxies {
            Some(path) => ProxyPool::load(path)?,
            None => {
                if config.use_proxy {
                    warn!("use_proxy is set but no proxy file was given, connecting directly");
                }
                ProxyPool::default()
            }
        };

        info!(
            wallets = wallets.len(),
            proxies = proxies.len(),
            threads = config.thread_count,
            flow = %config.flow(),
            passes = ?config.passes(),
            "starting run"
        );

        let config = Arc::new(config);
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing in-flight work");
                    cancel.cancel();
                }
            }
        });

        let factory = Arc::new(LiveSessionFactory::new(Arc::clone(&config)));
        let session = RunSession::new(config, wallets, proxies, cancel);
        let report = WalletScheduler::new(session, factory).run().await;

        print_summary(&report);

        if let Some(path) = &self.report {
            std::fs::write(path, report.to_json()?)
                .wrap_err_with(|| format!("writing report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }

        Ok(())
    }
}

/// Confirmed and merely submitted hops against the plan, e.g. `1+1/2`.
fn hops_cell(wallet: &WalletRunReport) -> String {
    format!(
        "{}+{}/{}",
        wallet.confirmed_hops(),
        wallet.submitted_hops(),
        wallet.planned_hops
    )
}

fn print_summary(report: &SessionReport) {
    println!();
    println!("Run Summary");
    println!("===========");
    println!();
    println!(
        "{:<6} {:<16} {:<12} {:<16} Error",
        "Pass", "Wallet", "Outcome", "Conf+Sent/Plan"
    );
    for pass in &report.passes {
        for wallet in &pass.wallets {
            let error = wallet
                .error
                .as_deref()
                .or_else(|| wallet.hops.iter().rev().find_map(|h| h.error.as_deref()))
                .unwrap_or("-");
            println!(
                "{:<6} {:<16} {:<12} {:<16} {error}",
                pass.pass,
                wallet.wallet,
                wallet.outcome.to_string(),
                hops_cell(wallet),
            );
        }
    }

    let summary = report.summary();
    println!();
    if report.dropped_passes() > 0 {
        println!(
            "(only the last {} passes are listed; totals cover all of them)",
            report.passes.len()
        );
    }
    println!("  Passes:          {}", summary.passes);
    println!("  Wallet runs:     {}", summary.wallet_runs);
    println!("  Completed:       {}", summary.completed);
    println!("  Partial:         {}", summary.partial);
    println!("  Failed:          {}", summary.failed);
    println!("  Interrupted:     {}", summary.interrupted);
    println!(
        "  Hops confirmed:  {}/{}",
        summary.hops_confirmed, summary.hops_attempted
    );
    if report.interrupted {
        println!();
        println!("Run was interrupted before finishing.");
    }
}
