//! Runs orchestrators for every wallet over one or more passes.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    config::RunConfig,
    error::BridgeError,
    inputs::{ProxyPool, WalletCredential},
    metrics::RunProgress,
    orchestrator::{BridgeOrchestrator, WalletSession},
    report::{PassReport, RunOutcome, SessionReport, WalletRunReport},
    signer::TransactionSigner,
    status::BridgeStatusClient,
};

/// Opens the chain and API clients a wallet run needs.
pub trait SessionFactory: Send + Sync {
    fn open(
        &self,
        credential: &WalletCredential,
        proxy: Option<&Url>,
    ) -> Result<WalletSession, BridgeError>;
}

/// Opens live RPC providers and a bridge API client.
#[derive(Debug, Clone)]
pub struct LiveSessionFactory {
    config: Arc<RunConfig>,
}

impl LiveSessionFactory {
    pub fn new(config: Arc<RunConfig>) -> Self {
        Self { config }
    }
}

impl SessionFactory for LiveSessionFactory {
    fn open(
        &self,
        credential: &WalletCredential,
        proxy: Option<&Url>,
    ) -> Result<WalletSession, BridgeError> {
        let signer = TransactionSigner::new(
            credential.clone(),
            self.config.chains(),
            proxy,
            self.config.bridge.gas_multiplier,
        )?;
        let api = BridgeStatusClient::new(
            self.config.api.base_url.clone(),
            self.config.api.timeout,
            proxy,
        )?;
        Ok(WalletSession::new(signer, api))
    }
}

/// Everything one invocation works with.
#[derive(Debug)]
pub struct RunSession {
    config: Arc<RunConfig>,
    wallets: Vec<WalletCredential>,
    proxies: ProxyPool,
    cancel: CancellationToken,
    passes_started: AtomicU64,
}

impl RunSession {
    pub fn new(
        config: Arc<RunConfig>,
        wallets: Vec<WalletCredential>,
        proxies: ProxyPool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            wallets,
            proxies,
            cancel,
            passes_started: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Arc<RunConfig> {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Proxy for wallet `index`, when proxies are enabled.
    pub fn proxy_for(&self, index: usize) -> Option<&Url> {
        if self.config.use_proxy {
            self.proxies.for_wallet(index)
        } else {
            None
        }
    }

    fn next_pass(&self) -> u64 {
        self.passes_started.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Pass reports kept in memory when a continuous run has no pass limit.
pub const UNBOUNDED_PASS_HISTORY: usize = 100;

/// Distributes wallets over a bounded pool of worker tasks.
pub struct WalletScheduler {
    session: Arc<RunSession>,
    factory: Arc<dyn SessionFactory>,
    progress: Arc<RunProgress>,
    pass_history: usize,
}

impl WalletScheduler {
    pub fn new(session: RunSession, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            session: Arc::new(session),
            factory,
            progress: RunProgress::new(),
            pass_history: UNBOUNDED_PASS_HISTORY,
        }
    }

    /// Number of pass reports an unbounded run keeps; totals still cover all passes.
    pub fn with_pass_history(mut self, passes: usize) -> Self {
        self.pass_history = passes.max(1);
        self
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// Runs every pass the configuration asks for, or until cancelled.
    pub async fn run(&self) -> SessionReport {
        let config = self.session.config();
        let passes = config.passes();
        let history = passes.is_none().then_some(self.pass_history);
        let mut report = SessionReport::default();

        loop {
            if self.session.cancel.is_cancelled() {
                break;
            }

            let pass = self.session.next_pass();
            info!(
                pass,
                wallets = self.session.wallets.len(),
                threads = config.thread_count,
                "starting pass"
            );
            let wallets = self.run_pass().await;
            let pass_report = PassReport::new(pass, wallets);
            info!(
                pass,
                completed = pass_report.count(RunOutcome::Completed),
                wallets = pass_report.wallets.len(),
                "pass finished"
            );
            report.record(pass_report, history);

            if passes.is_some_and(|total| pass >= total) {
                break;
            }

            let wait = config.delay.after_completion.sample(&mut rand::thread_rng());
            info!(pass, delay_secs = wait.as_secs_f64(), "waiting before next pass");
            if !pause(&self.session.cancel, wait).await {
                break;
            }
        }

        report.interrupted = self.session.cancel.is_cancelled();
        if report.interrupted {
            warn!(passes = report.summary().passes, "run interrupted");
        }
        report
    }

    async fn run_pass(&self) -> Vec<WalletRunReport> {
        let queue: VecDeque<_> = self.session.wallets.iter().cloned().enumerate().collect();
        let queue = Arc::new(Mutex::new(queue));
        let workers = self
            .session
            .config
            .thread_count
            .min(self.session.wallets.len())
            .max(1);

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let worker = Worker {
                id: worker,
                queue: Arc::clone(&queue),
                session: Arc::clone(&self.session),
                factory: Arc::clone(&self.factory),
                progress: Arc::clone(&self.progress),
            };
            set.spawn(worker.run());
        }

        let mut reports = Vec::with_capacity(self.session.wallets.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut done) => reports.append(&mut done),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }
        reports
    }
}

/// Sleeps for `wait` unless `cancel` fires first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<(usize, WalletCredential)>>>,
    session: Arc<RunSession>,
    factory: Arc<dyn SessionFactory>,
    progress: Arc<RunProgress>,
}

impl Worker {
    async fn run(self) -> Vec<WalletRunReport> {
        let config = Arc::clone(&self.session.config);
        let cancel = self.session.cancel.clone();
        let mut reports = Vec::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some((index, credential)) = next else {
                break;
            };

            self.progress.wallet_started();
            let wallet = credential.masked();
            let report = match self.factory.open(&credential, self.session.proxy_for(index)) {
                Ok(session) => {
                    BridgeOrchestrator::new(
                        Arc::clone(&config),
                        session,
                        index,
                        wallet,
                        cancel.clone(),
                    )
                    .with_progress(Arc::clone(&self.progress))
                    .run()
                    .await
                }
                Err(e) => {
                    warn!(worker = self.id, %wallet, error = %e, "failed to open wallet session");
                    WalletRunReport::aborted(index, wallet, config.flow().len(), e)
                }
            };
            self.progress.wallet_finished();
            reports.push(report);

            let drained = self.queue.lock().is_empty();
            if drained {
                break;
            }
            let wait = config.delay.between_wallets.sample(&mut rand::thread_rng());
            if !pause(&cancel, wait).await {
                break;
            }
        }
        reports
    }
}
