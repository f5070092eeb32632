//! Per-wallet flow execution.
//!
//! A [`BridgeOrchestrator`] walks one wallet through the configured [`Flow`]
//! hop by hop: pre-flight balance check, order signing and broadcast, then
//! (optionally) polling the bridge until the order settles. It always produces
//! a [`WalletRunReport`]; errors end the flow but are never propagated.
//!
//! [`Flow`]: crate::flow::Flow

use std::{sync::Arc, time::Duration};

use alloy::primitives::{TxHash, U256};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    chains::ChainConfig,
    config::RunConfig,
    error::BridgeError,
    flow::{Hop, to_wei},
    metrics::{BridgeMetrics, RunProgress},
    report::{HopResult, HopStatus, RunOutcome, WalletRunReport},
    retry::RetryPolicy,
    signer::{HopSubmitter, OrderRequest},
    status::{BridgeApi, BridgeState},
};

/// Chain and API access for one wallet, opened fresh for every wallet run.
pub struct WalletSession {
    pub submitter: Box<dyn HopSubmitter>,
    pub api: Box<dyn BridgeApi>,
}

impl WalletSession {
    pub fn new(submitter: impl HopSubmitter + 'static, api: impl BridgeApi + 'static) -> Self {
        Self {
            submitter: Box::new(submitter),
            api: Box::new(api),
        }
    }
}

/// Where a flow currently is.
#[derive(Debug)]
enum FlowState {
    Idle,
    SubmittingHop(usize),
    AwaitingConfirmation(usize, HopResult),
    HopDone(usize),
    FlowComplete,
    FlowFailed,
    Interrupted,
}

/// Why a hop stopped before its order was accepted.
enum HopAbort {
    Interrupted,
    /// Interrupted after signed bytes were sent at least once; the node may hold them.
    InterruptedInFlight(HopResult),
    Failed(HopResult),
}

/// How a confirmation wait ended, short of the completion timeout.
enum Settlement {
    Executed(Option<TxHash>),
    Failed(String),
    Interrupted,
}

pub struct BridgeOrchestrator {
    config: Arc<RunConfig>,
    session: WalletSession,
    policy: RetryPolicy,
    cancel: CancellationToken,
    wallet_index: usize,
    wallet: String,
    metrics: BridgeMetrics,
    progress: Option<Arc<RunProgress>>,
}

impl BridgeOrchestrator {
    pub fn new(
        config: Arc<RunConfig>,
        session: WalletSession,
        wallet_index: usize,
        wallet: String,
        cancel: CancellationToken,
    ) -> Self {
        let policy = config.retry_policy().with_cancellation(cancel.clone());
        Self {
            config,
            session,
            policy,
            cancel,
            wallet_index,
            wallet,
            metrics: BridgeMetrics::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<RunProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the whole flow for this wallet.
    pub async fn run(self) -> WalletRunReport {
        let flow = self.config.flow().clone();
        let planned = flow.len();
        let mut hops = Vec::with_capacity(planned);
        let mut state = FlowState::Idle;

        self.metrics.record_wallet_started();
        info!(wallet = %self.wallet, %flow, "starting flow");

        let interrupted = loop {
            state = match state {
                FlowState::Idle if flow.is_empty() => FlowState::FlowComplete,
                FlowState::Idle => FlowState::SubmittingHop(0),

                FlowState::SubmittingHop(index) => {
                    if self.cancel.is_cancelled() {
                        FlowState::Interrupted
                    } else {
                        match self.submit_hop(index, &flow.hops()[index]).await {
                            Ok(result) if self.config.bridge.wait_for_completion => {
                                FlowState::AwaitingConfirmation(index, result)
                            }
                            Ok(result) => {
                                hops.push(result);
                                FlowState::HopDone(index)
                            }
                            Err(HopAbort::Failed(result)) => {
                                self.record_failure(&result);
                                hops.push(result);
                                FlowState::FlowFailed
                            }
                            Err(HopAbort::InterruptedInFlight(result)) => {
                                hops.push(result);
                                FlowState::Interrupted
                            }
                            Err(HopAbort::Interrupted) => FlowState::Interrupted,
                        }
                    }
                }

                FlowState::AwaitingConfirmation(index, mut result) => {
                    let interrupted = self.await_confirmation(&mut result).await;
                    let status = result.status();
                    if matches!(status, HopStatus::Failed | HopStatus::TimedOut) {
                        self.record_failure(&result);
                    }
                    hops.push(result);
                    if interrupted {
                        FlowState::Interrupted
                    } else if status == HopStatus::Confirmed {
                        FlowState::HopDone(index)
                    } else {
                        FlowState::FlowFailed
                    }
                }

                FlowState::HopDone(index) if index + 1 >= planned => FlowState::FlowComplete,
                FlowState::HopDone(index) => {
                    let wait = self
                        .config
                        .delay
                        .between_bridges
                        .sample(&mut rand::thread_rng());
                    debug!(wallet = %self.wallet, delay_secs = wait.as_secs_f64(), "waiting before next hop");
                    if self.pause(wait).await {
                        FlowState::SubmittingHop(index + 1)
                    } else {
                        FlowState::Interrupted
                    }
                }

                FlowState::FlowComplete | FlowState::FlowFailed => break false,
                FlowState::Interrupted => break true,
            };
        };

        let report =
            WalletRunReport::finish(self.wallet_index, self.wallet.clone(), planned, hops, interrupted);
        self.metrics
            .record_wallet_finished(report.outcome == RunOutcome::Completed);
        info!(
            wallet = %self.wallet,
            outcome = %report.outcome,
            hops = report.hops.len(),
            planned,
            "flow finished"
        );
        report
    }

    /// Sleeps for `wait` unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    fn record_failure(&self, result: &HopResult) {
        self.metrics.record_hop_failed();
        if let Some(progress) = &self.progress {
            progress.hop_failed();
        }
        error!(
            wallet = %self.wallet,
            hop = result.index,
            from = %result.from_chain,
            to = %result.to_chain,
            status = %result.status(),
            error = result.error.as_deref().unwrap_or("none"),
            "hop failed"
        );
    }

    fn chains(&self, hop: &Hop) -> Result<(ChainConfig, ChainConfig), BridgeError> {
        let chains = self.config.chains();
        Ok((
            chains.resolve(&hop.path.from_chain)?.clone(),
            chains.resolve(&hop.path.to_chain)?.clone(),
        ))
    }

    /// Checks funding, signs and broadcasts hop `index`.
    async fn submit_hop(&self, index: usize, hop: &Hop) -> Result<HopResult, HopAbort> {
        let fail = |amount: U256, err: BridgeError| match err {
            BridgeError::Cancelled => HopAbort::Interrupted,
            err => HopAbort::Failed(HopResult::failed_before_submit(index, hop, amount, err)),
        };

        let (from, to) = self.chains(hop).map_err(|e| fail(U256::ZERO, e))?;
        let submitter = &self.session.submitter;

        let minimum = hop.amount.min_wei();
        let balance = self
            .policy
            .execute("balance", || submitter.balance(&from.name))
            .await
            .map_err(|e| fail(U256::ZERO, e))?;
        if balance < minimum {
            let err = BridgeError::InsufficientBalance {
                chain: from.name.clone(),
                available: balance,
                required: minimum,
            };
            return Err(fail(minimum, err));
        }

        let amount = hop.amount.sample(&mut rand::thread_rng());
        let amount_wei = to_wei(amount);
        info!(
            wallet = %self.wallet,
            hop = index,
            from = %from.name,
            to = %to.name,
            amount,
            asset = %from.native_asset,
            "bridging"
        );

        let order = self
            .order_request(&from, &to, amount_wei)
            .await
            .map_err(|e| fail(amount_wei, e))?;

        let signed = self
            .policy
            .execute("sign_order", || submitter.sign_order(&order))
            .await
            .map_err(|e| fail(amount_wei, e))?;
        let mut broadcast_sent = false;
        let broadcast = self
            .policy
            .execute("broadcast", || {
                broadcast_sent = true;
                submitter.broadcast(&signed)
            })
            .await;
        let tx_hash = match broadcast {
            Ok(tx_hash) => tx_hash,
            Err(BridgeError::Cancelled) if broadcast_sent => {
                warn!(
                    wallet = %self.wallet,
                    hop = index,
                    tx_hash = %signed.hash,
                    "interrupted before broadcast was confirmed"
                );
                let mut result = HopResult::submitted(index, hop, amount_wei, signed.hash);
                result.error = Some("interrupted before broadcast was confirmed".to_string());
                return Err(HopAbort::InterruptedInFlight(result));
            }
            Err(e) => return Err(fail(amount_wei, e)),
        };

        self.metrics.record_hop_submitted();
        info!(wallet = %self.wallet, hop = index, %tx_hash, "order submitted");
        Ok(HopResult::submitted(index, hop, amount_wei, tx_hash))
    }

    /// Order parameters, priced by the bridge when estimates are enabled.
    async fn order_request(
        &self,
        from: &ChainConfig,
        to: &ChainConfig,
        amount: U256,
    ) -> Result<OrderRequest, BridgeError> {
        let mut order = OrderRequest::without_estimate(&from.name, &to.name, amount);
        if !self.config.bridge.use_estimate {
            return Ok(order);
        }

        let api = &self.session.api;
        match self
            .policy
            .execute("estimate", || api.estimate(from, to, amount))
            .await
        {
            Ok(estimate) => {
                debug!(
                    wallet = %self.wallet,
                    receive = %estimate.receive_amount,
                    max_reward = %estimate.max_reward,
                    "bridge estimate"
                );
                order.receive_amount = estimate.receive_amount;
                order.max_reward = estimate.max_reward;
            }
            Err(BridgeError::Cancelled) => return Err(BridgeError::Cancelled),
            Err(e) => {
                warn!(wallet = %self.wallet, error = %e, "estimate unavailable, using sent amount");
            }
        }
        Ok(order)
    }

    /// Polls the bridge until the order settles, fails, times out or the run
    /// is interrupted. Returns `true` when interrupted.
    async fn await_confirmation(&self, result: &mut HopResult) -> bool {
        let Some(source_tx) = result.source_tx else {
            return false;
        };
        let codes = self.config.chains().resolve(&result.from_chain).and_then(|from| {
            let to = self.config.chains().resolve(&result.to_chain)?;
            Ok((from.api_code.clone(), to.api_code.clone()))
        });
        let (from_code, to_code) = match codes {
            Ok(codes) => codes,
            Err(e) => {
                result.fail(e);
                return false;
            }
        };

        let started = Instant::now();
        let api = &self.session.api;
        let submitter = &self.session.submitter;
        let to_chain = result.to_chain.clone();
        let interval = self.config.bridge.status_poll_interval;

        let settle = async {
            loop {
                let polled = self
                    .policy
                    .execute("poll_status", || api.poll_status(source_tx, &from_code, &to_code))
                    .await;
                match polled {
                    Ok(BridgeState::Pending) => {
                        debug!(wallet = %self.wallet, tx_hash = %source_tx, "order pending");
                    }
                    Ok(BridgeState::Executed { destination_tx }) => {
                        return Settlement::Executed(destination_tx);
                    }
                    Ok(BridgeState::Unverified { destination_tx }) => {
                        let checked = self
                            .policy
                            .execute("destination_receipt", || {
                                submitter.transaction_succeeded(&to_chain, destination_tx)
                            })
                            .await;
                        match checked {
                            Ok(true) => return Settlement::Executed(Some(destination_tx)),
                            Ok(false) => {
                                debug!(wallet = %self.wallet, %destination_tx, "destination tx not mined yet");
                            }
                            Err(BridgeError::Cancelled) => return Settlement::Interrupted,
                            Err(e) => {
                                warn!(wallet = %self.wallet, %destination_tx, error = %e, "destination check failed");
                            }
                        }
                    }
                    Ok(BridgeState::FailedWithReason(reason)) => return Settlement::Failed(reason),
                    Err(BridgeError::Cancelled) => return Settlement::Interrupted,
                    Err(e) => return Settlement::Failed(e.to_string()),
                }
                if !self.pause(interval).await {
                    return Settlement::Interrupted;
                }
            }
        };

        match tokio::time::timeout(self.config.bridge.completion_timeout, settle).await {
            Ok(Settlement::Executed(destination_tx)) => {
                let elapsed = started.elapsed().as_secs_f64();
                result.confirm(destination_tx);
                self.metrics.record_hop_confirmed(elapsed);
                if let Some(progress) = &self.progress {
                    progress.hop_confirmed();
                }
                info!(
                    wallet = %self.wallet,
                    hop = result.index,
                    tx_hash = %source_tx,
                    destination_tx = ?destination_tx,
                    elapsed_secs = elapsed,
                    "bridge order executed"
                );
                false
            }
            Ok(Settlement::Failed(reason)) => {
                result.fail(reason);
                false
            }
            Ok(Settlement::Interrupted) => {
                info!(wallet = %self.wallet, hop = result.index, "interrupted while awaiting confirmation");
                true
            }
            Err(_) => {
                result.time_out();
                false
            }
        }
    }
}
