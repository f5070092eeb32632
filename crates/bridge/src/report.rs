//! Per-hop, per-wallet and per-session results.

use std::fmt;

use alloy::primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::flow::Hop;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopStatus {
    /// Broadcast accepted; no terminal confirmation observed (yet).
    Submitted,
    Confirmed,
    TimedOut,
    Failed,
}

impl HopStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted)
    }
}

impl fmt::Display for HopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one attempted hop.
///
/// Created when the hop is attempted. Only the status step moves it out of
/// `Submitted`; once terminal every transition is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopResult {
    pub index: usize,
    pub from_chain: String,
    pub to_chain: String,
    pub amount_wei: U256,
    pub source_tx: Option<TxHash>,
    pub destination_tx: Option<TxHash>,
    status: HopStatus,
    pub error: Option<String>,
}

impl HopResult {
    /// A hop whose order was accepted by the source chain.
    pub fn submitted(index: usize, hop: &Hop, amount_wei: U256, source_tx: TxHash) -> Self {
        Self {
            index,
            from_chain: hop.path.from_chain.clone(),
            to_chain: hop.path.to_chain.clone(),
            amount_wei,
            source_tx: Some(source_tx),
            destination_tx: None,
            status: HopStatus::Submitted,
            error: None,
        }
    }

    /// A hop that failed before anything was broadcast.
    pub fn failed_before_submit(
        index: usize,
        hop: &Hop,
        amount_wei: U256,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            index,
            from_chain: hop.path.from_chain.clone(),
            to_chain: hop.path.to_chain.clone(),
            amount_wei,
            source_tx: None,
            destination_tx: None,
            status: HopStatus::Failed,
            error: Some(error.to_string()),
        }
    }

    pub fn status(&self) -> HopStatus {
        self.status
    }

    pub fn confirm(&mut self, destination_tx: Option<TxHash>) {
        if self.status == HopStatus::Submitted {
            self.status = HopStatus::Confirmed;
            self.destination_tx = destination_tx;
        }
    }

    pub fn time_out(&mut self) {
        if self.status == HopStatus::Submitted {
            self.status = HopStatus::TimedOut;
        }
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        if self.status == HopStatus::Submitted {
            self.status = HopStatus::Failed;
            self.error = Some(error.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned hop was submitted and none ended badly.
    Completed,
    /// At least one hop went through before the flow stopped.
    PartialFailure,
    Failed,
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::PartialFailure => "partial",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Everything one orchestrator run produced for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRunReport {
    pub wallet_index: usize,
    /// Masked address.
    pub wallet: String,
    pub planned_hops: usize,
    pub hops: Vec<HopResult>,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WalletRunReport {
    /// Derives the outcome from recorded hops.
    pub fn finish(
        wallet_index: usize,
        wallet: String,
        planned_hops: usize,
        hops: Vec<HopResult>,
        interrupted: bool,
    ) -> Self {
        let succeeded = hops
            .iter()
            .filter(|h| matches!(h.status(), HopStatus::Confirmed | HopStatus::Submitted))
            .count();
        let outcome = if interrupted {
            RunOutcome::Interrupted
        } else if succeeded == planned_hops && hops.len() == planned_hops {
            RunOutcome::Completed
        } else if succeeded > 0 {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Failed
        };
        Self {
            wallet_index,
            wallet,
            planned_hops,
            hops,
            outcome,
            error: None,
        }
    }

    /// A wallet that never started its flow.
    pub fn aborted(
        wallet_index: usize,
        wallet: String,
        planned_hops: usize,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            wallet_index,
            wallet,
            planned_hops,
            hops: Vec::new(),
            outcome: RunOutcome::Failed,
            error: Some(error.to_string()),
        }
    }

    pub fn confirmed_hops(&self) -> usize {
        self.count_hops(HopStatus::Confirmed)
    }

    /// Hops accepted by the node but not tracked to completion.
    pub fn submitted_hops(&self) -> usize {
        self.count_hops(HopStatus::Submitted)
    }

    fn count_hops(&self, status: HopStatus) -> usize {
        self.hops.iter().filter(|h| h.status() == status).count()
    }
}

/// Wallet reports of one pass, ordered by wallet index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: u64,
    pub wallets: Vec<WalletRunReport>,
}

impl PassReport {
    pub fn new(pass: u64, mut wallets: Vec<WalletRunReport>) -> Self {
        wallets.sort_by_key(|w| w.wallet_index);
        Self { pass, wallets }
    }

    pub fn count(&self, outcome: RunOutcome) -> usize {
        self.wallets.iter().filter(|w| w.outcome == outcome).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub passes: usize,
    pub wallet_runs: usize,
    pub completed: usize,
    pub partial: usize,
    pub failed: usize,
    pub interrupted: usize,
    pub hops_confirmed: usize,
    pub hops_attempted: usize,
}

impl SessionSummary {
    fn add(&mut self, pass: &PassReport) {
        self.passes += 1;
        for wallet in &pass.wallets {
            self.wallet_runs += 1;
            match wallet.outcome {
                RunOutcome::Completed => self.completed += 1,
                RunOutcome::PartialFailure => self.partial += 1,
                RunOutcome::Failed => self.failed += 1,
                RunOutcome::Interrupted => self.interrupted += 1,
            }
            self.hops_attempted += wallet.hops.len();
            self.hops_confirmed += wallet.confirmed_hops();
        }
    }
}

/// All passes of one invocation.
///
/// Totals cover every recorded pass, while `passes` may only hold the most
/// recent ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub passes: Vec<PassReport>,
    summary: SessionSummary,
    pub interrupted: bool,
}

impl SessionReport {
    /// Adds a finished pass, keeping at most `history` pass reports.
    pub fn record(&mut self, pass: PassReport, history: Option<usize>) {
        self.summary.add(&pass);
        self.passes.push(pass);
        if let Some(history) = history {
            let excess = self.passes.len().saturating_sub(history);
            self.passes.drain(..excess);
        }
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary.clone()
    }

    /// Passes counted in the totals whose reports are no longer kept.
    pub fn dropped_passes(&self) -> usize {
        self.summary.passes - self.passes.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{AmountRange, BridgePath};

    fn hop() -> Hop {
        Hop {
            path: BridgePath::new("base_sepolia", "optimism_sepolia"),
            amount: AmountRange { min: 0.1, max: 0.2 },
        }
    }

    #[test]
    fn terminal_status_is_immutable() {
        let mut result = HopResult::submitted(0, &hop(), U256::from(1), TxHash::repeat_byte(1));
        result.confirm(Some(TxHash::repeat_byte(2)));
        result.time_out();
        result.fail("late error");

        assert_eq!(result.status(), HopStatus::Confirmed);
        assert_eq!(result.destination_tx, Some(TxHash::repeat_byte(2)));
        assert!(result.error.is_none());
    }

    #[test]
    fn pre_submit_failure_has_no_source_tx() {
        let result = HopResult::failed_before_submit(0, &hop(), U256::ZERO, "insufficient balance");
        assert_eq!(result.status(), HopStatus::Failed);
        assert!(result.source_tx.is_none());
    }

    #[test]
    fn outcome_reflects_hops() {
        let ok = || {
            let mut r = HopResult::submitted(0, &hop(), U256::from(1), TxHash::repeat_byte(1));
            r.confirm(None);
            r
        };
        let bad = HopResult::failed_before_submit(1, &hop(), U256::ZERO, "rejected");

        let report = WalletRunReport::finish(0, "w".into(), 2, vec![ok(), ok()], false);
        assert_eq!(report.outcome, RunOutcome::Completed);

        let sent = || HopResult::submitted(0, &hop(), U256::from(1), TxHash::repeat_byte(3));
        let report = WalletRunReport::finish(0, "w".into(), 2, vec![sent(), sent()], false);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!((report.confirmed_hops(), report.submitted_hops()), (0, 2));

        let report = WalletRunReport::finish(0, "w".into(), 2, vec![ok(), bad.clone()], false);
        assert_eq!(report.outcome, RunOutcome::PartialFailure);

        let report = WalletRunReport::finish(0, "w".into(), 2, vec![bad], false);
        assert_eq!(report.outcome, RunOutcome::Failed);

        let report = WalletRunReport::finish(0, "w".into(), 2, vec![ok()], true);
        assert_eq!(report.outcome, RunOutcome::Interrupted);
    }

    #[test]
    fn session_summary_and_json() {
        let mut report = SessionReport::default();
        report.record(
            PassReport::new(
                1,
                vec![
                    WalletRunReport::aborted(1, "b".into(), 2, "proxy unreachable"),
                    WalletRunReport::finish(0, "a".into(), 0, vec![], false),
                ],
            ),
            None,
        );

        assert_eq!(report.passes[0].wallets[0].wallet_index, 0);
        let summary = report.summary();
        assert_eq!(summary.wallet_runs, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"outcome\": \"failed\""));
        assert!(json.contains("proxy unreachable"));
        assert!(json.contains("\"wallet_runs\": 2"));
    }

    #[test]
    fn bounded_history_keeps_totals() {
        let mut report = SessionReport::default();
        for pass in 1..=5 {
            let wallet = WalletRunReport::finish(0, "a".into(), 0, vec![], false);
            report.record(PassReport::new(pass, vec![wallet]), Some(2));
        }

        let kept: Vec<_> = report.passes.iter().map(|p| p.pass).collect();
        assert_eq!(kept, vec![4, 5]);
        assert_eq!(report.dropped_passes(), 3);
        assert_eq!(report.summary().passes, 5);
        assert_eq!(report.summary().completed, 5);
    }
}
