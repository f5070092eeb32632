//! Run metrics and progress counters.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use metrics::{Counter, Histogram, counter, histogram};

/// Bridge run metrics. Recorded through the global `metrics` recorder, which
/// is a no-op unless the binary installs an exporter.
#[derive(Clone)]
pub struct BridgeMetrics {
    /// Wallet flows started
    pub wallets_started: Counter,

    /// Wallet flows that ended without a failed hop
    pub wallets_completed: Counter,

    /// Wallet flows that ended with at least one failed hop
    pub wallets_failed: Counter,

    /// Orders accepted by a source chain
    pub hops_submitted: Counter,

    /// Orders the bridge reported as executed
    pub hops_confirmed: Counter,

    /// Orders that failed or timed out
    pub hops_failed: Counter,

    /// Seconds from broadcast to a terminal bridge status
    pub confirmation_seconds: Histogram,
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self {
            wallets_started: counter!("hopper.wallets_started"),
            wallets_completed: counter!("hopper.wallets_completed"),
            wallets_failed: counter!("hopper.wallets_failed"),
            hops_submitted: counter!("hopper.hops_submitted"),
            hops_confirmed: counter!("hopper.hops_confirmed"),
            hops_failed: counter!("hopper.hops_failed"),
            confirmation_seconds: histogram!("hopper.confirmation_seconds"),
        }
    }
}

impl BridgeMetrics {
    #[inline]
    pub fn record_wallet_started(&self) {
        self.wallets_started.increment(1);
    }

    #[inline]
    pub fn record_wallet_finished(&self, success: bool) {
        if success {
            self.wallets_completed.increment(1);
        } else {
            self.wallets_failed.increment(1);
        }
    }

    #[inline]
    pub fn record_hop_submitted(&self) {
        self.hops_submitted.increment(1);
    }

    #[inline]
    pub fn record_hop_confirmed(&self, duration_secs: f64) {
        self.hops_confirmed.increment(1);
        self.confirmation_seconds.record(duration_secs);
    }

    #[inline]
    pub fn record_hop_failed(&self) {
        self.hops_failed.increment(1);
    }
}

/// Live counters shared by every worker of a session.
#[derive(Debug, Default)]
pub struct RunProgress {
    wallets_done: AtomicU64,
    wallets_in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    hops_confirmed: AtomicU64,
    hops_failed: AtomicU64,
}

/// Point-in-time copy of [`RunProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub wallets_done: u64,
    pub wallets_in_flight: u64,
    pub peak_in_flight: u64,
    pub hops_confirmed: u64,
    pub hops_failed: u64,
}

impl RunProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn wallet_started(&self) {
        let now = self.wallets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub fn wallet_finished(&self) {
        self.wallets_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.wallets_done.fetch_add(1, Ordering::SeqCst);
    }

    pub fn hop_confirmed(&self) {
        self.hops_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hop_failed(&self) {
        self.hops_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            wallets_done: self.wallets_done.load(Ordering::SeqCst),
            wallets_in_flight: self.wallets_in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            hops_confirmed: self.hops_confirmed.load(Ordering::Relaxed),
            hops_failed: self.hops_failed.load(Ordering::Relaxed),
        }
    }
}
