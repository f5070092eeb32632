//! Bridge automation engine.
//!
//! Moves native tokens between EVM testnets through an intent-based bridge,
//! running a configured flow of hops for many wallets in parallel and
//! tracking each order until the bridge reports it executed.

pub mod chains;
pub mod config;
pub mod error;
pub mod flow;
pub mod inputs;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod signer;
pub mod status;

pub use chains::{ChainConfig, ChainRegistry};
pub use config::RunConfig;
pub use error::{BridgeError, ConfigError};
pub use flow::{BridgePath, Flow};
pub use inputs::{ProxyPool, WalletCredential};
pub use orchestrator::{BridgeOrchestrator, WalletSession};
pub use report::{HopResult, HopStatus, RunOutcome, SessionReport, WalletRunReport};
pub use retry::RetryPolicy;
pub use scheduler::{LiveSessionFactory, RunSession, SessionFactory, WalletScheduler};
pub use signer::{HopSubmitter, TransactionSigner};
pub use status::{BridgeApi, BridgeState, BridgeStatusClient};
