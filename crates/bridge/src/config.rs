//! Run configuration: file format, defaults and validation.
//!
//! The file is JSON (or TOML when the extension is `.toml`) and is decoded into
//! the `*Section` structs, then validated once into an immutable [`RunConfig`]
//! that the scheduler and orchestrators share by `Arc`.

use std::{path::Path, time::Duration};

use alloy::primitives::Address;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chains::{ChainConfig, ChainRegistry, default_native_asset},
    error::ConfigError,
    flow::{AmountRange, BridgePath, DelaySpec, Flow},
    retry::RetryPolicy,
};

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default)]
    pub retries: RetriesSection,
    pub bridge: BridgeSection,
    #[serde(default)]
    pub delay: DelaySection,
    pub chains: IndexMap<String, ChainSection>,
    pub api: ApiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetriesSection {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    /// Seconds.
    pub initial_wait: f64,
    pub busy_max_attempts: u32,
    /// Seconds.
    pub busy_wait: f64,
    pub jitter: f64,
}

impl Default for RetriesSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            initial_wait: 1.0,
            busy_max_attempts: 100,
            busy_wait: 1.0,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u64,
    #[serde(default)]
    pub continuous: bool,
    pub amount: AmountRange,
    #[serde(default = "default_gas_multiplier")]
    pub gas_multiplier: f64,
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
    /// Seconds.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout: f64,
    /// Seconds.
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval: f64,
    #[serde(default = "default_true")]
    pub use_estimate: bool,
    #[serde(default)]
    pub custom_flow: bool,
    #[serde(default = "default_route")]
    pub default_route: BridgePath,
    #[serde(default)]
    pub bridge_paths: Vec<BridgePath>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySection {
    pub between_wallets: DelaySpec,
    pub between_bridges: DelaySpec,
    pub after_completion: DelaySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSection {
    pub chain_id: u64,
    pub rpc_url: String,
    pub bridge_contract: String,
    pub api_name: String,
    #[serde(default)]
    pub native_asset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    /// Seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout: f64,
}

const fn default_thread_count() -> usize {
    1
}

const fn default_repeat_count() -> u64 {
    1
}

const fn default_gas_multiplier() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

const fn default_completion_timeout() -> f64 {
    15.0 * 60.0
}

const fn default_status_poll_interval() -> f64 {
    5.0
}

const fn default_api_timeout() -> f64 {
    30.0
}

fn default_route() -> BridgePath {
    BridgePath::new("base_sepolia", "optimism_sepolia")
}

/// Validated retry parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub initial_wait: Duration,
    pub busy_max_attempts: u32,
    pub busy_wait: Duration,
    pub jitter: f64,
}

/// Validated bridge behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub repeat_count: u64,
    pub continuous: bool,
    pub amount: AmountRange,
    pub gas_multiplier: f64,
    pub wait_for_completion: bool,
    pub completion_timeout: Duration,
    pub status_poll_interval: Duration,
    pub use_estimate: bool,
    pub custom_flow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelaySettings {
    pub between_wallets: DelaySpec,
    pub between_bridges: DelaySpec,
    pub after_completion: DelaySpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

/// Immutable, validated configuration for one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub use_proxy: bool,
    pub thread_count: usize,
    pub retry: RetrySettings,
    pub bridge: BridgeSettings,
    pub delay: DelaySettings,
    pub api: ApiSettings,
    chains: ChainRegistry,
    flow: Flow,
}

impl RunConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file: ConfigFile = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&raw).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };

        Self::from_file(file)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let file = serde_json::from_str(raw).map_err(|source| ConfigError::Json {
            path: "<inline>".into(),
            source,
        })?;
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.thread_count == 0 {
            return Err(invalid("thread_count", "must be at least 1"));
        }

        let retry = validate_retries(&file.retries)?;
        let bridge = validate_bridge(&file.bridge)?;

        for (field, spec) in [
            ("delay.between_wallets", &file.delay.between_wallets),
            ("delay.between_bridges", &file.delay.between_bridges),
            ("delay.after_completion", &file.delay.after_completion),
        ] {
            spec.validate(field)?;
        }

        let chains = file
            .chains
            .iter()
            .map(|(name, section)| validate_chain(name, section))
            .collect::<Result<Vec<_>, _>>()?;
        let chains = ChainRegistry::new(chains);

        let base_url = Url::parse(&file.api.base_url)
            .map_err(|e| invalid("api.base_url", e.to_string()))?;
        let api = ApiSettings {
            base_url,
            timeout: positive_secs("api.timeout", file.api.timeout)?,
        };

        let flow = if file.bridge.custom_flow {
            Flow::custom(&file.bridge.bridge_paths, bridge.amount)
        } else {
            Flow::round_trip(&file.bridge.default_route, bridge.amount)
        };
        flow.validate(&chains)?;

        Ok(Self {
            use_proxy: file.use_proxy,
            thread_count: file.thread_count,
            retry,
            bridge,
            delay: DelaySettings {
                between_wallets: file.delay.between_wallets,
                between_bridges: file.delay.between_bridges,
                after_completion: file.delay.after_completion,
            },
            api,
            chains,
            flow,
        })
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Overrides the worker count, e.g. from the command line.
    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count.max(1);
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.bridge.continuous = continuous;
        self
    }

    /// Number of passes over the wallet list, `None` meaning unbounded.
    pub fn passes(&self) -> Option<u64> {
        match (self.bridge.continuous, self.bridge.repeat_count) {
            (false, _) => Some(1),
            (true, 0) => None,
            (true, n) => Some(n),
        }
    }

    /// Retry policy with the general and bridge-busy budgets from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            self.retry.backoff_factor,
            self.retry.initial_wait,
        )
        .with_busy_ceiling(self.retry.busy_max_attempts, self.retry.busy_wait)
        .with_jitter(self.retry.jitter)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_negative_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| invalid(field, format!("expected non-negative seconds, got {secs}")))
}

fn positive_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    let duration = non_negative_secs(field, secs)?;
    if duration.is_zero() {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(duration)
}

fn validate_retries(section: &RetriesSection) -> Result<RetrySettings, ConfigError> {
    if section.max_attempts == 0 {
        return Err(invalid("retries.max_attempts", "must be at least 1"));
    }
    if section.busy_max_attempts == 0 {
        return Err(invalid("retries.busy_max_attempts", "must be at least 1"));
    }
    if !(section.backoff_factor.is_finite() && section.backoff_factor >= 1.0) {
        return Err(invalid(
            "retries.backoff_factor",
            format!("must be >= 1, got {}", section.backoff_factor),
        ));
    }
    if !(0.0..1.0).contains(&section.jitter) {
        return Err(invalid(
            "retries.jitter",
            format!("must be in [0, 1), got {}", section.jitter),
        ));
    }
    Ok(RetrySettings {
        max_attempts: section.max_attempts,
        backoff_factor: section.backoff_factor,
        initial_wait: non_negative_secs("retries.initial_wait", section.initial_wait)?,
        busy_max_attempts: section.busy_max_attempts,
        busy_wait: non_negative_secs("retries.busy_wait", section.busy_wait)?,
        jitter: section.jitter,
    })
}

fn validate_bridge(section: &BridgeSection) -> Result<BridgeSettings, ConfigError> {
    section.amount.validate("bridge.amount")?;
    if !(section.gas_multiplier.is_finite() && section.gas_multiplier > 0.0) {
        return Err(invalid(
            "bridge.gas_multiplier",
            format!("must be positive, got {}", section.gas_multiplier),
        ));
    }
    if section.custom_flow && section.bridge_paths.is_empty() {
        return Err(ConfigError::EmptyFlow);
    }
    Ok(BridgeSettings {
        repeat_count: section.repeat_count,
        continuous: section.continuous,
        amount: section.amount,
        gas_multiplier: section.gas_multiplier,
        wait_for_completion: section.wait_for_completion,
        completion_timeout: positive_secs("bridge.completion_timeout", section.completion_timeout)?,
        status_poll_interval: non_negative_secs(
            "bridge.status_poll_interval",
            section.status_poll_interval,
        )?,
        use_estimate: section.use_estimate,
        custom_flow: section.custom_flow,
    })
}

fn validate_chain(name: &str, section: &ChainSection) -> Result<ChainConfig, ConfigError> {
    let chain_err = |reason: String| ConfigError::Chain {
        chain: name.to_string(),
        reason,
    };

    let rpc_url = Url::parse(&section.rpc_url)
        .map_err(|e| chain_err(format!("invalid rpc_url `{}`: {e}", section.rpc_url)))?;
    let bridge_contract: Address = section.bridge_contract.parse().map_err(|e| {
        chain_err(format!(
            "invalid bridge_contract `{}`: {e}",
            section.bridge_contract
        ))
    })?;
    if section.api_name.is_empty() || section.api_name.len() > 4 || !section.api_name.is_ascii() {
        return Err(chain_err(format!(
            "api_name `{}` must be 1-4 ascii characters",
            section.api_name
        )));
    }

    Ok(ChainConfig {
        name: name.to_string(),
        chain_id: section.chain_id,
        rpc_url,
        bridge_contract,
        api_code: section.api_name.clone(),
        native_asset: section
            .native_asset
            .clone()
            .unwrap_or_else(|| default_native_asset(name).to_string()),
    })
}
