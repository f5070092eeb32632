//! Error taxonomy for the bridge engine.

use std::{path::PathBuf, time::Duration};

use alloy::primitives::U256;

/// Protocol error code the bridge returns while it is temporarily saturated.
pub const BRIDGE_BUSY_CODE: &str = "RO#7";

/// How [`crate::RetryPolicy`] treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Abort immediately.
    Fatal,
    /// Retry against the general attempt budget.
    Transient,
    /// Retry against the bridge-busy attempt budget.
    Busy,
}

/// Errors raised while submitting or tracking a hop.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("unknown chain `{0}`")]
    UnknownChain(String),

    #[error("insufficient balance on {chain}: have {available} wei, need {required} wei")]
    InsufficientBalance {
        chain: String,
        available: U256,
        required: U256,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("rpc error on {chain}: {message}")]
    Rpc { chain: String, message: String },

    #[error("transaction rejected on {chain}: {reason}")]
    Rejected { chain: String, reason: String },

    #[error("bridge api request timed out after {0:?}")]
    BridgeApiTimeout(Duration),

    #[error("bridge api error: {message}")]
    BridgeApi { message: String, permanent: bool },

    #[error("bridge temporarily saturated (RO#7): {0}")]
    RetryableBridgeBusy(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<BridgeError>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Rpc { .. } | Self::BridgeApiTimeout(_) => RetryClass::Transient,
            Self::BridgeApi { permanent, .. } => {
                if *permanent {
                    RetryClass::Fatal
                } else {
                    RetryClass::Transient
                }
            }
            Self::RetryableBridgeBusy(_) => RetryClass::Busy,
            Self::UnknownChain(_)
            | Self::InsufficientBalance { .. }
            | Self::Signing(_)
            | Self::Client(_)
            | Self::Rejected { .. }
            | Self::RetriesExhausted { .. }
            | Self::Cancelled => RetryClass::Fatal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The innermost error, unwrapping any `RetriesExhausted` layers.
    pub fn root(&self) -> &Self {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Classifies a node-side failure message from `chain`.
    ///
    /// `RO#7` reverts are the bridge signalling saturation. Other reverts and
    /// funding problems are final answers from the node; everything else is
    /// treated as transport trouble.
    pub fn from_node_message(chain: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if message.contains(BRIDGE_BUSY_CODE) {
            Self::RetryableBridgeBusy(message)
        } else if lower.contains("execution reverted")
            || lower.contains("insufficient funds")
            || lower.contains("intrinsic gas too low")
            || lower.contains("invalid sender")
        {
            Self::Rejected {
                chain: chain.to_string(),
                reason: message,
            }
        } else {
            Self::Rpc {
                chain: chain.to_string(),
                message,
            }
        }
    }
}

/// Startup errors: configuration and input files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in `{path}`")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid toml in `{path}`")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("chain `{chain}`: {reason}")]
    Chain { chain: String, reason: String },

    #[error("hop {index} references unknown chain `{chain}`")]
    UnknownHopChain { index: usize, chain: String },

    #[error("hop {index} bridges `{chain}` to itself")]
    SelfHop { index: usize, chain: String },

    #[error("custom_flow is enabled but bridge_paths is empty")]
    EmptyFlow,

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid private key on line {line}")]
    PrivateKey { line: usize },

    #[error("no private keys found in `{0}`")]
    NoWallets(PathBuf),

    #[error("invalid proxy `{proxy}`: {reason}")]
    Proxy { proxy: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_node_messages() {
        let busy = BridgeError::from_node_message(
            "base_sepolia",
            "server returned an error response: execution reverted: RO#7",
        );
        assert_eq!(busy.retry_class(), RetryClass::Busy);

        let revert =
            BridgeError::from_node_message("base_sepolia", "execution reverted: paused");
        assert!(matches!(revert, BridgeError::Rejected { .. }));
        assert_eq!(revert.retry_class(), RetryClass::Fatal);

        let transport = BridgeError::from_node_message("base_sepolia", "connection reset by peer");
        assert_eq!(transport.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn permanent_api_errors_are_fatal() {
        let err = BridgeError::BridgeApi {
            message: "400 bad request".into(),
            permanent: true,
        };
        assert_eq!(err.retry_class(), RetryClass::Fatal);

        let err = BridgeError::BridgeApi {
            message: "502 bad gateway".into(),
            permanent: false,
        };
        assert_eq!(err.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn root_unwraps_exhaustion() {
        let err = BridgeError::RetriesExhausted {
            attempts: 3,
            last: Box::new(BridgeError::BridgeApiTimeout(Duration::from_secs(30))),
        };
        assert!(matches!(err.root(), BridgeError::BridgeApiTimeout(_)));
        assert_eq!(err.retry_class(), RetryClass::Fatal);
    }
}
