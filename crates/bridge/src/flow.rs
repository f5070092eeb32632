//! Hop sequences and the random draws that parameterize them.

use std::{fmt, time::Duration};

use alloy::primitives::{U256, utils::parse_ether};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{chains::ChainRegistry, error::ConfigError};

/// Decimal places kept when drawing an amount.
const AMOUNT_DECIMALS: i32 = 5;

/// Inclusive range, in whole native tokens, that hop amounts are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min <= 0.0 {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("min must be a positive number, got {}", self.min),
            });
        }
        if self.min > self.max {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        Ok(())
    }

    /// Uniform draw from `[min, max]`, rounded to five decimals.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        let raw = if self.min < self.max {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        let scale = 10f64.powi(AMOUNT_DECIMALS);
        ((raw * scale).round() / scale).clamp(self.min, self.max)
    }

    pub fn min_wei(&self) -> U256 {
        to_wei(self.min)
    }
}

/// Converts a token amount to wei through its five-decimal representation.
pub fn to_wei(amount: f64) -> U256 {
    parse_ether(&format!("{amount:.5}")).unwrap_or(U256::ZERO)
}

/// One source -> destination transfer in a [`Flow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgePath {
    pub from_chain: String,
    pub to_chain: String,
    /// Overrides the global amount range for this hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountRange>,
}

impl BridgePath {
    pub fn new(from_chain: impl Into<String>, to_chain: impl Into<String>) -> Self {
        Self {
            from_chain: from_chain.into(),
            to_chain: to_chain.into(),
            amount: None,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            from_chain: self.to_chain.clone(),
            to_chain: self.from_chain.clone(),
            amount: self.amount,
        }
    }
}

impl fmt::Display for BridgePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from_chain, self.to_chain)
    }
}

/// A hop ready to run: path plus the amount range that applies to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub path: BridgePath,
    pub amount: AmountRange,
}

/// Ordered hops executed for one wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    hops: Vec<Hop>,
}

impl Flow {
    /// The fixed round trip `route.from -> route.to -> route.from`.
    pub fn round_trip(route: &BridgePath, amount: AmountRange) -> Self {
        let amount = route.amount.unwrap_or(amount);
        let outbound = BridgePath {
            amount: None,
            ..route.clone()
        };
        let inbound = outbound.reversed();
        Self {
            hops: vec![
                Hop {
                    path: outbound,
                    amount,
                },
                Hop {
                    path: inbound,
                    amount,
                },
            ],
        }
    }

    /// A user-declared sequence.
    pub fn custom(paths: &[BridgePath], amount: AmountRange) -> Self {
        Self {
            hops: paths
                .iter()
                .map(|path| Hop {
                    amount: path.amount.unwrap_or(amount),
                    path: path.clone(),
                })
                .collect(),
        }
    }

    /// Checks every hop against `registry`.
    pub fn validate(&self, registry: &ChainRegistry) -> Result<(), ConfigError> {
        if self.hops.is_empty() {
            return Err(ConfigError::EmptyFlow);
        }
        for (index, hop) in self.hops.iter().enumerate() {
            for chain in [&hop.path.from_chain, &hop.path.to_chain] {
                if !registry.contains(chain) {
                    return Err(ConfigError::UnknownHopChain {
                        index,
                        chain: chain.clone(),
                    });
                }
            }
            if hop.path.from_chain == hop.path.to_chain {
                return Err(ConfigError::SelfHop {
                    index,
                    chain: hop.path.from_chain.clone(),
                });
            }
            hop.amount.validate("bridge_paths.amount")?;
        }
        Ok(())
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i == 0 {
                write!(f, "{}", hop.path.from_chain)?;
            } else if self.hops[i - 1].path.to_chain != hop.path.from_chain {
                write!(f, " | {}", hop.path.from_chain)?;
            }
            write!(f, " -> {}", hop.path.to_chain)?;
        }
        Ok(())
    }
}

/// A pause, either fixed or drawn uniformly from a range. Values are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelaySpec {
    Fixed(f64),
    Range([f64; 2]),
    Bounds { min: f64, max: f64 },
}

impl Default for DelaySpec {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

impl DelaySpec {
    fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Fixed(secs) => (secs, secs),
            Self::Range([min, max]) | Self::Bounds { min, max } => (min, max),
        }
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        let (min, max) = self.bounds();
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("expected non-negative seconds with min <= max, got {min}..{max}"),
            });
        }
        Ok(())
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        let (min, max) = self.bounds();
        let secs = if min < max {
            rng.gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}
