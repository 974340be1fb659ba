//! Weighting strategies: map a peer's ledger receipt to a round weight.
//!
//! A weight of zero means the peer receives no bytes in the next round.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use blockswap_types::Receipt;

use crate::DecisionError;

/// Caller-supplied weighting function. Must be pure.
pub type WeightFn = dyn Fn(&Receipt) -> f64 + Send + Sync;

/// How a peer's receipt turns into its share of the round burst.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The receipt value itself, floored at zero.
    #[default]
    Simple,
    /// Logistic curve `100 / (1 + e^(2 - value))`.
    Exponential,
    /// `100 * tanh(value)` for positive values, zero otherwise.
    Tanh,
    #[serde(skip)]
    Custom(Arc<WeightFn>),
}

impl Strategy {
    pub const NAMES: [&'static str; 3] = ["simple", "exponential", "tanh"];

    /// Wrap a pure weighting function.
    pub fn custom(f: impl Fn(&Receipt) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Raw strategy output, before sanitising.
    pub fn raw_weight(&self, receipt: &Receipt) -> f64 {
        let value = receipt.value;
        match self {
            Self::Simple => {
                if value <= 0.0 {
                    0.0
                } else {
                    value
                }
            }
            Self::Exponential => 100.0 / (1.0 + (2.0 - value).exp()),
            Self::Tanh => {
                if value <= 0.0 {
                    0.0
                } else {
                    100.0 * value.tanh()
                }
            }
            Self::Custom(f) => f(receipt),
        }
    }

    /// Weight for `receipt`; always finite and nonnegative.
    pub fn weight(&self, receipt: &Receipt) -> f64 {
        let raw = self.raw_weight(receipt);
        if raw.is_finite() && raw >= 0.0 {
            raw
        } else {
            tracing::warn!(
                peer = %receipt.peer,
                strategy = %self,
                weight = raw,
                "strategy produced an invalid weight, using zero"
            );
            0.0
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Exponential => "exponential",
            Self::Tanh => "tanh",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy::{}", self.name())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialEq for Strategy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            (Self::Custom(_), _) | (_, Self::Custom(_)) => false,
            _ => self.name() == other.name(),
        }
    }
}

impl FromStr for Strategy {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "exponential" => Ok(Self::Exponential),
            "tanh" => Ok(Self::Tanh),
            _ => Err(DecisionError::UnknownStrategy(s.to_string())),
        }
    }
}
