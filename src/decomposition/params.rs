//! Decomposition strategies, policies and parameters

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis or axes along which a domain is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecompositionStrategy {
    /// Issue the domain as one request
    None,
    /// Split the source list
    Horizontal,
    /// Split the time range
    Vertical,
    /// Split both: source groups outer, time splits inner
    Grid,
}

impl fmt::Display for DecompositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecompositionStrategy::None => "NONE",
            DecompositionStrategy::Horizontal => "HORIZONTAL",
            DecompositionStrategy::Vertical => "VERTICAL",
            DecompositionStrategy::Grid => "GRID",
        };
        write!(f, "{}", name)
    }
}

/// Rule for picking a strategy from the per-axis split counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionPolicy {
    /// Split each axis that exceeds its maximum; GRID when both do
    #[default]
    Default,
    /// Split only the larger axis unless the full grid fits the grid limit
    ///
    /// When both axes exceed their maxima, GRID is chosen only if
    /// `horizontal * vertical` is at most the decomposer's grid limit, which
    /// `RequestDecomposer::from_config` sets to `streams.max_streams`. A
    /// decomposer built without a grid limit never selects GRID here.
    Preferred,
}

impl fmt::Display for DecompositionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompositionPolicy::Default => write!(f, "default"),
            DecompositionPolicy::Preferred => write!(f, "preferred"),
        }
    }
}

/// Strategy plus per-axis sub-request counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompositionParameters {
    /// Chosen strategy
    pub strategy: DecompositionStrategy,
    /// Source groups
    pub horizontal: usize,
    /// Time splits
    pub vertical: usize,
}

impl DecompositionParameters {
    /// Parameters for an undivided request
    pub fn none() -> Self {
        Self {
            strategy: DecompositionStrategy::None,
            horizontal: 1,
            vertical: 1,
        }
    }

    /// Check the strategy agrees with the counts
    pub fn validate(&self) -> Result<()> {
        if self.horizontal == 0 || self.vertical == 0 {
            return Err(Error::IllegalState(format!(
                "zero split count in {}",
                self
            )));
        }
        let consistent = match self.strategy {
            DecompositionStrategy::None => self.horizontal == 1 && self.vertical == 1,
            DecompositionStrategy::Horizontal => self.vertical == 1,
            DecompositionStrategy::Vertical => self.horizontal == 1,
            DecompositionStrategy::Grid => true,
        };
        if consistent {
            Ok(())
        } else {
            Err(Error::IllegalState(format!(
                "strategy does not match counts in {}",
                self
            )))
        }
    }

    /// Upper bound on sub-requests produced
    pub fn sub_domain_count(&self) -> usize {
        self.horizontal * self.vertical
    }

    /// True unless the strategy is NONE
    pub fn is_decomposed(&self) -> bool {
        self.strategy != DecompositionStrategy::None
    }
}

impl Default for DecompositionParameters {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for DecompositionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}x{})",
            self.strategy, self.horizontal, self.vertical
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(DecompositionParameters::none().validate().is_ok());
        let bad = DecompositionParameters {
            strategy: DecompositionStrategy::None,
            horizontal: 2,
            vertical: 1,
        };
        assert!(matches!(bad.validate(), Err(Error::IllegalState(_))));
        let zero = DecompositionParameters {
            strategy: DecompositionStrategy::Grid,
            horizontal: 0,
            vertical: 3,
        };
        assert!(zero.validate().is_err());
        let vertical = DecompositionParameters {
            strategy: DecompositionStrategy::Vertical,
            horizontal: 1,
            vertical: 4,
        };
        assert!(vertical.validate().is_ok());
        assert_eq!(vertical.sub_domain_count(), 4);
        assert_eq!(vertical.to_string(), "VERTICAL(1x4)");
    }

    #[test]
    fn test_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: DecompositionPolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"preferred\"").unwrap();
        assert_eq!(parsed.policy, DecompositionPolicy::Preferred);
    }
}
