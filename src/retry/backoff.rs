//! Backoff strategies mapping an attempt number to a delay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the delay before a retry grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always `base_delay`.
    #[serde(alias = "FIXED")]
    Fixed,
    /// `base_delay * attempt`.
    #[serde(alias = "LINEAR")]
    Linear,
    /// `base_delay * multiplier^(attempt - 1)`.
    #[default]
    #[serde(alias = "EXPONENTIAL")]
    Exponential,
    /// Exponential, randomized within `± jitter_factor`.
    #[serde(alias = "EXPONENTIAL_JITTER")]
    ExponentialJitter,
    /// Uniformly random in `[base_delay, max_delay]`.
    #[serde(alias = "RANDOM")]
    Random,
}

impl BackoffStrategy {
    /// Returns the name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
            Self::ExponentialJitter => "exponential_jitter",
            Self::Random => "random",
        }
    }

    /// Returns `true` if the computed delay is capped at `max_delay`.
    pub fn is_capped(&self) -> bool {
        !matches!(self, Self::Random)
    }

    /// Returns `true` if the computed delay involves randomness.
    pub fn is_randomized(&self) -> bool {
        matches!(self, Self::ExponentialJitter | Self::Random)
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_exponential() {
        assert_eq!(BackoffStrategy::default(), BackoffStrategy::Exponential);
    }

    #[test]
    fn test_only_random_is_uncapped() {
        assert!(BackoffStrategy::Fixed.is_capped());
        assert!(BackoffStrategy::ExponentialJitter.is_capped());
        assert!(!BackoffStrategy::Random.is_capped());
    }
}
