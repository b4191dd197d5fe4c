//! Cancellation policies applied to freshly queued batches
//!
//! A policy is consulted once per task before any task of the batch is
//! queued, so the tasks it picks are withdrawn without ever reaching the
//! dispatcher.

use rand::Rng;
use std::collections::HashSet;

use crate::config::CancellationConfig;

/// Decides which tasks of a batch to withdraw before they start
pub trait CancellationPolicy: Send + Sync {
    /// Return `true` to withdraw the task for the `index`-th source
    fn should_cancel(&self, index: usize, source: &str) -> bool;
}

/// Never withdraws anything
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancellationPolicy for NeverCancel {
    fn should_cancel(&self, _index: usize, _source: &str) -> bool {
        false
    }
}

/// Withdraws each task past a protected prefix with a fixed probability
#[derive(Clone, Copy, Debug)]
pub struct RandomCancel {
    probability: f64,
    protected_prefix: usize,
}

impl RandomCancel {
    /// Create a policy; `probability` is clamped to `0.0..=1.0`, NaN means never
    pub fn new(probability: f64, protected_prefix: usize) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            probability,
            protected_prefix,
        }
    }

    /// Policy described by the cancellation settings
    pub fn from_config(config: &CancellationConfig) -> Self {
        Self::new(config.probability, config.protected_prefix)
    }
}

impl CancellationPolicy for RandomCancel {
    fn should_cancel(&self, index: usize, _source: &str) -> bool {
        if index < self.protected_prefix {
            return false;
        }
        rand::thread_rng().gen_bool(self.probability)
    }
}

/// Withdraws exactly the tasks at the given positions
#[derive(Clone, Debug, Default)]
pub struct CancelIndices {
    indices: HashSet<usize>,
}

impl CancelIndices {
    /// Withdraw the tasks at `indices`
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }
}

impl CancellationPolicy for CancelIndices {
    fn should_cancel(&self, index: usize, _source: &str) -> bool {
        self.indices.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_prefix_is_never_cancelled() {
        let policy = RandomCancel::new(1.0, 3);
        for index in 0..3 {
            assert!(!policy.should_cancel(index, "src"));
        }
        for index in 3..9 {
            assert!(policy.should_cancel(index, "src"));
        }
    }

    #[test]
    fn zero_probability_never_cancels() {
        let policy = RandomCancel::new(0.0, 0);
        assert!((0..100).all(|i| !policy.should_cancel(i, "src")));
    }

    #[test]
    fn probability_is_clamped() {
        let policy = RandomCancel::new(7.0, 0);
        assert!(policy.should_cancel(0, "src"));
        let policy = RandomCancel::new(-1.0, 0);
        assert!(!policy.should_cancel(0, "src"));
    }

    #[test]
    fn nan_probability_never_cancels() {
        let policy = RandomCancel::new(f64::NAN, 0);
        assert!((0..100).all(|i| !policy.should_cancel(i, "src")));
    }

    #[test]
    fn from_config_uses_configured_values() {
        let policy = RandomCancel::from_config(&CancellationConfig {
            enabled: true,
            probability: 1.0,
            protected_prefix: 2,
        });
        assert!(!policy.should_cancel(1, "src"));
        assert!(policy.should_cancel(2, "src"));
    }

    #[test]
    fn cancel_indices_matches_positions() {
        let policy = CancelIndices::new([1, 4]);
        let picked: Vec<_> = (0..6).filter(|&i| policy.should_cancel(i, "src")).collect();
        assert_eq!(picked, vec![1, 4]);
        assert!(!NeverCancel.should_cancel(0, "src"));
    }
}
