//! Running normalization of predicted rewards.
//!
//! Raw network outputs drift in scale as training proceeds. The wrapper feeds
//! every prediction through a [`RewardNormalizer`] so the agent sees rewards
//! with zero mean and a fixed standard deviation of [`REWARD_SCALE`].

use serde::{Deserialize, Serialize};

/// Standard deviation of normalized rewards.
pub const REWARD_SCALE: f64 = 0.05;

const STD_EPSILON: f64 = 1e-8;

/// Welford running mean and variance.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardNormalizer {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RewardNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the values seen so far.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        #[expect(clippy::cast_precision_loss)]
        let n = self.count as f64;
        (self.m2 / n).sqrt()
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        #[expect(clippy::cast_precision_loss)]
        let n = self.count as f64;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);
    }

    /// Records `raw` and returns it normalized against all values seen so far.
    #[expect(clippy::cast_possible_truncation)]
    pub fn normalize(&mut self, raw: f32) -> f32 {
        let raw = f64::from(raw);
        self.update(raw);
        ((raw - self.mean) / (self.std_dev() + STD_EPSILON) * REWARD_SCALE) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_statistics() {
        let mut norm = RewardNormalizer::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            norm.update(v);
        }
        assert_eq!(norm.count(), 8);
        assert!((norm.mean() - 5.0).abs() < 1e-12);
        assert!((norm.std_dev() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_input_normalizes_to_zero() {
        let mut norm = RewardNormalizer::new();
        for _ in 0..10 {
            assert!(norm.normalize(3.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_normalized_scale() {
        let mut norm = RewardNormalizer::new();
        for v in [0.0, 10.0, 0.0, 10.0] {
            norm.normalize(v);
        }
        // mean 5, std 5
        let value = norm.normalize(10.0);
        assert!(value > 0.0);
        assert!(value < 0.1);
    }
}
