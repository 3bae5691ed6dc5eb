use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Observation;

/// An action taken in an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Discrete(usize),
    MultiDiscrete(Vec<usize>),
}

/// Set of valid actions for an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSpace {
    /// Actions `0..n`.
    Discrete(usize),
    /// One discrete choice per component; component `i` ranges over `0..nvec[i]`.
    MultiDiscrete(Vec<usize>),
}

impl ActionSpace {
    /// Samples an action uniformly at random.
    ///
    /// # Panics
    ///
    /// Panics if the space is empty (`Discrete(0)` or a zero component).
    pub fn sample<R>(&self, rng: &mut R) -> Action
    where
        R: Rng + ?Sized,
    {
        match self {
            Self::Discrete(n) => Action::Discrete(rng.random_range(0..*n)),
            Self::MultiDiscrete(nvec) => {
                Action::MultiDiscrete(nvec.iter().map(|n| rng.random_range(0..*n)).collect())
            }
        }
    }

    #[must_use]
    pub fn contains(&self, action: &Action) -> bool {
        match (self, action) {
            (Self::Discrete(n), Action::Discrete(a)) => a < n,
            (Self::MultiDiscrete(nvec), Action::MultiDiscrete(a)) => {
                nvec.len() == a.len() && a.iter().zip(nvec).all(|(a, n)| a < n)
            }
            _ => false,
        }
    }

    /// Number of distinct actions in the space.
    #[must_use]
    pub fn flat_len(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::MultiDiscrete(nvec) => nvec.iter().product(),
        }
    }
}

/// Box-shaped observation space with scalar bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    shape: Vec<usize>,
    low: f32,
    high: f32,
}

impl BoxSpace {
    /// Creates a box space.
    ///
    /// # Panics
    ///
    /// Panics if `low > high`.
    #[must_use]
    pub fn new(shape: Vec<usize>, low: f32, high: f32) -> Self {
        assert!(low <= high, "low bound must not exceed high bound");
        Self { shape, low, high }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn low(&self) -> f32 {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> f32 {
        self.high
    }

    /// Returns a copy of this space with a different shape and the same bounds.
    #[must_use]
    pub fn with_shape(&self, shape: Vec<usize>) -> Self {
        Self {
            shape,
            low: self.low,
            high: self.high,
        }
    }

    /// Samples an observation uniformly within the bounds.
    pub fn sample<R>(&self, rng: &mut R) -> Observation
    where
        R: Rng + ?Sized,
    {
        let len = self.shape.iter().product::<usize>();
        let data = (0..len)
            .map(|_| rng.random_range(self.low..=self.high))
            .collect();
        Observation::from_parts(self.shape.clone(), data)
    }

    #[must_use]
    pub fn contains(&self, obs: &Observation) -> bool {
        obs.shape() == self.shape
            && obs
                .data()
                .iter()
                .all(|v| (self.low..=self.high).contains(v))
    }
}
