//! Reward networks mapping one observation to a scalar reward.
//!
//! Networks expose their parameters as a flat `f32` slice so the optimizer and
//! checkpoints can treat every architecture the same way.
//!
//! # Architectures
//!
//! Both networks first average-pool the flattened observation into a fixed
//! number of bins (see [`pool`]), which keeps the parameter count independent
//! of the observation size (a 64x64x3 image stacked four times is 49 152
//! values):
//!
//! - [`PooledMlp`] - One hidden layer with leaky-ReLU activation
//! - [`PooledLinear`] - Weighted sum of the pooled features
//!
//! [`NetworkSpec`] names an architecture and its dimensions; it is what
//! configurations and checkpoints store.

use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::RewardError;

pub use self::{linear::PooledLinear, mlp::PooledMlp};

pub mod init;
mod linear;
mod mlp;

/// Pixel intensities are scaled into `[0, 1]` before pooling.
pub const INPUT_SCALE: f32 = 1.0 / 255.0;

pub const DEFAULT_BINS: usize = 64;
pub const DEFAULT_HIDDEN: usize = 32;

pub trait RewardNetwork: fmt::Debug + Send + Sync {
    fn spec(&self) -> NetworkSpec;

    fn params(&self) -> &[f32];

    fn params_mut(&mut self) -> &mut [f32];

    /// Predicted reward for a flattened observation.
    #[must_use]
    fn forward(&self, obs: &[f32]) -> f32;

    /// Accumulates `grad_out * ∂forward(obs)/∂params` into `grads`.
    fn backward(&self, obs: &[f32], grad_out: f32, grads: &mut [f32]);

    fn clone_boxed(&self) -> BoxedRewardNetwork;
}

pub type BoxedRewardNetwork = Box<dyn RewardNetwork>;

impl Clone for BoxedRewardNetwork {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Architecture and dimensions of a reward network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkSpec {
    PooledMlp { bins: usize, hidden: usize },
    PooledLinear { bins: usize },
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self::PooledMlp {
            bins: DEFAULT_BINS,
            hidden: DEFAULT_HIDDEN,
        }
    }
}

impl NetworkSpec {
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::PooledMlp { .. } => "pooled_mlp",
            Self::PooledLinear { .. } => "pooled_linear",
        }
    }

    /// Number of parameters a network of this spec has.
    #[must_use]
    pub fn param_count(&self) -> usize {
        match *self {
            Self::PooledMlp { bins, hidden } => hidden * bins + hidden + hidden + 1,
            Self::PooledLinear { bins } => bins + 1,
        }
    }

    /// Checks that every dimension is positive.
    pub fn validate(&self) -> Result<(), RewardError> {
        let reason = match *self {
            Self::PooledMlp { bins: 0, .. } | Self::PooledLinear { bins: 0 } => {
                "bins must be positive"
            }
            Self::PooledMlp { hidden: 0, .. } => "hidden must be positive",
            Self::PooledMlp { .. } | Self::PooledLinear { .. } => return Ok(()),
        };
        Err(RewardError::InvalidSpec { spec: *self, reason })
    }

    /// Builds a freshly initialized network.
    ///
    /// # Panics
    ///
    /// Panics if a dimension is zero; see [`NetworkSpec::validate`].
    pub fn build<R>(&self, rng: &mut R) -> BoxedRewardNetwork
    where
        R: Rng + ?Sized,
    {
        match *self {
            Self::PooledMlp { bins, hidden } => Box::new(PooledMlp::new(bins, hidden, rng)),
            Self::PooledLinear { bins } => Box::new(PooledLinear::new(bins, rng)),
        }
    }

    /// Builds a network holding the given parameters.
    pub fn build_with_params(&self, params: &[f32]) -> Result<BoxedRewardNetwork, RewardError> {
        self.validate()?;
        if params.len() != self.param_count() {
            return Err(RewardError::ParamCountMismatch {
                expected: self.param_count(),
                actual: params.len(),
            });
        }
        // parameters are overwritten, so the initialization seed is irrelevant
        let mut rng = rand::rng();
        let mut network = self.build(&mut rng);
        network.params_mut().copy_from_slice(params);
        Ok(network)
    }
}

impl FromStr for NetworkSpec {
    type Err = RewardError;

    /// Parses a network id into a spec with default dimensions.
    fn from_str(id: &str) -> Result<Self, Self::Err> {
        match id {
            "pooled_mlp" => Ok(Self::default()),
            "pooled_linear" => Ok(Self::PooledLinear { bins: DEFAULT_BINS }),
            _ => Err(RewardError::UnknownNetwork { id: id.to_owned() }),
        }
    }
}

/// Average-pools `obs` into `out.len()` contiguous bins, scaled by [`INPUT_SCALE`].
///
/// Each bin covers `ceil(obs.len() / bins)` consecutive values; trailing bins
/// that cover no values are zero.
pub fn pool(obs: &[f32], out: &mut [f32]) {
    let bins = out.len();
    if bins == 0 {
        return;
    }
    let chunk = obs.len().div_ceil(bins).max(1);
    out.fill(0.0);
    for (bin, values) in out.iter_mut().zip(obs.chunks(chunk)) {
        #[expect(clippy::cast_precision_loss)]
        let n = values.len() as f32;
        *bin = values.iter().sum::<f32>() / n * INPUT_SCALE;
    }
}
