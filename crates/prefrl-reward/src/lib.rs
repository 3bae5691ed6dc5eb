//! Reward prediction from pairwise segment preferences.
//!
//! This crate learns a reward function `r(observation)` such that segments
//! humans (or a synthetic oracle) prefer receive a larger predicted return.
//!
//! # How Training Works
//!
//! For a judged pair of segments `(σ₁, σ₂)` with target distribution `μ`
//! (see [`prefrl_prefs::preference::Preference::mu`]):
//!
//! ```text
//! R(σ)      = Σ_t r(o_t)                              predicted return
//! P[σ₁ ≻ σ₂] = exp R(σ₁) / (exp R(σ₁) + exp R(σ₂))     Bradley-Terry model
//! loss      = -(μ₁ ln P[σ₁ ≻ σ₂] + μ₂ ln P[σ₂ ≻ σ₁])
//! ```
//!
//! Each training step samples a batch of records from the training database,
//! back-propagates the loss through the [`network`], adds L2 regularization,
//! and applies an [`optimizer::Adam`] update.
//!
//! # Modules
//!
//! - [`network`] - Reward network trait and the pooled MLP / linear networks
//! - [`optimizer`] - Adam optimizer over flat parameter vectors
//! - [`predictor`] - Training, validation and inference
//! - [`normalizer`] - Running normalization of predicted rewards
//! - [`checkpoint`] - JSON checkpoints of trained predictors

use std::path::PathBuf;

use self::network::NetworkSpec;

pub mod checkpoint;
pub mod network;
pub mod normalizer;
pub mod optimizer;
pub mod predictor;

/// Tracing target used by reward predictor training.
pub const REWARD_PREDICTOR_TARGET: &str = "prefrl::reward_predictor";

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RewardError {
    #[display("unknown reward network `{id}`")]
    UnknownNetwork { id: String },
    #[display("invalid reward network {spec:?}: {reason}")]
    InvalidSpec {
        spec: NetworkSpec,
        reason: &'static str,
    },
    #[display("network expects {expected} parameters but {actual} were given")]
    ParamCountMismatch { expected: usize, actual: usize },
    #[display("cannot train on an empty preference database")]
    EmptyBatch,
    #[display("no reward predictor checkpoint found in {}", dir.display())]
    NoCheckpoint { dir: PathBuf },
    #[display("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("failed to read or write checkpoint {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
