//! Environment wrapper that learns its reward from segment preferences.
//!
//! [`PreferenceEnvWrapper`] sits between an agent and an [`Env`](prefrl_env::Env).
//! While the agent steps the environment, the wrapper:
//!
//! 1. cuts the trajectory into fixed-length segments,
//! 2. hands them to a preference worker that asks a
//!    [`PrefInterface`](prefrl_prefs::interface::PrefInterface) to judge pairs,
//! 3. trains a [`RewardPredictor`](prefrl_reward::predictor::RewardPredictor)
//!    on the judged pairs in a training worker, and
//! 4. once enough training has happened, returns the predicted reward instead
//!    of the environment's own.
//!
//! Progress is observable through [`Counters`].
//!
//! # Example
//!
//! ```
//! use prefrl_env::{Action, ActionSpace, BoxSpace, DummyEnv, Env};
//! use prefrl_prefs::interface::{PrefInterface, PrefInterfaceConfig};
//! use prefrl_wrapper::{PreferenceEnvWrapper, WrapperConfig};
//!
//! let env = DummyEnv::with_seed(BoxSpace::new(vec![4, 4, 3], 0.0, 255.0), ActionSpace::Discrete(4), 0);
//! let config = WrapperConfig {
//!     segment_length: 5,
//!     train_reward: false,
//!     ..WrapperConfig::default()
//! };
//! let interface = PrefInterface::new(PrefInterfaceConfig::default()).unwrap();
//! let mut env = PreferenceEnvWrapper::new(env, config, interface).unwrap();
//!
//! env.reset().unwrap();
//! for _ in 0..20 {
//!     env.step(&Action::Discrete(1)).unwrap();
//! }
//! assert_eq!(env.segments_collected(), 4);
//! env.close();
//! ```

use std::path::PathBuf;

use prefrl_env::EnvError;
use prefrl_prefs::PrefsError;
use prefrl_reward::RewardError;

pub use self::{
    config::WrapperConfig,
    counters::{CounterSnapshot, Counters},
    wrapper::{ENV_REWARD_KEY, PREDICTED_REWARD_KEY, PreferenceEnvWrapper},
};

mod config;
mod counters;
mod worker;
mod wrapper;

/// Tracing target used by the environment wrapper.
pub const ENV_WRAPPER_TARGET: &str = "prefrl::env_wrapper";

/// Subdirectory of the log directory preferences are saved to on close.
pub const PREFS_SUBDIR: &str = "prefs";

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum WrapperError {
    #[display("invalid wrapper configuration: {reason}")]
    #[from(ignore)]
    InvalidConfig { reason: &'static str },
    #[display("environment error")]
    Env { source: EnvError },
    #[display("preference database error")]
    Prefs { source: PrefsError },
    #[display("reward predictor error")]
    Reward { source: RewardError },
    #[display("failed to spawn worker thread `{name}`")]
    #[from(ignore)]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
    #[display("failed to load pretrained reward predictor from {}", dir.display())]
    #[from(ignore)]
    Pretrained { dir: PathBuf, source: RewardError },
}
