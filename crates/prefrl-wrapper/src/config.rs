use std::path::PathBuf;

use prefrl_prefs::{LogLevel, PREF_INTERFACE_TARGET};
use prefrl_reward::{REWARD_PREDICTOR_TARGET, network::NetworkSpec, predictor::PredictorConfig};
use serde::{Deserialize, Serialize};

use crate::{ENV_WRAPPER_TARGET, WrapperError};

/// Configuration of a [`PreferenceEnvWrapper`](crate::PreferenceEnvWrapper).
///
/// Every field has a default, so partial JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Transitions per segment.
    pub segment_length: usize,
    /// Send completed segments to the preference worker.
    pub collect_prefs: bool,
    /// Run the reward training worker.
    pub train_reward: bool,
    /// Directory holding `train.json` / `val.json` to start from.
    pub prefs_dir: Option<PathBuf>,
    /// Directory for checkpoints and saved preferences.
    pub log_dir: Option<PathBuf>,
    /// Preferences required before reward training starts.
    pub n_initial_prefs: usize,
    /// Training steps required before the predicted reward is used.
    pub n_initial_training_steps: u64,
    pub max_prefs_in_db: usize,
    /// Training steps between checkpoints (and predictor snapshots).
    pub reward_predictor_ckpt_interval: u64,
    /// Directory to load the latest checkpoint from; its predictor is used immediately.
    pub pretrained_reward_predictor_dir: Option<PathBuf>,
    pub reward_network: String,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Training steps between validation passes.
    pub val_interval: u64,
    /// Completed segments buffered for the preference worker; extra segments are dropped.
    pub segment_queue_capacity: usize,
    pub seed: Option<u64>,
    pub reward_predictor_log_level: LogLevel,
    pub env_wrapper_log_level: LogLevel,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            segment_length: 25,
            collect_prefs: true,
            train_reward: true,
            prefs_dir: None,
            log_dir: None,
            n_initial_prefs: 40,
            n_initial_training_steps: 50,
            max_prefs_in_db: 10_000,
            reward_predictor_ckpt_interval: 10,
            pretrained_reward_predictor_dir: None,
            reward_network: "pooled_mlp".to_owned(),
            batch_size: 16,
            learning_rate: 1e-3,
            val_interval: 10,
            segment_queue_capacity: 64,
            seed: None,
            reward_predictor_log_level: LogLevel::Info,
            env_wrapper_log_level: LogLevel::Info,
        }
    }
}

impl WrapperConfig {
    pub fn validate(&self) -> Result<(), WrapperError> {
        let checks = [
            (self.segment_length == 0, "segment_length must be positive"),
            (self.max_prefs_in_db == 0, "max_prefs_in_db must be positive"),
            (self.batch_size == 0, "batch_size must be positive"),
            (
                self.reward_predictor_ckpt_interval == 0,
                "reward_predictor_ckpt_interval must be positive",
            ),
            (self.val_interval == 0, "val_interval must be positive"),
            (
                self.segment_queue_capacity == 0,
                "segment_queue_capacity must be positive",
            ),
            (
                !(self.learning_rate.is_finite() && self.learning_rate > 0.0),
                "learning_rate must be a positive number",
            ),
        ];
        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(WrapperError::InvalidConfig { reason }),
            None => Ok(()),
        }
    }

    /// Reward predictor settings derived from this configuration.
    pub fn predictor_config(&self) -> Result<PredictorConfig, WrapperError> {
        let network = self.reward_network.parse::<NetworkSpec>()?;
        Ok(PredictorConfig {
            network,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            ..PredictorConfig::default()
        })
    }

    /// `tracing_subscriber::EnvFilter` directives for the per-component log levels.
    ///
    /// `pref_interface_level` comes from the preference interface configuration.
    #[must_use]
    pub fn log_directives(&self, pref_interface_level: LogLevel) -> Vec<String> {
        vec![
            self.env_wrapper_log_level.directive(ENV_WRAPPER_TARGET),
            self.reward_predictor_log_level.directive(REWARD_PREDICTOR_TARGET),
            pref_interface_level.directive(PREF_INTERFACE_TARGET),
        ]
    }
}
