//! Reward predictor training, validation and inference.

use prefrl_env::Observation;
use prefrl_prefs::{
    db::PrefDb,
    preference::{PrefRecord, Preference},
    segment::Segment,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    REWARD_PREDICTOR_TARGET, RewardError,
    checkpoint::RewardCheckpoint,
    network::{BoxedRewardNetwork, NetworkSpec},
    optimizer::Adam,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub network: NetworkSpec,
    /// Preference records per training step.
    pub batch_size: usize,
    pub learning_rate: f32,
    /// L2 penalty coefficient applied to every parameter.
    pub l2_coef: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            network: NetworkSpec::default(),
            batch_size: 16,
            learning_rate: 1e-3,
            l2_coef: 1e-4,
        }
    }
}

/// Result of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    /// Training steps completed, including this one.
    pub step: u64,
    /// Mean preference loss over the batch, without the L2 term.
    pub loss: f32,
    /// Batch accuracy; `None` when the batch held only ties.
    pub accuracy: Option<f32>,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationStats {
    pub loss: f32,
    pub accuracy: Option<f32>,
    pub records: usize,
}

/// Reward network plus the optimizer state training it.
#[derive(Debug, Clone)]
pub struct RewardPredictor {
    config: PredictorConfig,
    network: BoxedRewardNetwork,
    optimizer: Adam,
    training_steps: u64,
    last_val_accuracy: Option<f32>,
}

/// Returns `(p_left, p_right)` under the Bradley-Terry model.
fn preference_probabilities(left_return: f32, right_return: f32) -> (f32, f32) {
    let max = left_return.max(right_return);
    let l = (left_return - max).exp();
    let r = (right_return - max).exp();
    (l / (l + r), r / (l + r))
}

fn preference_loss(preference: Preference, p_left: f32, p_right: f32) -> f32 {
    const MIN_PROB: f32 = 1e-12;
    let (mu_l, mu_r) = preference.mu();
    -(mu_l * p_left.max(MIN_PROB).ln() + mu_r * p_right.max(MIN_PROB).ln())
}

/// Whether the predicted returns order the pair as judged; `None` for ties.
fn is_correct(preference: Preference, left_return: f32, right_return: f32) -> Option<bool> {
    match preference {
        Preference::Left => Some(left_return > right_return),
        Preference::Right => Some(right_return > left_return),
        Preference::Tie => None,
    }
}

#[expect(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> Option<f32> {
    (den > 0).then(|| num as f32 / den as f32)
}

impl RewardPredictor {
    pub fn new<R>(config: PredictorConfig, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let network = config.network.build(rng);
        let optimizer = Adam::new(config.learning_rate, network.params().len());
        Self {
            config,
            network,
            optimizer,
            training_steps: 0,
            last_val_accuracy: None,
        }
    }

    /// Restores a predictor from a checkpoint.
    ///
    /// The checkpoint's network spec overrides `config.network`; the optimizer
    /// state starts fresh.
    pub fn from_checkpoint(
        mut config: PredictorConfig,
        checkpoint: &RewardCheckpoint,
    ) -> Result<Self, RewardError> {
        config.network = checkpoint.network;
        let network = checkpoint.network.build_with_params(&checkpoint.params)?;
        let optimizer = Adam::new(config.learning_rate, network.params().len());
        Ok(Self {
            config,
            network,
            optimizer,
            training_steps: checkpoint.training_steps,
            last_val_accuracy: checkpoint.val_accuracy,
        })
    }

    #[must_use]
    pub fn checkpoint(&self) -> RewardCheckpoint {
        RewardCheckpoint::new(
            self.network.spec(),
            self.network.params().to_vec(),
            self.training_steps,
            self.last_val_accuracy,
        )
    }

    #[must_use]
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    #[must_use]
    pub fn training_steps(&self) -> u64 {
        self.training_steps
    }

    /// Accuracy from the most recent [`RewardPredictor::validate`] call.
    #[must_use]
    pub fn last_val_accuracy(&self) -> Option<f32> {
        self.last_val_accuracy
    }

    /// Unnormalized predicted reward for one observation.
    #[must_use]
    pub fn raw_reward(&self, obs: &Observation) -> f32 {
        self.network.forward(obs.data())
    }

    /// Sum of predicted rewards over the segment's frames.
    #[must_use]
    pub fn segment_return(&self, segment: &Segment) -> f32 {
        segment.frames().iter().map(|f| self.raw_reward(f)).sum()
    }

    fn record_returns(&self, record: &PrefRecord) -> (f32, f32) {
        (
            self.segment_return(&record.left),
            self.segment_return(&record.right),
        )
    }

    /// Runs one optimizer step on a random batch drawn from `db`.
    pub fn train_step<R>(&mut self, db: &PrefDb, rng: &mut R) -> Result<TrainStats, RewardError>
    where
        R: Rng + ?Sized,
    {
        let batch = db.sample_batch(rng, self.config.batch_size);
        if batch.is_empty() {
            return Err(RewardError::EmptyBatch);
        }

        #[expect(clippy::cast_precision_loss)]
        let scale = 1.0 / batch.len() as f32;
        let mut grads = vec![0.0; self.network.params().len()];
        let mut total_loss = 0.0;
        let mut correct = 0;
        let mut judged = 0;

        for record in &batch {
            let (left_return, right_return) = self.record_returns(record);
            let (p_left, p_right) = preference_probabilities(left_return, right_return);
            total_loss += preference_loss(record.preference, p_left, p_right);
            if let Some(ok) = is_correct(record.preference, left_return, right_return) {
                judged += 1;
                correct += usize::from(ok);
            }

            let (mu_l, mu_r) = record.preference.mu();
            let grad_left = (p_left - mu_l) * scale;
            let grad_right = (p_right - mu_r) * scale;
            for frame in record.left.frames() {
                self.network.backward(frame.data(), grad_left, &mut grads);
            }
            for frame in record.right.frames() {
                self.network.backward(frame.data(), grad_right, &mut grads);
            }
        }

        for (g, p) in grads.iter_mut().zip(self.network.params()) {
            *g += self.config.l2_coef * p;
        }
        self.optimizer.step(self.network.params_mut(), &grads);
        self.training_steps += 1;

        let stats = TrainStats {
            step: self.training_steps,
            loss: total_loss * scale,
            accuracy: ratio(correct, judged),
            batch_size: batch.len(),
        };
        tracing::trace!(
            target: REWARD_PREDICTOR_TARGET,
            step = stats.step,
            loss = stats.loss,
            accuracy = ?stats.accuracy,
            "training step"
        );
        Ok(stats)
    }

    /// Evaluates loss and accuracy over every record in `db`.
    ///
    /// Returns `None` for an empty database.
    pub fn validate(&mut self, db: &PrefDb) -> Option<ValidationStats> {
        if db.is_empty() {
            return None;
        }
        let mut total_loss = 0.0;
        let mut correct = 0;
        let mut judged = 0;
        for record in db.iter() {
            let (left_return, right_return) = self.record_returns(record);
            let (p_left, p_right) = preference_probabilities(left_return, right_return);
            total_loss += preference_loss(record.preference, p_left, p_right);
            if let Some(ok) = is_correct(record.preference, left_return, right_return) {
                judged += 1;
                correct += usize::from(ok);
            }
        }
        let accuracy = ratio(correct, judged);
        self.last_val_accuracy = accuracy;

        #[expect(clippy::cast_precision_loss)]
        let loss = total_loss / db.len() as f32;
        Some(ValidationStats {
            loss,
            accuracy,
            records: db.len(),
        })
    }

    /// Fraction of non-tie records whose order the predictor reproduces.
    #[must_use]
    pub fn accuracy(&self, db: &PrefDb) -> Option<f32> {
        let mut correct = 0;
        let mut judged = 0;
        for record in db.iter() {
            let (left_return, right_return) = self.record_returns(record);
            if let Some(ok) = is_correct(record.preference, left_return, right_return) {
                judged += 1;
                correct += usize::from(ok);
            }
        }
        ratio(correct, judged)
    }
}
