//! Background workers driven by the wrapper.
//!
//! - [`PreferenceWorker`] turns completed segments into judged preferences
//! - [`TrainingWorker`] trains the reward predictor and publishes snapshots

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        mpsc::{Receiver, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use prefrl_prefs::{db::PrefStore, interface::PrefInterface, segment::Segment};
use prefrl_reward::{
    REWARD_PREDICTOR_TARGET, checkpoint::CHECKPOINT_DIR, predictor::RewardPredictor,
};
use rand_pcg::Pcg32;

use crate::{ENV_WRAPPER_TARGET, WrapperError, counters::Counters};

/// How long the preference worker blocks on the segment queue before judging again.
const SEGMENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pairs judged between two polls of the segment queue.
const PREFS_PER_ROUND: usize = 8;

pub(crate) type PredictorSlot = Arc<RwLock<Option<Arc<RewardPredictor>>>>;

pub(crate) fn spawn<F>(name: &'static str, f: F) -> Result<JoinHandle<()>, WrapperError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(f)
        .map_err(|source| WrapperError::Spawn { name, source })
}

#[derive(Debug)]
pub(crate) struct PreferenceWorker {
    pub(crate) segments: Receiver<Arc<Segment>>,
    pub(crate) interface: PrefInterface,
    pub(crate) store: Arc<Mutex<PrefStore>>,
    pub(crate) counters: Arc<Counters>,
}

impl PreferenceWorker {
    pub(crate) fn run(mut self) {
        loop {
            if self.counters.is_shutting_down() {
                break;
            }
            match self.segments.recv_timeout(SEGMENT_POLL_INTERVAL) {
                Ok(segment) => {
                    self.interface.add_segment(segment);
                    while let Ok(segment) = self.segments.try_recv() {
                        self.interface.add_segment(segment);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.judge_pairs();
        }
        tracing::debug!(target: ENV_WRAPPER_TARGET, "preference worker stopped");
    }

    fn judge_pairs(&mut self) {
        for _ in 0..PREFS_PER_ROUND {
            let Some(record) = self.interface.next_preference() else {
                break;
            };
            let (accepted, size) = {
                let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
                let accepted = store.push(record);
                (accepted, store.len())
            };
            if accepted {
                self.counters.set_pref_db_size(size);
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct TrainingWorker {
    pub(crate) predictor: RewardPredictor,
    pub(crate) rng: Pcg32,
    pub(crate) store: Arc<Mutex<PrefStore>>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) slot: PredictorSlot,
    pub(crate) n_initial_prefs: usize,
    pub(crate) n_initial_training_steps: u64,
    pub(crate) val_interval: u64,
    pub(crate) ckpt_interval: u64,
    pub(crate) log_dir: Option<PathBuf>,
}

impl TrainingWorker {
    pub(crate) fn run(mut self) {
        if !self.wait_for_initial_prefs() {
            return;
        }
        tracing::info!(
            target: REWARD_PREDICTOR_TARGET,
            prefs = self.counters.pref_db_size(),
            "starting reward predictor training"
        );
        if self.n_initial_training_steps == 0 {
            self.publish();
        }

        let mut steps = 0;
        while !self.counters.is_shutting_down() {
            let result = {
                let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
                self.predictor.train_step(store.train(), &mut self.rng)
            };
            let stats = match result {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::error!(
                        target: REWARD_PREDICTOR_TARGET,
                        error = %e,
                        "reward predictor training failed"
                    );
                    break;
                }
            };
            steps += 1;
            tracing::debug!(
                target: REWARD_PREDICTOR_TARGET,
                step = steps,
                loss = stats.loss,
                accuracy = ?stats.accuracy,
                "trained reward predictor"
            );

            if steps % self.val_interval == 0 {
                self.validate(steps);
            }
            let at_checkpoint = steps % self.ckpt_interval == 0;
            if at_checkpoint {
                self.save_checkpoint();
            }
            if steps == self.n_initial_training_steps
                || (at_checkpoint && steps > self.n_initial_training_steps)
            {
                self.publish();
            }
            // the snapshot must be visible before the step count that enables it
            self.counters.set_reward_training_steps(steps);
        }
        tracing::debug!(target: REWARD_PREDICTOR_TARGET, steps, "training worker stopped");
    }

    /// Returns `false` when shutdown was requested first.
    fn wait_for_initial_prefs(&self) -> bool {
        let min_prefs = self.n_initial_prefs;
        let store = &self.store;
        self.counters.wait_for(
            || {
                if self.counters.is_shutting_down() {
                    return true;
                }
                self.counters.pref_db_size() >= min_prefs
                    && !store
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .train()
                        .is_empty()
            },
            None,
        );
        !self.counters.is_shutting_down()
    }

    fn validate(&mut self, steps: u64) {
        let stats = {
            let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            self.predictor.validate(store.val())
        };
        match stats {
            Some(stats) => tracing::info!(
                target: REWARD_PREDICTOR_TARGET,
                step = steps,
                loss = stats.loss,
                accuracy = ?stats.accuracy,
                records = stats.records,
                "validation"
            ),
            None => tracing::debug!(
                target: REWARD_PREDICTOR_TARGET,
                step = steps,
                "validation skipped, no validation preferences"
            ),
        }
    }

    fn save_checkpoint(&self) {
        let Some(log_dir) = &self.log_dir else {
            return;
        };
        match self.predictor.checkpoint().save(log_dir.join(CHECKPOINT_DIR)) {
            Ok(path) => tracing::debug!(
                target: REWARD_PREDICTOR_TARGET,
                path = %path.display(),
                "saved reward predictor checkpoint"
            ),
            Err(e) => tracing::error!(
                target: REWARD_PREDICTOR_TARGET,
                error = %e,
                "failed to save reward predictor checkpoint"
            ),
        }
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.predictor.clone());
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        tracing::trace!(target: REWARD_PREDICTOR_TARGET, "published reward predictor snapshot");
    }
}
