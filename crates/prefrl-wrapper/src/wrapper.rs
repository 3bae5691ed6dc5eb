use std::{
    path::Path,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        mpsc::{self, SyncSender, TrySendError},
    },
    thread::JoinHandle,
};

use prefrl_env::{Action, ActionSpace, BoxSpace, Env, EnvError, Observation, Step};
use prefrl_prefs::{
    db::PrefStore,
    interface::PrefInterface,
    segment::{Segment, SegmentBuilder, SegmentId},
};
use prefrl_reward::{checkpoint, normalizer::RewardNormalizer, predictor::RewardPredictor};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    ENV_WRAPPER_TARGET, PREFS_SUBDIR, WrapperConfig, WrapperError,
    counters::Counters,
    worker::{self, PredictorSlot, PreferenceWorker, TrainingWorker},
};

/// `Step::info` key holding the environment's own reward once it is replaced.
pub const ENV_REWARD_KEY: &str = "env_reward";

/// `Step::info` key holding the normalized predicted reward.
pub const PREDICTED_REWARD_KEY: &str = "predicted_reward";

/// Offsets the training worker's seed from the preference interface's.
const TRAINING_SEED_OFFSET: u64 = 0x9e37_79b9_7f4a_7c15;

/// Wraps an environment, learning its reward from segment preferences.
///
/// See the [crate documentation](crate) for the overall flow.
#[derive(Debug)]
pub struct PreferenceEnvWrapper<E>
where
    E: Env,
{
    env: E,
    config: WrapperConfig,
    builder: SegmentBuilder,
    segment_tx: Option<SyncSender<Arc<Segment>>>,
    store: Arc<Mutex<PrefStore>>,
    counters: Arc<Counters>,
    predictor: PredictorSlot,
    pretrained: bool,
    normalizer: RewardNormalizer,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

impl<E> PreferenceEnvWrapper<E>
where
    E: Env,
{
    /// Wraps `env` and starts the preference and training workers the
    /// configuration enables.
    ///
    /// `pref_interface` judges segment pairs; it is unused when
    /// `collect_prefs` is off.
    pub fn new(
        env: E,
        config: WrapperConfig,
        pref_interface: PrefInterface,
    ) -> Result<Self, WrapperError> {
        config.validate()?;
        let predictor_config = config.predictor_config()?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());

        let store = match &config.prefs_dir {
            Some(dir) => {
                let store = PrefStore::load_dir(dir, config.max_prefs_in_db)?;
                tracing::info!(
                    target: ENV_WRAPPER_TARGET,
                    dir = %dir.display(),
                    train = store.train().len(),
                    val = store.val().len(),
                    "loaded preferences"
                );
                store
            }
            None => PrefStore::new(config.max_prefs_in_db),
        };
        let first_id = store
            .max_segment_id()
            .map_or(SegmentId::new(0), |id| SegmentId::new(id.get() + 1));
        let builder = SegmentBuilder::with_first_id(config.segment_length, first_id);

        let pretrained = match &config.pretrained_reward_predictor_dir {
            Some(dir) => {
                let checkpoint =
                    checkpoint::load_latest(dir).map_err(|source| WrapperError::Pretrained {
                        dir: dir.clone(),
                        source,
                    })?;
                let predictor =
                    RewardPredictor::from_checkpoint(predictor_config.clone(), &checkpoint)
                        .map_err(|source| WrapperError::Pretrained {
                            dir: dir.clone(),
                            source,
                        })?;
                tracing::info!(
                    target: ENV_WRAPPER_TARGET,
                    dir = %dir.display(),
                    training_steps = checkpoint.training_steps,
                    "loaded pretrained reward predictor"
                );
                Some(predictor)
            }
            None => None,
        };

        let counters = Arc::new(Counters::default());
        counters.set_pref_db_size(store.len());
        let store = Arc::new(Mutex::new(store));
        let slot: PredictorSlot = Arc::new(RwLock::new(pretrained.clone().map(Arc::new)));

        let mut wrapper = Self {
            env,
            builder,
            segment_tx: None,
            store,
            counters,
            predictor: slot,
            pretrained: pretrained.is_some(),
            normalizer: RewardNormalizer::new(),
            workers: vec![],
            closed: false,
            config,
        };

        if wrapper.config.collect_prefs {
            let (tx, rx) = mpsc::sync_channel(wrapper.config.segment_queue_capacity);
            let pref_worker = PreferenceWorker {
                segments: rx,
                interface: pref_interface.with_seed(seed),
                store: Arc::clone(&wrapper.store),
                counters: Arc::clone(&wrapper.counters),
            };
            wrapper
                .workers
                .push(worker::spawn("pref-worker", move || pref_worker.run())?);
            wrapper.segment_tx = Some(tx);
        }

        if wrapper.config.train_reward {
            let mut rng = Pcg32::seed_from_u64(seed.wrapping_add(TRAINING_SEED_OFFSET));
            let predictor = match pretrained {
                Some(predictor) => predictor,
                None => RewardPredictor::new(predictor_config, &mut rng),
            };
            let training_worker = TrainingWorker {
                predictor,
                rng,
                store: Arc::clone(&wrapper.store),
                counters: Arc::clone(&wrapper.counters),
                slot: Arc::clone(&wrapper.predictor),
                n_initial_prefs: wrapper.config.n_initial_prefs,
                n_initial_training_steps: wrapper.config.n_initial_training_steps,
                val_interval: wrapper.config.val_interval,
                ckpt_interval: wrapper.config.reward_predictor_ckpt_interval,
                log_dir: wrapper.config.log_dir.clone(),
            };
            wrapper
                .workers
                .push(worker::spawn("reward-training", move || training_worker.run())?);
        }

        tracing::debug!(
            target: ENV_WRAPPER_TARGET,
            segment_length = wrapper.config.segment_length,
            collect_prefs = wrapper.config.collect_prefs,
            train_reward = wrapper.config.train_reward,
            "environment wrapper ready"
        );
        Ok(wrapper)
    }

    #[must_use]
    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Shared progress counters; they stay readable after the wrapper is dropped.
    #[must_use]
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    #[must_use]
    pub fn segments_collected(&self) -> u64 {
        self.counters.segments_collected()
    }

    /// Completed segments dropped because the preference queue was full.
    #[must_use]
    pub fn segments_dropped(&self) -> u64 {
        self.counters.segments_dropped()
    }

    #[must_use]
    pub fn pref_db_size(&self) -> usize {
        self.counters.pref_db_size()
    }

    #[must_use]
    pub fn reward_training_steps(&self) -> u64 {
        self.counters.reward_training_steps()
    }

    #[must_use]
    pub fn using_reward_from_predictor(&self) -> bool {
        self.counters.using_reward_from_predictor()
    }

    /// Saves the current preference store (`train.json` / `val.json`) into `dir`.
    pub fn save_prefs<P>(&self, dir: P) -> Result<(), WrapperError>
    where
        P: AsRef<Path>,
    {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.save_dir(dir)?;
        Ok(())
    }

    fn send_segment(&self, segment: Arc<Segment>) {
        let Some(tx) = &self.segment_tx else {
            return;
        };
        let id = segment.id();
        match tx.try_send(segment) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.drop_segment();
                tracing::debug!(
                    target: ENV_WRAPPER_TARGET,
                    segment = %id,
                    "segment queue full, dropping segment"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.drop_segment();
                tracing::warn!(
                    target: ENV_WRAPPER_TARGET,
                    segment = %id,
                    "preference worker gone, dropping segment"
                );
            }
        }
    }

    /// The predictor whose reward replaces the environment's, once it qualifies.
    fn active_predictor(&self) -> Option<Arc<RewardPredictor>> {
        let predictor = self
            .predictor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        if !self.counters.using_reward_from_predictor() {
            let trained =
                self.counters.reward_training_steps() >= self.config.n_initial_training_steps;
            if !(self.pretrained || trained) {
                return None;
            }
            if self.counters.start_using_predictor() {
                tracing::info!(
                    target: ENV_WRAPPER_TARGET,
                    training_steps = predictor.training_steps(),
                    pretrained = self.pretrained,
                    "switching to reward from predictor"
                );
            }
        }
        Some(predictor)
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.counters.request_shutdown();
        self.segment_tx = None;
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                tracing::error!(target: ENV_WRAPPER_TARGET, worker = %name, "worker panicked");
            }
        }

        if let Some(log_dir) = &self.config.log_dir {
            let empty = self
                .store
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty();
            if !empty {
                let dir = log_dir.join(PREFS_SUBDIR);
                match self.save_prefs(&dir) {
                    Ok(()) => tracing::info!(
                        target: ENV_WRAPPER_TARGET,
                        dir = %dir.display(),
                        prefs = self.counters.pref_db_size(),
                        "saved preferences"
                    ),
                    Err(e) => tracing::error!(
                        target: ENV_WRAPPER_TARGET,
                        error = %e,
                        "failed to save preferences"
                    ),
                }
            }
        }
        self.env.close();
    }
}

impl<E> Env for PreferenceEnvWrapper<E>
where
    E: Env,
{
    fn observation_space(&self) -> &BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &ActionSpace {
        self.env.action_space()
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let discarded = self.builder.discard();
        if discarded > 0 {
            tracing::trace!(
                target: ENV_WRAPPER_TARGET,
                discarded,
                "reset discarded partial segment"
            );
        }
        self.env.reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let mut step = self.env.step(action)?;

        let observation = step.observation.clone();
        if let Some(segment) = self.builder.push(observation, action.clone(), step.reward) {
            self.counters.add_segment();
            self.send_segment(segment);
        }
        if step.is_done() {
            let discarded = self.builder.discard();
            tracing::trace!(target: ENV_WRAPPER_TARGET, discarded, "episode ended");
        }

        if let Some(predictor) = self.active_predictor() {
            let predicted = self
                .normalizer
                .normalize(predictor.raw_reward(&step.observation));
            step.info.insert(ENV_REWARD_KEY.to_owned(), step.reward);
            step.info.insert(PREDICTED_REWARD_KEY.to_owned(), predicted);
            step.reward = predicted;
        }
        Ok(step)
    }

    /// Stops the workers, saves preferences into `<log_dir>/prefs` and closes
    /// the inner environment. Later calls do nothing.
    fn close(&mut self) {
        self.shutdown();
    }
}

impl<E> Drop for PreferenceEnvWrapper<E>
where
    E: Env,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prefrl_env::{DummyEnv, wrappers::FrameStack};
    use prefrl_prefs::{
        db::TRAIN_FILE,
        interface::PrefInterfaceConfig,
        oracle::{PreferenceOracle, ScriptedOracle},
        preference::Preference,
    };
    use prefrl_reward::{
        RewardError,
        checkpoint::{CHECKPOINT_DIR, RewardCheckpoint},
        network::NetworkSpec,
    };
    use rand::SeedableRng;

    use super::*;

    const WAIT: Duration = Duration::from_secs(30);

    fn dummy_env() -> FrameStack<DummyEnv> {
        let env = DummyEnv::with_seed(
            BoxSpace::new(vec![4, 4, 3], 0.0, 255.0),
            ActionSpace::Discrete(4),
            11,
        );
        FrameStack::new(env, 2)
    }

    fn interface() -> PrefInterface {
        PrefInterface::new(PrefInterfaceConfig::default()).unwrap()
    }

    fn config() -> WrapperConfig {
        WrapperConfig {
            segment_length: 10,
            collect_prefs: false,
            train_reward: false,
            seed: Some(0),
            ..WrapperConfig::default()
        }
    }

    fn run_steps<E>(env: &mut PreferenceEnvWrapper<E>, n: usize) -> Vec<Step>
    where
        E: Env,
    {
        env.reset().unwrap();
        let mut rng = Pcg32::seed_from_u64(0);
        let mut steps = Vec::with_capacity(n);
        for _ in 0..n {
            let action = env.action_space().sample(&mut rng);
            let step = env.step(&action).unwrap();
            if step.is_done() {
                env.reset().unwrap();
            }
            steps.push(step);
        }
        steps
    }

    /// Terminates every `episode_length` steps.
    #[derive(Debug)]
    struct EpisodicEnv {
        inner: DummyEnv,
        episode_length: usize,
        t: usize,
    }

    impl Env for EpisodicEnv {
        fn observation_space(&self) -> &BoxSpace {
            self.inner.observation_space()
        }

        fn action_space(&self) -> &ActionSpace {
            self.inner.action_space()
        }

        fn reset(&mut self) -> Result<Observation, EnvError> {
            self.t = 0;
            self.inner.reset()
        }

        fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
            let mut step = self.inner.step(action)?;
            self.t += 1;
            step.terminated = self.t >= self.episode_length;
            Ok(step)
        }
    }

    mod segments {
        use super::*;

        #[test]
        fn test_segments_collected() {
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config(), interface()).unwrap();
            run_steps(&mut env, 30);
            assert_eq!(env.segments_collected(), 3);
            assert_eq!(env.pref_db_size(), 0);
        }

        #[test]
        fn test_episode_end_discards_partial_segment() {
            let inner = EpisodicEnv {
                inner: DummyEnv::with_seed(
                    BoxSpace::new(vec![2, 2, 1], 0.0, 255.0),
                    ActionSpace::Discrete(2),
                    0,
                ),
                episode_length: 15,
                t: 0,
            };
            let mut env = PreferenceEnvWrapper::new(inner, config(), interface()).unwrap();
            // two episodes of 15 steps: one full segment each, 5 steps discarded each
            run_steps(&mut env, 30);
            assert_eq!(env.segments_collected(), 2);
        }

        #[test]
        fn test_reset_discards_partial_segment() {
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config(), interface()).unwrap();
            run_steps(&mut env, 9);
            run_steps(&mut env, 9);
            assert_eq!(env.segments_collected(), 0);
        }

        #[test]
        fn test_env_reward_kept_without_predictor() {
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config(), interface()).unwrap();
            for step in run_steps(&mut env, 5) {
                assert!(!step.info.contains_key(ENV_REWARD_KEY));
                assert_eq!(step.reward.fract(), 0.0);
            }
            assert!(!env.using_reward_from_predictor());
        }
    }

    mod preferences {
        use super::*;

        #[test]
        fn test_prefs_collected() {
            let config = WrapperConfig {
                collect_prefs: true,
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 100);
            assert!(env.counters().wait_until(|c| c.pref_db_size > 1, WAIT));
            assert!(env.pref_db_size() > 1);
        }

        #[test]
        fn test_incomparable_pairs_not_stored() {
            let config = WrapperConfig {
                collect_prefs: true,
                ..config()
            };
            let pref_config = PrefInterfaceConfig {
                synthetic_prefs: false,
                ..PrefInterfaceConfig::default()
            };
            let interface =
                PrefInterface::with_oracle(pref_config, ScriptedOracle::default()).unwrap();
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface).unwrap();
            run_steps(&mut env, 50);
            env.close();
            assert_eq!(env.segments_collected(), 5);
            assert_eq!(env.pref_db_size(), 0);
        }

        /// Blocks every judgment until its release channel is closed.
        #[derive(Debug)]
        struct GatedOracle {
            release: mpsc::Receiver<()>,
        }

        impl PreferenceOracle for GatedOracle {
            fn judge(&mut self, _left: &Segment, _right: &Segment) -> Option<Preference> {
                let _ = self.release.recv();
                Some(Preference::Tie)
            }
        }

        #[test]
        fn test_full_queue_drops_segments() {
            let config = WrapperConfig {
                collect_prefs: true,
                segment_queue_capacity: 1,
                ..config()
            };
            let pref_config = PrefInterfaceConfig {
                synthetic_prefs: false,
                ..PrefInterfaceConfig::default()
            };
            let (release, gate) = mpsc::channel();
            let interface =
                PrefInterface::with_oracle(pref_config, GatedOracle { release: gate }).unwrap();
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface).unwrap();

            // the worker takes at most a few segments before blocking on its first judgment
            run_steps(&mut env, 200);
            assert_eq!(env.segments_collected(), 20);
            assert!(env.segments_dropped() >= 10, "{:?}", env.counters().snapshot());

            drop(release);
            env.close();
        }

        #[test]
        fn test_close_saves_and_prefs_dir_reloads() {
            let dir = tempfile::tempdir().unwrap();
            let config = WrapperConfig {
                collect_prefs: true,
                log_dir: Some(dir.path().to_owned()),
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 60);
            assert!(env.counters().wait_until(|c| c.pref_db_size >= 3, WAIT));
            env.close();
            let saved = env.pref_db_size();

            let prefs_dir = dir.path().join(PREFS_SUBDIR);
            assert!(prefs_dir.join(TRAIN_FILE).is_file());

            let config = WrapperConfig {
                prefs_dir: Some(prefs_dir),
                ..super::config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            assert_eq!(env.pref_db_size(), saved);
            // new segment ids continue after the loaded ones
            let max_loaded = env.store.lock().unwrap().max_segment_id().unwrap();
            let mut segment = None;
            for _ in 0..10 {
                segment = env
                    .builder
                    .push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0);
            }
            assert!(segment.unwrap().id() > max_loaded);
            env.close();
        }
    }

    mod reward {
        use super::*;

        #[test]
        fn test_switches_to_predicted_reward() {
            let config = WrapperConfig {
                collect_prefs: true,
                train_reward: true,
                n_initial_prefs: 4,
                n_initial_training_steps: 5,
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 100);
            assert!(env.counters().wait_until(|c| c.reward_training_steps >= 5, WAIT));

            let action = env.action_space().sample(&mut rand::rng());
            let step = env.step(&action).unwrap();
            assert!(env.using_reward_from_predictor());
            assert!(step.info.contains_key(ENV_REWARD_KEY));
            assert_eq!(step.info.get(PREDICTED_REWARD_KEY), Some(&step.reward));
            env.close();
        }

        #[test]
        fn test_no_switch_before_training_threshold() {
            let config = WrapperConfig {
                collect_prefs: true,
                train_reward: true,
                n_initial_prefs: 10_000,
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 50);
            assert!(!env.using_reward_from_predictor());
            assert_eq!(env.reward_training_steps(), 0);
            // closing must not hang on the waiting training worker
            env.close();
        }

        #[test]
        fn test_pretrained_predictor_used_immediately() {
            let dir = tempfile::tempdir().unwrap();
            let spec = NetworkSpec::PooledLinear { bins: 4 };
            RewardCheckpoint::new(spec, vec![1.0, 0.0, 0.0, 0.0, 0.5], 200, None)
                .save(dir.path().join(CHECKPOINT_DIR))
                .unwrap();

            let config = WrapperConfig {
                pretrained_reward_predictor_dir: Some(dir.path().to_owned()),
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            let steps = run_steps(&mut env, 3);
            assert!(env.using_reward_from_predictor());
            assert!(steps.iter().all(|s| s.info.contains_key(PREDICTED_REWARD_KEY)));
            assert_eq!(env.reward_training_steps(), 0);
        }

        #[test]
        fn test_missing_pretrained_predictor() {
            let dir = tempfile::tempdir().unwrap();
            let config = WrapperConfig {
                pretrained_reward_predictor_dir: Some(dir.path().to_owned()),
                ..config()
            };
            let err = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap_err();
            assert!(matches!(err, WrapperError::Pretrained { .. }));
        }

        #[test]
        fn test_pretrained_predictor_with_zero_dimension() {
            let dir = tempfile::tempdir().unwrap();
            let spec = NetworkSpec::PooledMlp { bins: 4, hidden: 0 };
            RewardCheckpoint::new(spec, vec![0.0], 1, None)
                .save(dir.path().join(CHECKPOINT_DIR))
                .unwrap();

            let config = WrapperConfig {
                pretrained_reward_predictor_dir: Some(dir.path().to_owned()),
                ..config()
            };
            let err = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap_err();
            assert!(matches!(
                err,
                WrapperError::Pretrained {
                    source: RewardError::InvalidSpec { .. },
                    ..
                }
            ));
        }

        #[test]
        fn test_checkpoints_written() {
            let dir = tempfile::tempdir().unwrap();
            let config = WrapperConfig {
                collect_prefs: true,
                train_reward: true,
                n_initial_prefs: 2,
                n_initial_training_steps: 1,
                reward_predictor_ckpt_interval: 2,
                reward_network: "pooled_linear".to_owned(),
                log_dir: Some(dir.path().to_owned()),
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 40);
            assert!(env.counters().wait_until(|c| c.reward_training_steps >= 4, WAIT));
            env.close();
            let latest = checkpoint::load_latest(dir.path()).unwrap();
            assert!(latest.training_steps >= 2);
            assert!(matches!(latest.network, NetworkSpec::PooledLinear { .. }));
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn test_close_is_idempotent() {
            let config = WrapperConfig {
                collect_prefs: true,
                train_reward: true,
                ..config()
            };
            let mut env = PreferenceEnvWrapper::new(dummy_env(), config, interface()).unwrap();
            run_steps(&mut env, 10);
            env.close();
            env.close();
            assert!(matches!(
                env.step(&Action::Discrete(0)),
                Err(EnvError::Closed)
            ));
            assert!(matches!(env.reset(), Err(EnvError::Closed)));
        }

        #[test]
        fn test_invalid_config_rejected() {
            let config = WrapperConfig {
                segment_length: 0,
                ..config()
            };
            assert!(matches!(
                PreferenceEnvWrapper::new(dummy_env(), config, interface()),
                Err(WrapperError::InvalidConfig { .. })
            ));
        }

        #[test]
        fn test_counters_outlive_wrapper() {
            let env = PreferenceEnvWrapper::new(dummy_env(), config(), interface()).unwrap();
            let counters = env.counters();
            drop(env);
            assert_eq!(counters.segments_collected(), 0);
        }
    }
}
