use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Action, ActionSpace, BoxSpace, Env, EnvError, Observation, Step};

/// Highest reward returned by [`DummyEnv`] (rewards are integers in `0..=MAX_REWARD`).
pub const DUMMY_MAX_REWARD: u32 = 10;

/// Environment that emits random observations and random integer rewards.
///
/// Episodes never terminate. Useful for exercising wrappers without a real
/// simulator.
///
/// # Example
///
/// ```
/// use prefrl_env::{Action, ActionSpace, BoxSpace, DummyEnv, Env};
///
/// let mut env = DummyEnv::with_seed(BoxSpace::new(vec![2, 2, 3], 0.0, 255.0), ActionSpace::Discrete(4), 1);
/// env.reset().unwrap();
/// assert!(env.step(&Action::Discrete(3)).is_ok());
/// assert!(env.step(&Action::Discrete(4)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DummyEnv {
    observation_space: BoxSpace,
    action_space: ActionSpace,
    rng: Pcg32,
    needs_reset: bool,
    closed: bool,
}

impl DummyEnv {
    #[must_use]
    pub fn new(observation_space: BoxSpace, action_space: ActionSpace) -> Self {
        Self::with_seed(observation_space, action_space, rand::rng().random())
    }

    /// Creates an environment whose observations and rewards are reproducible.
    #[must_use]
    pub fn with_seed(observation_space: BoxSpace, action_space: ActionSpace, seed: u64) -> Self {
        Self {
            observation_space,
            action_space,
            rng: Pcg32::seed_from_u64(seed),
            needs_reset: true,
            closed: false,
        }
    }

    fn sample_observation(&mut self) -> Observation {
        self.observation_space.sample(&mut self.rng)
    }
}

impl Env for DummyEnv {
    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        self.needs_reset = false;
        Ok(self.sample_observation())
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        if self.needs_reset {
            return Err(EnvError::NeedsReset);
        }
        if !self.action_space.contains(action) {
            return Err(EnvError::InvalidAction {
                action: action.clone(),
                space: self.action_space.clone(),
            });
        }
        let observation = self.sample_observation();
        #[expect(clippy::cast_precision_loss)]
        let reward = self.rng.random_range(0..=DUMMY_MAX_REWARD) as f32;
        Ok(Step::new(observation, reward))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> DummyEnv {
        DummyEnv::with_seed(
            BoxSpace::new(vec![4, 4, 3], 0.0, 255.0),
            ActionSpace::Discrete(25),
            3,
        )
    }

    #[test]
    fn test_step_requires_reset() {
        let mut env = env();
        let err = env.step(&Action::Discrete(0)).unwrap_err();
        assert!(err.is_needs_reset());
    }

    #[test]
    fn test_rewards_within_range() {
        let mut env = env();
        env.reset().unwrap();
        for _ in 0..50 {
            let step = env.step(&Action::Discrete(1)).unwrap();
            assert!((0.0..=10.0).contains(&step.reward));
            assert_eq!(step.reward.fract(), 0.0);
            assert!(!step.is_done());
            assert!(env.observation_space().contains(&step.observation));
        }
    }

    #[test]
    fn test_rejects_action_outside_space() {
        let mut env = env();
        env.reset().unwrap();
        let err = env.step(&Action::MultiDiscrete(vec![0])).unwrap_err();
        assert!(err.is_invalid_action());
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = env();
        let mut b = env();
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
        let sa = a.step(&Action::Discrete(0)).unwrap();
        let sb = b.step(&Action::Discrete(0)).unwrap();
        assert_eq!(sa.observation, sb.observation);
        assert_eq!(sa.reward, sb.reward);
    }

    #[test]
    fn test_closed_env_rejects_calls() {
        let mut env = env();
        env.close();
        assert!(env.reset().unwrap_err().is_closed());
    }
}
