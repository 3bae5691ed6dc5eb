use std::collections::BTreeMap;

use crate::{Action, ActionSpace, BoxSpace, EnvError, Observation};

/// Auxiliary scalars attached to a step (e.g. the environment reward when a
/// wrapper substitutes its own).
pub type Info = BTreeMap<String, f32>;

/// Result of a single environment transition.
#[derive(Debug, Clone)]
pub struct Step {
    pub observation: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl Step {
    #[must_use]
    pub fn new(observation: Observation, reward: f32) -> Self {
        Self {
            observation,
            reward,
            terminated: false,
            truncated: false,
            info: Info::new(),
        }
    }

    /// Whether the episode ended with this step.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A gym-style reinforcement-learning environment.
pub trait Env {
    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &ActionSpace;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Observation, EnvError>;

    /// Advances the environment by one transition.
    fn step(&mut self, action: &Action) -> Result<Step, EnvError>;

    /// Releases resources held by the environment.
    fn close(&mut self) {}
}

impl<E> Env for Box<E>
where
    E: Env + ?Sized,
{
    fn observation_space(&self) -> &BoxSpace {
        self.as_ref().observation_space()
    }

    fn action_space(&self) -> &ActionSpace {
        self.as_ref().action_space()
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.as_mut().reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        self.as_mut().step(action)
    }

    fn close(&mut self) {
        self.as_mut().close();
    }
}
