use std::{collections::VecDeque, iter};

use crate::{Action, ActionSpace, BoxSpace, Env, EnvError, Observation, Step};

/// Stacks the last `n_frames` observations along the channel axis.
///
/// An inner observation of shape `[h, w, c]` becomes `[h, w, c * n_frames]`,
/// with the oldest frame first. On reset the stack is filled with copies of
/// the first observation.
#[derive(Debug, Clone)]
pub struct FrameStack<E> {
    env: E,
    n_frames: usize,
    frames: VecDeque<Observation>,
    observation_space: BoxSpace,
}

impl<E> FrameStack<E>
where
    E: Env,
{
    /// Wraps `env`.
    ///
    /// # Panics
    ///
    /// Panics if `n_frames` is zero.
    #[must_use]
    pub fn new(env: E, n_frames: usize) -> Self {
        assert!(n_frames > 0, "n_frames must be positive");
        let inner = env.observation_space();
        let mut shape = inner.shape().to_vec();
        match shape.last_mut() {
            Some(last) => *last *= n_frames,
            None => shape.push(n_frames),
        }
        let observation_space = inner.with_shape(shape);
        Self {
            env,
            n_frames,
            frames: VecDeque::with_capacity(n_frames),
            observation_space,
        }
    }

    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.env
    }

    #[must_use]
    pub fn into_inner(self) -> E {
        self.env
    }

    fn stacked(&self) -> Result<Observation, EnvError> {
        Observation::concat_channels(&self.frames)
    }
}

impl<E> Env for FrameStack<E>
where
    E: Env,
{
    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &ActionSpace {
        self.env.action_space()
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        let obs = self.env.reset()?;
        self.frames.clear();
        self.frames.extend(iter::repeat_n(obs, self.n_frames));
        self.stacked()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        if self.frames.is_empty() {
            return Err(EnvError::NeedsReset);
        }
        let mut step = self.env.step(action)?;
        self.frames.pop_front();
        self.frames.push_back(step.observation);
        step.observation = self.stacked()?;
        Ok(step)
    }

    fn close(&mut self) {
        self.frames.clear();
        self.env.close();
    }
}
