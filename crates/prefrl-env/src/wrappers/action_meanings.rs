use serde::{Deserialize, Serialize};

use crate::{Action, ActionSpace, BoxSpace, Env, EnvError, Observation, Step};

/// How [`ActionMeanings`] exposes the inner action space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMeaningsMode {
    /// Expose a single `Discrete` space enumerating every inner action.
    #[default]
    Flattened,
    /// Keep the inner action space unchanged.
    Native,
}

/// Names every action of the wrapped environment and optionally flattens a
/// multi-discrete action space into a single discrete one.
///
/// Flattened indices are decoded in row-major order (last component fastest),
/// so for `MultiDiscrete([2, 3])` index `4` is `[1, 1]`.
#[derive(Debug, Clone)]
pub struct ActionMeanings<E> {
    env: E,
    mode: ActionMeaningsMode,
    action_space: ActionSpace,
    meanings: Vec<String>,
}

impl<E> ActionMeanings<E>
where
    E: Env,
{
    #[must_use]
    pub fn new(env: E, mode: ActionMeaningsMode) -> Self {
        let inner = env.action_space().clone();
        let meanings = (0..inner.flat_len())
            .map(|i| meaning(&decode(&inner, i)))
            .collect();
        let action_space = match mode {
            ActionMeaningsMode::Flattened => ActionSpace::Discrete(inner.flat_len()),
            ActionMeaningsMode::Native => inner,
        };
        Self {
            env,
            mode,
            action_space,
            meanings,
        }
    }

    /// Names of all actions, indexed by flattened action index.
    #[must_use]
    pub fn action_meanings(&self) -> &[String] {
        &self.meanings
    }

    #[must_use]
    pub fn mode(&self) -> ActionMeaningsMode {
        self.mode
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.env
    }

    fn to_inner(&self, action: &Action) -> Result<Action, EnvError> {
        if !self.action_space.contains(action) {
            return Err(EnvError::InvalidAction {
                action: action.clone(),
                space: self.action_space.clone(),
            });
        }
        match (self.mode, action) {
            (ActionMeaningsMode::Flattened, Action::Discrete(index)) => {
                Ok(decode(self.env.action_space(), *index))
            }
            _ => Ok(action.clone()),
        }
    }
}

fn decode(space: &ActionSpace, mut index: usize) -> Action {
    match space {
        ActionSpace::Discrete(_) => Action::Discrete(index),
        ActionSpace::MultiDiscrete(nvec) => {
            let mut components = vec![0; nvec.len()];
            for (c, n) in components.iter_mut().zip(nvec).rev() {
                *c = index % n;
                index /= n;
            }
            Action::MultiDiscrete(components)
        }
    }
}

fn meaning(action: &Action) -> String {
    match action {
        Action::Discrete(a) => format!("ACTION_{a}"),
        Action::MultiDiscrete(components) => {
            let parts = components
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            format!("ACTION_{}", parts.join("_"))
        }
    }
}

impl<E> Env for ActionMeanings<E>
where
    E: Env,
{
    fn observation_space(&self) -> &BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.env.reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let inner = self.to_inner(action)?;
        self.env.step(&inner)
    }

    fn close(&mut self) {
        self.env.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DummyEnv;

    fn multi_env(mode: ActionMeaningsMode) -> ActionMeanings<DummyEnv> {
        let env = DummyEnv::with_seed(
            BoxSpace::new(vec![1], 0.0, 1.0),
            ActionSpace::MultiDiscrete(vec![2, 3]),
            5,
        );
        ActionMeanings::new(env, mode)
    }

    #[test]
    fn test_flattened_space_size() {
        let env = multi_env(ActionMeaningsMode::Flattened);
        assert_eq!(env.action_space(), &ActionSpace::Discrete(6));
        assert_eq!(env.action_meanings().len(), 6);
        assert_eq!(env.action_meanings()[4], "ACTION_1_1");
    }

    #[test]
    fn test_decode_row_major() {
        let space = ActionSpace::MultiDiscrete(vec![2, 3]);
        assert_eq!(decode(&space, 0), Action::MultiDiscrete(vec![0, 0]));
        assert_eq!(decode(&space, 2), Action::MultiDiscrete(vec![0, 2]));
        assert_eq!(decode(&space, 3), Action::MultiDiscrete(vec![1, 0]));
        assert_eq!(decode(&space, 5), Action::MultiDiscrete(vec![1, 2]));
    }

    #[test]
    fn test_flattened_step_reaches_inner_env() {
        let mut env = multi_env(ActionMeaningsMode::Flattened);
        env.reset().unwrap();
        assert!(env.step(&Action::Discrete(5)).is_ok());
        assert!(env.step(&Action::Discrete(6)).unwrap_err().is_invalid_action());
        assert!(
            env.step(&Action::MultiDiscrete(vec![1, 2]))
                .unwrap_err()
                .is_invalid_action()
        );
    }

    #[test]
    fn test_native_mode_keeps_space() {
        let mut env = multi_env(ActionMeaningsMode::Native);
        assert_eq!(env.action_space(), &ActionSpace::MultiDiscrete(vec![2, 3]));
        env.reset().unwrap();
        assert!(env.step(&Action::MultiDiscrete(vec![1, 2])).is_ok());
    }

    #[test]
    fn test_discrete_inner_is_identity() {
        let env = DummyEnv::with_seed(
            BoxSpace::new(vec![1], 0.0, 1.0),
            ActionSpace::Discrete(25),
            5,
        );
        let env = ActionMeanings::new(env, ActionMeaningsMode::Flattened);
        assert_eq!(env.action_space(), &ActionSpace::Discrete(25));
        assert_eq!(env.action_meanings()[24], "ACTION_24");
    }
}
