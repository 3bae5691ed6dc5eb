//! Gym-style environment abstractions for preference-based reward learning.
//!
//! This crate provides the pieces a reward-learning wrapper needs from an environment:
//!
//! - [`Env`] - The environment trait (`reset`, `step`, `close`)
//! - [`ActionSpace`] / [`BoxSpace`] - Action and observation spaces with sampling
//! - [`Observation`] - Dense `f32` tensor with the channel axis last
//! - [`Step`] - Result of a single environment transition
//! - [`DummyEnv`] - Random environment used for testing and demos
//! - [`wrappers`] - Frame stacking and action flattening adapters
//!
//! # Example
//!
//! ```
//! use prefrl_env::{
//!     ActionSpace, BoxSpace, DummyEnv, Env,
//!     wrappers::{ActionMeanings, ActionMeaningsMode, FrameStack},
//! };
//!
//! let env = DummyEnv::with_seed(BoxSpace::new(vec![8, 8, 3], 0.0, 255.0), ActionSpace::Discrete(25), 0);
//! let env = FrameStack::new(env, 4);
//! let mut env = ActionMeanings::new(env, ActionMeaningsMode::Flattened);
//!
//! let obs = env.reset().unwrap();
//! assert_eq!(obs.shape(), &[8, 8, 12]);
//!
//! let mut rng = rand::rng();
//! let action = env.action_space().sample(&mut rng);
//! let step = env.step(&action).unwrap();
//! assert!(step.reward >= 0.0);
//! ```

pub use self::{dummy::*, env::*, observation::*, space::*};

mod dummy;
mod env;
mod observation;
mod space;
pub mod wrappers;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::IsVariant)]
pub enum EnvError {
    #[display("action {action:?} is not contained in action space {space:?}")]
    InvalidAction { action: Action, space: ActionSpace },
    #[display("observation shape {actual:?} does not match expected shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[display("step called before reset")]
    NeedsReset,
    #[display("environment already closed")]
    Closed,
}
