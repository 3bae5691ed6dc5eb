//! Environment adapters.
//!
//! - [`FrameStack`] - Stacks the most recent frames along the channel axis
//! - [`ActionMeanings`] - Flattens multi-discrete action spaces and names each action

pub use self::{action_meanings::*, frame_stack::*};

mod action_meanings;
mod frame_stack;
