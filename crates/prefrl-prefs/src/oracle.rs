//! Sources of preference judgments.
//!
//! - [`SyntheticOracle`] prefers the segment with the larger total environment reward
//! - [`ScriptedOracle`] replays a fixed sequence of judgments (recorded labels, tests)

use std::{cmp::Ordering, collections::VecDeque, fmt};

use crate::{preference::Preference, segment::Segment};

/// Judges which of two segments is preferable.
///
/// Returning `None` marks the pair as incomparable; it is then discarded.
pub trait PreferenceOracle: fmt::Debug + Send {
    fn judge(&mut self, left: &Segment, right: &Segment) -> Option<Preference>;
}

pub type BoxedPreferenceOracle = Box<dyn PreferenceOracle>;

/// Judges by comparing the sum of environment rewards; equal sums are a tie.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticOracle;

impl PreferenceOracle for SyntheticOracle {
    fn judge(&mut self, left: &Segment, right: &Segment) -> Option<Preference> {
        let pref = match left.total_reward().partial_cmp(&right.total_reward())? {
            Ordering::Greater => Preference::Left,
            Ordering::Less => Preference::Right,
            Ordering::Equal => Preference::Tie,
        };
        Some(pref)
    }
}

/// Replays judgments in order; exhausted scripts judge every pair incomparable.
#[derive(Debug, Default, Clone)]
pub struct ScriptedOracle {
    script: VecDeque<Option<Preference>>,
}

impl ScriptedOracle {
    #[must_use]
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<Preference>>,
    {
        Self {
            script: script.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl PreferenceOracle for ScriptedOracle {
    fn judge(&mut self, _left: &Segment, _right: &Segment) -> Option<Preference> {
        self.script.pop_front().flatten()
    }
}
