//! Preference judgments between segment pairs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::segment::{Segment, SegmentId};

/// Which of two segments is preferred.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant,
)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    Left,
    Right,
    /// Both segments are equally preferable.
    Tie,
}

impl Preference {
    /// Target probability distribution `(mu_left, mu_right)` for training.
    #[must_use]
    pub fn mu(self) -> (f32, f32) {
        match self {
            Self::Left => (1.0, 0.0),
            Self::Right => (0.0, 1.0),
            Self::Tie => (0.5, 0.5),
        }
    }
}

/// A judged segment pair.
#[derive(Debug, Clone)]
pub struct PrefRecord {
    pub left: Arc<Segment>,
    pub right: Arc<Segment>,
    pub preference: Preference,
}

impl PrefRecord {
    #[must_use]
    pub fn new(left: Arc<Segment>, right: Arc<Segment>, preference: Preference) -> Self {
        Self {
            left,
            right,
            preference,
        }
    }

    /// Order-insensitive key of the judged pair.
    #[must_use]
    pub fn pair_key(&self) -> (SegmentId, SegmentId) {
        pair_key(self.left.id(), self.right.id())
    }
}

pub(crate) fn pair_key(a: SegmentId, b: SegmentId) -> (SegmentId, SegmentId) {
    if a <= b { (a, b) } else { (b, a) }
}
