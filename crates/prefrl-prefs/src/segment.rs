//! Fixed-length trajectory segments.

use std::{mem, sync::Arc};

use prefrl_env::{Action, Observation};
use serde::{Deserialize, Serialize};

/// Identifier of a segment, unique within a preference store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("seg#{_0}")]
pub struct SegmentId(u64);

impl SegmentId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// An ordered slice of trajectory: one frame, action and environment reward
/// per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    id: SegmentId,
    frames: Vec<Observation>,
    actions: Vec<Action>,
    rewards: Vec<f32>,
}

impl Segment {
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[must_use]
    pub fn frames(&self) -> &[Observation] {
        &self.frames
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Environment rewards, one per transition.
    #[must_use]
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of environment rewards over the segment.
    #[must_use]
    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }
}

/// Accumulates transitions into segments of exactly `segment_length` steps.
///
/// # Example
///
/// ```
/// use prefrl_env::{Action, Observation};
/// use prefrl_prefs::segment::SegmentBuilder;
///
/// let mut builder = SegmentBuilder::new(3);
/// let mut completed = vec![];
/// for i in 0..7 {
///     let obs = Observation::zeros(vec![2]);
///     completed.extend(builder.push(obs, Action::Discrete(0), i as f32));
/// }
/// assert_eq!(completed.len(), 2);
/// assert_eq!(builder.pending(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    segment_length: usize,
    next_id: u64,
    frames: Vec<Observation>,
    actions: Vec<Action>,
    rewards: Vec<f32>,
}

impl SegmentBuilder {
    /// Creates a builder whose first segment has id 0.
    ///
    /// # Panics
    ///
    /// Panics if `segment_length` is zero.
    #[must_use]
    pub fn new(segment_length: usize) -> Self {
        Self::with_first_id(segment_length, SegmentId(0))
    }

    /// Creates a builder whose first segment has id `first_id`.
    ///
    /// Used when resuming from a saved store so new ids do not collide with
    /// loaded ones.
    ///
    /// # Panics
    ///
    /// Panics if `segment_length` is zero.
    #[must_use]
    pub fn with_first_id(segment_length: usize, first_id: SegmentId) -> Self {
        assert!(segment_length > 0, "segment_length must be positive");
        Self {
            segment_length,
            next_id: first_id.0,
            frames: Vec::with_capacity(segment_length),
            actions: Vec::with_capacity(segment_length),
            rewards: Vec::with_capacity(segment_length),
        }
    }

    #[must_use]
    pub fn segment_length(&self) -> usize {
        self.segment_length
    }

    /// Number of transitions in the current, incomplete segment.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Appends a transition; returns the segment it completes, if any.
    pub fn push(
        &mut self,
        frame: Observation,
        action: Action,
        reward: f32,
    ) -> Option<Arc<Segment>> {
        self.frames.push(frame);
        self.actions.push(action);
        self.rewards.push(reward);
        if self.frames.len() < self.segment_length {
            return None;
        }

        let id = SegmentId(self.next_id);
        self.next_id += 1;
        let len = self.segment_length;
        let segment = Segment {
            id,
            frames: mem::replace(&mut self.frames, Vec::with_capacity(len)),
            actions: mem::replace(&mut self.actions, Vec::with_capacity(len)),
            rewards: mem::replace(&mut self.rewards, Vec::with_capacity(len)),
        };
        Some(Arc::new(segment))
    }

    /// Drops the incomplete segment, returning how many transitions were discarded.
    pub fn discard(&mut self) -> usize {
        let discarded = self.frames.len();
        self.frames.clear();
        self.actions.clear();
        self.rewards.clear();
        discarded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a one-frame-per-step segment with the given rewards.
    pub(crate) fn segment_with_rewards(id: u64, rewards: &[f32]) -> Arc<Segment> {
        Arc::new(Segment {
            id: SegmentId(id),
            frames: rewards
                .iter()
                .map(|r| Observation::new(vec![1], vec![*r]).unwrap())
                .collect(),
            actions: vec![Action::Discrete(0); rewards.len()],
            rewards: rewards.to_vec(),
        })
    }

    #[test]
    fn test_segments_complete_every_length_steps() {
        let mut builder = SegmentBuilder::new(10);
        let mut completed = 0;
        for _ in 0..30 {
            if builder
                .push(Observation::zeros(vec![1]), Action::Discrete(0), 1.0)
                .is_some()
            {
                completed += 1;
            }
        }
        assert_eq!(completed, 3);
        assert_eq!(builder.pending(), 0);
    }

    #[test]
    fn test_ids_increase() {
        let mut builder = SegmentBuilder::with_first_id(1, SegmentId::new(7));
        let a = builder
            .push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0)
            .unwrap();
        let b = builder
            .push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0)
            .unwrap();
        assert_eq!(a.id(), SegmentId::new(7));
        assert_eq!(b.id(), SegmentId::new(8));
    }

    #[test]
    fn test_segment_contents() {
        let mut builder = SegmentBuilder::new(2);
        assert!(
            builder
                .push(Observation::zeros(vec![1]), Action::Discrete(1), 2.0)
                .is_none()
        );
        let seg = builder
            .push(Observation::zeros(vec![1]), Action::Discrete(3), 5.0)
            .unwrap();
        assert_eq!(seg.len(), 2);
        assert_eq!(seg.actions(), &[Action::Discrete(1), Action::Discrete(3)]);
        assert_eq!(seg.rewards(), &[2.0, 5.0]);
        assert_eq!(seg.total_reward(), 7.0);
    }

    #[test]
    fn test_discard_partial_segment() {
        let mut builder = SegmentBuilder::new(3);
        builder.push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0);
        builder.push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0);
        assert_eq!(builder.discard(), 2);
        assert_eq!(builder.pending(), 0);
        // the next segment still needs a full three steps
        assert!(
            builder
                .push(Observation::zeros(vec![1]), Action::Discrete(0), 0.0)
                .is_none()
        );
    }
}
