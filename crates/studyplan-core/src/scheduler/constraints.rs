//! Removes candidate starts that collide with busy times, classes, or
//! sessions that regeneration must keep.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schedule::{ClassBlock, UserConstraint};

/// What to do with `UserConstraint`s whose `is_hard` flag is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoftConstraintPolicy {
    /// Soft constraints block like hard ones.
    #[default]
    Block,
    /// Only hard constraints block.
    Ignore,
}

/// A fixed local interval that nothing may be scheduled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BlockedInterval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        self.start < to && self.end > from
    }
}

/// Checks candidate sessions against the user's fixed commitments.
pub struct ConstraintFilter<'a> {
    constraints: Vec<&'a UserConstraint>,
    class_blocks: &'a [ClassBlock],
    blocked: Vec<BlockedInterval>,
    granularity: i64,
}

impl<'a> ConstraintFilter<'a> {
    pub fn new(
        constraints: &'a [UserConstraint],
        class_blocks: &'a [ClassBlock],
        blocked: Vec<BlockedInterval>,
        granularity: u32,
        policy: SoftConstraintPolicy,
    ) -> Self {
        let constraints = constraints
            .iter()
            .filter(|c| c.is_hard || policy == SoftConstraintPolicy::Block)
            .collect();
        Self {
            constraints,
            class_blocks,
            blocked,
            granularity: i64::from(granularity.max(1)),
        }
    }

    /// Whether a session of `minutes` may start at `start`.
    ///
    /// The session is walked in granularity steps; any blocked sub-slot
    /// rejects the whole start.
    pub fn permits(&self, start: NaiveDateTime, minutes: u32) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        let step = Duration::minutes(self.granularity);
        let mut t = start;
        while t < end {
            let sub_end = (t + step).min(end);
            if self.is_blocked(t, sub_end) {
                return false;
            }
            t = sub_end;
        }
        true
    }

    /// Keep the starts where a `minutes`-long session fits.
    pub fn filter(&self, candidates: &[NaiveDateTime], minutes: u32) -> Vec<NaiveDateTime> {
        candidates
            .iter()
            .copied()
            .filter(|start| self.permits(*start, minutes))
            .collect()
    }

    fn is_blocked(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        self.constraints.iter().any(|c| c.overlaps(from, to))
            || self.class_blocks.iter().any(|b| b.overlaps(from, to))
            || self.blocked.iter().any(|b| b.overlaps(from, to))
    }
}
