//! Depth-traversal scheduler.
//!
//! A join over N inner relations is walked as stages 0..=N+1:
//!
//! ```text
//! stage 0        LoadSource   fills buffer 0
//! stage 1..=N    NestLoop(d)  consumes buffer d-1, fills buffer d
//!                HashJoin(d)
//! stage N+1      Project      consumes buffer N
//! ```
//!
//! Each handler reports an [`Outcome`]; [`JoinShape::transition`] maps the
//! current step and the outcome to the next step. The mapping is pure, so
//! the walk can be tested without running any lanes.

use crate::relation::{JoinKind, MultiRelationSet};

/// A scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Load the next batch of source rows into buffer 0.
    LoadSource,
    /// Nested-loop join at the given depth.
    NestLoop(usize),
    /// Hash join at the given depth.
    HashJoin(usize),
    /// Materialize buffer N into the destination.
    Project,
    /// The walk is over.
    Done,
}

/// What a handler asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Revisit the same stage.
    Stay,
    /// Drain the next stage before producing more.
    Dive,
    /// Return to a shallower stage whose input still holds rows.
    Rewind(usize),
    /// Source exhausted and every buffer drained.
    Finish,
    /// An evaluation fault or cancellation stopped the group.
    Abort,
    /// The destination buffer rejected a batch.
    OutOfSpace,
}

/// Join kinds of depths 1..=N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinShape {
    kinds: Vec<JoinKind>,
}

impl JoinShape {
    /// Creates a shape from the join kinds of depths 1..=N.
    #[must_use]
    pub fn new(kinds: Vec<JoinKind>) -> Self {
        Self { kinds }
    }

    /// Derives the shape of a relation set.
    #[must_use]
    pub fn of(relations: &MultiRelationSet) -> Self {
        Self::new(relations.descriptors().iter().map(|d| d.join_kind).collect())
    }

    /// Returns N.
    #[inline]
    #[must_use]
    pub fn num_rels(&self) -> usize {
        self.kinds.len()
    }

    /// Returns the step of `stage`.
    ///
    /// # Panics
    ///
    /// Panics if `stage > N + 1`.
    #[must_use]
    pub fn step_at(&self, stage: usize) -> Step {
        let n = self.num_rels();
        match stage {
            0 => Step::LoadSource,
            s if s <= n => match self.kinds[s - 1] {
                JoinKind::NestLoop => Step::NestLoop(s),
                JoinKind::Hash => Step::HashJoin(s),
            },
            s if s == n + 1 => Step::Project,
            s => panic!("stage {s} beyond projection stage {}", n + 1),
        }
    }

    /// Returns the stage of `step`, or `None` for [`Step::Done`].
    #[must_use]
    pub fn stage_of(&self, step: Step) -> Option<usize> {
        match step {
            Step::LoadSource => Some(0),
            Step::NestLoop(d) | Step::HashJoin(d) => Some(d),
            Step::Project => Some(self.num_rels() + 1),
            Step::Done => None,
        }
    }

    /// Returns the step following `step` after `outcome`.
    ///
    /// # Panics
    ///
    /// Panics on a dive out of the projection stage or a rewind that does
    /// not move to a shallower stage.
    #[must_use]
    pub fn transition(&self, step: Step, outcome: Outcome) -> Step {
        let Some(stage) = self.stage_of(step) else {
            return Step::Done;
        };
        match outcome {
            Outcome::Stay => step,
            Outcome::Dive => {
                assert!(stage <= self.num_rels(), "projection stage cannot dive");
                self.step_at(stage + 1)
            }
            Outcome::Rewind(target) => {
                assert!(target < stage, "rewind from stage {stage} to stage {target}");
                self.step_at(target)
            }
            Outcome::Finish | Outcome::Abort | Outcome::OutOfSpace => Step::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> JoinShape {
        JoinShape::new(vec![JoinKind::Hash, JoinKind::NestLoop])
    }

    #[test]
    fn test_stages() {
        let shape = shape();
        assert_eq!(shape.step_at(0), Step::LoadSource);
        assert_eq!(shape.step_at(1), Step::HashJoin(1));
        assert_eq!(shape.step_at(2), Step::NestLoop(2));
        assert_eq!(shape.step_at(3), Step::Project);
        assert_eq!(shape.stage_of(Step::Project), Some(3));
        assert_eq!(shape.stage_of(Step::Done), None);
    }

    #[test]
    fn test_dive_walks_deeper() {
        let shape = shape();
        let mut step = Step::LoadSource;
        let mut visited = vec![step];
        while step != Step::Project {
            step = shape.transition(step, Outcome::Dive);
            visited.push(step);
        }
        assert_eq!(
            visited,
            vec![Step::LoadSource, Step::HashJoin(1), Step::NestLoop(2), Step::Project]
        );
    }

    #[test]
    fn test_rewind_and_stay() {
        let shape = shape();
        assert_eq!(shape.transition(Step::Project, Outcome::Rewind(1)), Step::HashJoin(1));
        assert_eq!(shape.transition(Step::NestLoop(2), Outcome::Rewind(0)), Step::LoadSource);
        assert_eq!(shape.transition(Step::NestLoop(2), Outcome::Stay), Step::NestLoop(2));
    }

    #[test]
    fn test_terminal_outcomes() {
        let shape = shape();
        for outcome in [Outcome::Finish, Outcome::Abort, Outcome::OutOfSpace] {
            assert_eq!(shape.transition(Step::HashJoin(1), outcome), Step::Done);
        }
        assert_eq!(shape.transition(Step::Done, Outcome::Stay), Step::Done);
        assert_eq!(shape.transition(Step::Done, Outcome::Dive), Step::Done);
    }

    #[test]
    fn test_no_inner_relations() {
        let shape = JoinShape::new(Vec::new());
        assert_eq!(shape.transition(Step::LoadSource, Outcome::Dive), Step::Project);
    }

    #[test]
    #[should_panic(expected = "cannot dive")]
    fn test_projection_cannot_dive() {
        let _ = shape().transition(Step::Project, Outcome::Dive);
    }

    #[test]
    #[should_panic(expected = "rewind from stage")]
    fn test_rewind_must_go_back() {
        let _ = shape().transition(Step::HashJoin(1), Outcome::Rewind(2));
    }
}
