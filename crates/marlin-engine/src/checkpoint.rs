//! LIFO stack of decision points.

use marlin_pwl::CaseSplit;
use std::collections::VecDeque;

use crate::context::ContextMarks;

/// State saved before a case split, plus the alternatives not yet tried.
///
/// Only trail positions are stored; the cost of a checkpoint is the size of
/// the changes made below it, not the size of the state.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    marks: ContextMarks,
    constraint: usize,
    alternatives: VecDeque<CaseSplit>,
}

impl Checkpoint {
    pub fn new(marks: ContextMarks, constraint: usize, alternatives: VecDeque<CaseSplit>) -> Self {
        Self {
            marks,
            constraint,
            alternatives,
        }
    }

    pub fn marks(&self) -> ContextMarks {
        self.marks
    }

    /// Constraint that was split on.
    pub fn constraint(&self) -> usize {
        self.constraint
    }

    pub fn remaining(&self) -> usize {
        self.alternatives.len()
    }

    pub fn next_alternative(&mut self) -> Option<CaseSplit> {
        self.alternatives.pop_front()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointStack {
    stack: Vec<Checkpoint>,
}

impl CheckpointStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, checkpoint: Checkpoint) {
        self.stack.push(checkpoint);
    }

    pub fn pop(&mut self) -> Option<Checkpoint> {
        self.stack.pop()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SearchContext;
    use crate::problem::Problem;
    use crate::query::InputQuery;
    use marlin_core::{Tolerance, VarId};
    use marlin_pwl::{Phase, PiecewiseLinear};

    #[test]
    fn test_lifo_with_alternatives() {
        let mut q = InputQuery::with_variables(2);
        q.add_relu(VarId(0), VarId(1));
        let p = Problem::from_query(&q, Tolerance::DEFAULT).unwrap();
        let ctx = SearchContext::new(&p).unwrap();

        let mut splits: VecDeque<CaseSplit> = p.constraint(0).case_splits().into();
        let first = splits.pop_front().unwrap();
        assert_eq!(first.phase, Phase::Active);

        let mut stack = CheckpointStack::new();
        stack.push(Checkpoint::new(ctx.marks(), 0, splits));
        stack.push(Checkpoint::new(ctx.marks(), 0, VecDeque::new()));
        assert_eq!(stack.depth(), 2);

        let mut top = stack.pop().unwrap();
        assert!(top.next_alternative().is_none());
        let mut below = stack.pop().unwrap();
        assert_eq!(below.remaining(), 1);
        assert_eq!(below.next_alternative().map(|s| s.phase), Some(Phase::Inactive));
        assert!(stack.is_empty());
    }
}
