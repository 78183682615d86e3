//! Mutable search state of one branch.

use marlin_core::{BoundStore, VarId};
use marlin_pwl::PhaseStore;
use marlin_simplex::Tableau;
use thiserror::Error;

use crate::problem::Problem;

/// Why a branch was closed. Never escapes the search: the engine answers
/// every one of these by backtracking.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BranchFailure {
    /// The bounds of a variable crossed.
    #[error("bounds of {var} crossed")]
    NumericalContradiction { var: VarId },
    /// No phase of a constraint is compatible with the bounds.
    #[error("constraint #{constraint} has no feasible phase")]
    NoFeasiblePhase { constraint: usize },
    /// A tableau row proves the bounds cannot be met.
    #[error("row of {basic} cannot reach its bounds")]
    Infeasible { basic: VarId },
    /// The pivot budget ran out under both pivot rules.
    #[error("tableau degenerate after {pivots} pivots")]
    TableauDegeneracy { pivots: usize },
    /// The tableau could not be repaired and no proof was found.
    #[error("numerical instability in row of {basic}")]
    NumericalInstability { basic: VarId },
}

impl BranchFailure {
    /// Failures that close a branch without a proof of infeasibility.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            BranchFailure::TableauDegeneracy { .. } | BranchFailure::NumericalInstability { .. }
        )
    }
}

/// Bounds, tableau and phases of the current branch.
///
/// Each part keeps its own undo trail; [`marks`](Self::marks) records a
/// position in all three, and [`restore`](Self::restore) rewinds them
/// together.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub bounds: BoundStore,
    pub tableau: Tableau,
    pub phases: PhaseStore,
}

/// Trail positions of a [`SearchContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMarks {
    bounds: usize,
    tableau: usize,
    phases: usize,
}

impl SearchContext {
    /// Root context of `problem`. Fails when the initial bounds cross.
    pub fn new(problem: &Problem) -> Result<Self, VarId> {
        Ok(Self {
            bounds: problem.initial_bounds()?,
            tableau: Tableau::new(problem.num_vars(), problem.definitions().to_vec()),
            phases: PhaseStore::new(problem.num_constraints()),
        })
    }

    pub fn marks(&self) -> ContextMarks {
        ContextMarks {
            bounds: self.bounds.mark(),
            tableau: self.tableau.mark(),
            phases: self.phases.mark(),
        }
    }

    /// Rewind to `marks`. Everything recorded since is undone exactly.
    pub fn restore(&mut self, marks: ContextMarks) {
        self.bounds.undo_to(marks.bounds);
        self.tableau.undo_to(marks.tableau);
        self.phases.undo_to(marks.phases);
    }

    /// Make the current state the base state by dropping all trails.
    pub fn commit(&mut self) {
        self.bounds.clear_trail();
        self.tableau.clear_trail();
        self.phases.clear_trail();
    }

    /// Independent copy, e.g. for exploring a subtree elsewhere.
    pub fn fork(&self) -> Self {
        self.clone()
    }
}
