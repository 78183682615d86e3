//! Bound propagation to a fixpoint.
//!
//! Sources of tightenings, in the order they are consulted each round:
//! definition rows (interval arithmetic), piecewise-linear constraints
//! (including phases implied by bounds alone), and, once both work lists are
//! empty, the current tableau rows.

use marlin_core::Tightening;
use marlin_pwl::{PhaseInference, PiecewiseLinear};
use marlin_simplex::tighten_linear;
use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::context::{BranchFailure, SearchContext};
use crate::problem::Problem;

/// Counters from one propagation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    pub rounds: usize,
    pub tightenings: usize,
    pub implied_phases: usize,
    /// Propagation stopped at the round cap rather than at a fixpoint.
    pub hit_round_cap: bool,
}

pub struct BoundTightener<'a> {
    problem: &'a Problem,
    config: &'a EngineConfig,
}

struct WorkLists {
    equations: BTreeSet<usize>,
    constraints: BTreeSet<usize>,
}

impl WorkLists {
    fn is_empty(&self) -> bool {
        self.equations.is_empty() && self.constraints.is_empty()
    }
}

impl<'a> BoundTightener<'a> {
    pub fn new(problem: &'a Problem, config: &'a EngineConfig) -> Self {
        Self { problem, config }
    }

    /// Apply every derivable tightening until nothing improves by more than
    /// the tolerance, or until the round cap.
    ///
    /// A constraint whose phase becomes implied is fixed in place and its
    /// split applied without a checkpoint. Bounds only ever shrink.
    pub fn propagate_to_fixpoint(
        &self,
        ctx: &mut SearchContext,
    ) -> Result<PropagationSummary, BranchFailure> {
        let p = self.problem;
        let mut summary = PropagationSummary::default();
        let mut work = WorkLists {
            equations: (0..p.num_definitions()).collect(),
            constraints: (0..p.num_constraints()).collect(),
        };
        let mut buffer = Vec::new();

        loop {
            if work.is_empty() {
                if !self.config.tableau_row_tightening {
                    break;
                }
                let derived = ctx.tableau.derive_tighter_bounds(&ctx.bounds);
                self.apply(&derived, ctx, &mut work, &mut summary)?;
                if work.is_empty() {
                    break;
                }
            }
            if summary.rounds >= self.config.max_propagation_rounds {
                debug!(rounds = summary.rounds, "propagation round cap reached");
                summary.hit_round_cap = true;
                break;
            }
            summary.rounds += 1;

            for j in std::mem::take(&mut work.equations) {
                buffer.clear();
                tighten_linear(p.row_terms(j), &ctx.bounds, &mut buffer);
                self.apply(&buffer, ctx, &mut work, &mut summary)?;
            }

            for c in std::mem::take(&mut work.constraints) {
                let constraint = p.constraint(c);
                match constraint.implied_phase(&ctx.bounds) {
                    PhaseInference::Infeasible => {
                        return Err(BranchFailure::NoFeasiblePhase { constraint: c });
                    }
                    PhaseInference::Fixed(phase) if !ctx.phases.is_fixed(c) => {
                        trace!(constraint = c, %phase, "phase implied by bounds");
                        ctx.phases.set(c, phase);
                        summary.implied_phases += 1;
                        if let Some(split) = constraint.case_split(phase) {
                            self.apply(&split.tightenings, ctx, &mut work, &mut summary)?;
                        }
                    }
                    _ => {}
                }
                buffer.clear();
                constraint.tighten(&ctx.bounds, &mut buffer);
                self.apply(&buffer, ctx, &mut work, &mut summary)?;
            }
        }

        trace!(
            rounds = summary.rounds,
            tightenings = summary.tightenings,
            implied = summary.implied_phases,
            "propagation done"
        );
        Ok(summary)
    }

    fn apply(
        &self,
        tightenings: &[Tightening],
        ctx: &mut SearchContext,
        work: &mut WorkLists,
        summary: &mut PropagationSummary,
    ) -> Result<(), BranchFailure> {
        for t in tightenings {
            let result = ctx.bounds.apply(t);
            if result.is_contradiction() {
                trace!(%t, "tightening crosses bounds");
                return Err(BranchFailure::NumericalContradiction { var: t.var });
            }
            if result.is_improved() {
                summary.tightenings += 1;
                work.equations
                    .extend(self.problem.equation_watchers(t.var).iter().copied());
                work.constraints
                    .extend(self.problem.constraint_watchers(t.var).iter().copied());
            }
        }
        Ok(())
    }
}
