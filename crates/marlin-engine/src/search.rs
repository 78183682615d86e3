//! Branch-and-bound search over case splits, written as an explicit state
//! machine so it can be stepped, inspected and interrupted between states.
//!
//! ```text
//! Propagate ──► PickSplit ──► ApplySplit ──► Propagate
//!     │  └──► Sat                  ▲
//!     ▼                            │
//! Backtrack ───────────────────────┘ (next alternative)
//!     └──► Unsat (stack empty)
//! ```

use marlin_core::{BoundStore, Tolerance};
use marlin_pwl::{CaseSplit, Evaluation, PhaseStore, PiecewiseLinear};
use marlin_simplex::{Tableau, TableauFailure};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::checkpoint::{Checkpoint, CheckpointStack};
use crate::config::{BranchingHeuristic, EngineConfig};
use crate::context::{BranchFailure, SearchContext};
use crate::problem::Problem;
use crate::result::{Assignment, Statistics, UnknownReason, Verdict};
use crate::tightener::{BoundTightener, PropagationSummary};
use crate::verify::verify_solution;

/// Shared flag for stopping a running search from another thread.
///
/// The search polls it before propagating and before picking a split, and
/// answers `Unknown(Interrupted)` once it is set.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Propagate,
    PickSplit,
    /// Split on the given constraint.
    ApplySplit(usize),
    Backtrack,
    Sat,
    Unsat,
}

pub struct SearchEngine {
    problem: Arc<Problem>,
    config: EngineConfig,
    context: SearchContext,
    stack: CheckpointStack,
    state: SearchState,
    /// Violated unfixed constraints found by the last propagation, by index.
    violated: Vec<(usize, f64)>,
    solution: Option<Assignment>,
    verdict: Option<Verdict>,
    stats: Statistics,
    abort: AbortHandle,
    started: Instant,
}

impl SearchEngine {
    pub fn new(problem: Arc<Problem>, config: EngineConfig) -> Self {
        let (context, state) = match SearchContext::new(&problem) {
            Ok(context) => (context, SearchState::Propagate),
            Err(var) => {
                debug!(%var, "initial bounds cross");
                let context = SearchContext {
                    bounds: BoundStore::new(problem.num_vars(), config.tolerance),
                    tableau: Tableau::new(problem.num_vars(), problem.definitions().to_vec()),
                    phases: PhaseStore::new(problem.num_constraints()),
                };
                (context, SearchState::Unsat)
            }
        };
        Self {
            problem,
            config,
            context,
            stack: CheckpointStack::new(),
            state,
            violated: Vec::new(),
            solution: None,
            verdict: None,
            stats: Statistics::default(),
            abort: AbortHandle::new(),
            started: Instant::now(),
        }
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Run until a verdict.
    pub fn run(&mut self) -> Verdict {
        info!(
            vars = self.problem.num_vars(),
            rows = self.problem.num_definitions(),
            constraints = self.problem.num_constraints(),
            "search started"
        );
        self.started = Instant::now();
        loop {
            if let Some(verdict) = self.step() {
                return verdict;
            }
        }
    }

    /// Perform one state transition. Returns the verdict once the search
    /// has finished, and keeps returning it on further calls.
    pub fn step(&mut self) -> Option<Verdict> {
        if let Some(verdict) = &self.verdict {
            return Some(verdict.clone());
        }
        match self.state {
            SearchState::Propagate => {
                if let Some(reason) = self.interruption() {
                    return Some(self.finish(Verdict::Unknown(reason)));
                }
                self.state = self.propagate();
            }
            SearchState::PickSplit => {
                if let Some(reason) = self.interruption() {
                    return Some(self.finish(Verdict::Unknown(reason)));
                }
                if self.node_budget_exhausted() {
                    return Some(self.finish(Verdict::Unknown(UnknownReason::NodeBudget)));
                }
                self.state = self.pick_split();
            }
            SearchState::ApplySplit(constraint) => self.state = self.apply_split(constraint),
            SearchState::Backtrack => self.state = self.backtrack(),
            SearchState::Sat => {
                let verdict = match self.solution.clone() {
                    Some(assignment) => Verdict::Sat(assignment),
                    None => Verdict::Unknown(UnknownReason::Numerical),
                };
                return Some(self.finish(verdict));
            }
            SearchState::Unsat => {
                let verdict = if self.stats.numerical_prunes > 0 {
                    Verdict::Unknown(UnknownReason::Numerical)
                } else {
                    Verdict::Unsat
                };
                return Some(self.finish(verdict));
            }
        }
        None
    }

    fn finish(&mut self, verdict: Verdict) -> Verdict {
        let tableau = self.context.tableau.stats();
        self.stats.pivots = tableau.pivots;
        self.stats.refactorizations = tableau.refactorizations as usize;
        self.stats.elapsed = self.started.elapsed();
        info!(
            %verdict,
            nodes = self.stats.nodes,
            backtracks = self.stats.backtracks,
            max_depth = self.stats.max_depth,
            pivots = self.stats.pivots,
            numerical_prunes = self.stats.numerical_prunes,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "search finished"
        );
        self.verdict = Some(verdict.clone());
        verdict
    }

    fn interruption(&self) -> Option<UnknownReason> {
        if self.abort.is_aborted() {
            return Some(UnknownReason::Interrupted);
        }
        match self.config.timeout {
            Some(limit) if self.started.elapsed() >= limit => Some(UnknownReason::Timeout),
            _ => None,
        }
    }

    fn node_budget_exhausted(&self) -> bool {
        self.config
            .max_nodes
            .is_some_and(|max| self.stats.nodes >= max)
    }

    fn record(&mut self, summary: PropagationSummary) {
        self.stats.propagation_rounds += summary.rounds;
        self.stats.tightenings += summary.tightenings;
        self.stats.implied_phase_fixes += summary.implied_phases;
    }

    fn propagate(&mut self) -> SearchState {
        if self.stack.is_empty() {
            // Nothing above the root to return to.
            self.context.commit();
        }
        let tightener = BoundTightener::new(&self.problem, &self.config);
        match tightener.propagate_to_fixpoint(&mut self.context) {
            Ok(summary) => self.record(summary),
            Err(failure) => {
                debug!(%failure, depth = self.stack.depth(), "branch closed by propagation");
                return SearchState::Backtrack;
            }
        }

        let tol = self.config.tolerance;
        for attempt in 0..2 {
            if attempt > 0 {
                self.context.tableau.refactor(&tol);
            }
            if let Err(failure) = self.solve_lp(&tol) {
                if failure.is_numerical() {
                    debug!(%failure, depth = self.stack.depth(), "branch pruned on numerical grounds");
                    self.stats.numerical_prunes += 1;
                } else {
                    debug!(%failure, depth = self.stack.depth(), "branch infeasible");
                }
                return SearchState::Backtrack;
            }

            let values = self.context.tableau.values();
            let mut violated = Vec::new();
            let mut fixed_violated = false;
            for (i, c) in self.problem.constraints().iter().enumerate() {
                if let Evaluation::Violated(distance) = c.evaluate(values, &tol) {
                    if self.context.phases.is_fixed(i) {
                        fixed_violated = true;
                    } else {
                        violated.push((i, distance));
                    }
                }
            }
            if !violated.is_empty() {
                self.violated = violated;
                return SearchState::PickSplit;
            }
            if fixed_violated {
                debug!(attempt, "assignment violates a fixed constraint");
                continue;
            }

            let n = self.problem.num_query_vars();
            let query = self.problem.query();
            match verify_solution(query, &values[..n], &tol) {
                Ok(()) => {
                    self.solution = Some(Assignment::new(
                        values[..n].to_vec(),
                        query.input_vars().to_vec(),
                        query.output_vars().to_vec(),
                    ));
                    return SearchState::Sat;
                }
                Err(defect) => debug!(%defect, attempt, "candidate rejected by verification"),
            }
        }
        debug!(depth = self.stack.depth(), "branch pruned on numerical grounds");
        self.stats.numerical_prunes += 1;
        SearchState::Backtrack
    }

    /// Make the tableau assignment satisfy the current bounds, retrying once
    /// with a fresh factorization and the alternate pivot rule.
    fn solve_lp(&mut self, tol: &Tolerance) -> Result<(), BranchFailure> {
        let rule = self.config.pivot_rule;
        let first = self
            .context
            .tableau
            .check(&self.context.bounds, rule, self.config.max_pivots);
        let residual = self.context.tableau.max_definition_residual();
        match first {
            Ok(_) if residual <= tol.feasibility() => return Ok(()),
            Ok(_) => debug!(residual, "rows drifted from definitions"),
            Err(TableauFailure::Infeasible { basic }) if residual <= tol.feasibility() => {
                return Err(BranchFailure::Infeasible { basic });
            }
            Err(failure) => debug!(%failure, residual, "feasibility check failed"),
        }

        self.context.tableau.refactor(tol);
        let retry = self
            .context
            .tableau
            .check(&self.context.bounds, rule.alternate(), self.config.max_pivots);
        match retry {
            Ok(_) => Ok(()),
            Err(TableauFailure::Infeasible { basic }) => Err(BranchFailure::Infeasible { basic }),
            Err(TableauFailure::Degenerate { pivots }) => {
                Err(BranchFailure::TableauDegeneracy { pivots })
            }
            Err(TableauFailure::Numerical { basic }) => {
                Err(BranchFailure::NumericalInstability { basic })
            }
        }
    }

    fn pick_split(&mut self) -> SearchState {
        let choice = match self.config.branching {
            // `violated` is in index order, so keeping the first maximum
            // breaks ties towards the lowest index.
            BranchingHeuristic::MostViolated => {
                self.violated
                    .iter()
                    .copied()
                    .fold(None, |best: Option<(usize, f64)>, candidate| match best {
                        Some(b) if b.1 >= candidate.1 => Some(b),
                        _ => Some(candidate),
                    })
            }
            BranchingHeuristic::Sequential => self.violated.first().copied(),
        };
        match choice {
            Some((constraint, _)) => SearchState::ApplySplit(constraint),
            None => SearchState::Propagate,
        }
    }

    fn apply_split(&mut self, constraint: usize) -> SearchState {
        let mut splits: VecDeque<CaseSplit> = self.problem.constraint(constraint).case_splits().into();
        let Some(first) = splits.pop_front() else {
            return SearchState::Backtrack;
        };
        let marks = self.context.marks();
        self.stack.push(Checkpoint::new(marks, constraint, splits));
        self.stats.max_depth = self.stats.max_depth.max(self.stack.depth());
        self.enter(constraint, first)
    }

    fn enter(&mut self, constraint: usize, split: CaseSplit) -> SearchState {
        self.stats.nodes += 1;
        trace!(constraint, phase = %split.phase, depth = self.stack.depth(), "case split");
        self.context.phases.set(constraint, split.phase);
        for t in &split.tightenings {
            if self.context.bounds.apply(t).is_contradiction() {
                trace!(%t, "split contradicts bounds");
                return SearchState::Backtrack;
            }
        }
        SearchState::Propagate
    }

    fn backtrack(&mut self) -> SearchState {
        self.stats.backtracks += 1;
        while let Some(mut checkpoint) = self.stack.pop() {
            self.context.restore(checkpoint.marks());
            if let Some(next) = checkpoint.next_alternative() {
                let constraint = checkpoint.constraint();
                self.stack.push(checkpoint);
                return self.enter(constraint, next);
            }
        }
        SearchState::Unsat
    }
}
