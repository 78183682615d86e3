//! Entry point: solve queries, compute bounds, and answer network-level
//! questions on top of the search.

use marlin_core::{Bound, MarlinError, Result, VarId};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::SearchContext;
use crate::network::{FeedForwardNetwork, RobustnessOutcome};
use crate::problem::Problem;
use crate::query::InputQuery;
use crate::result::{BoundsOutcome, SolveOutcome, Verdict};
use crate::search::{AbortHandle, SearchEngine};
use crate::tightener::BoundTightener;

/// Solver facade. Cheap to clone; clones share the abort handle.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    abort: AbortHandle,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            abort: AbortHandle::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle that stops any search this engine is running.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Decide `query`.
    ///
    /// Malformed queries are reported as errors. Every other outcome,
    /// including running out of budget, is a [`Verdict`].
    #[instrument(skip_all, fields(vars = query.num_vars(), constraints = query.constraints().len()))]
    pub fn solve(&self, query: &InputQuery) -> Result<SolveOutcome> {
        let problem = Problem::from_query(query, self.config.tolerance)?;
        let mut search = SearchEngine::new(Arc::new(problem), self.config.clone())
            .with_abort_handle(self.abort.clone());
        let verdict = search.run();
        Ok(SolveOutcome {
            verdict,
            stats: search.stats().clone(),
        })
    }

    /// Bounds of every query variable after root-level propagation, without
    /// any case splitting.
    #[instrument(skip_all, fields(vars = query.num_vars()))]
    pub fn calculate_bounds(&self, query: &InputQuery) -> Result<BoundsOutcome> {
        let problem = Problem::from_query(query, self.config.tolerance)?;
        let Ok(mut ctx) = SearchContext::new(&problem) else {
            return Ok(BoundsOutcome::Infeasible);
        };
        if let Err(failure) =
            BoundTightener::new(&problem, &self.config).propagate_to_fixpoint(&mut ctx)
        {
            info!(%failure, "propagation proved the query infeasible");
            return Ok(BoundsOutcome::Infeasible);
        }
        let bounds = (0..problem.num_query_vars())
            .map(|i| ctx.bounds.get(VarId(i)))
            .collect();
        Ok(BoundsOutcome::Bounds(bounds))
    }

    /// Outputs of the encoded network for concrete `inputs`, obtained by
    /// fixing the query's input variables and solving.
    ///
    /// Returns `None` when the query has no solution for these inputs or the
    /// search gave up.
    pub fn evaluate(&self, query: &InputQuery, inputs: &[f64]) -> Result<Option<Vec<f64>>> {
        if inputs.len() != query.input_vars().len() {
            return Err(MarlinError::ShapeMismatch {
                context: "query inputs",
                expected: query.input_vars().len(),
                got: inputs.len(),
            });
        }
        let mut fixed = query.clone();
        for (&var, &value) in query.input_vars().iter().zip(inputs) {
            fixed.set_lower_bound(var, value);
            fixed.set_upper_bound(var, value);
        }
        let outcome = self.solve(&fixed)?;
        match outcome.verdict {
            Verdict::Sat(assignment) => Ok(Some(assignment.output_values())),
            Verdict::Unsat => Ok(None),
            Verdict::Unknown(reason) => {
                warn!(%reason, "evaluation did not finish");
                Ok(None)
            }
        }
    }

    /// Per-output absolute difference between the network's forward pass
    /// and the solver's evaluation of its encoding at `inputs`.
    pub fn find_error(
        &self,
        network: &FeedForwardNetwork,
        inputs: &[f64],
    ) -> Result<Option<Vec<f64>>> {
        let expected = network.evaluate(inputs)?;
        let point: Vec<Bound> = inputs.iter().map(|&x| Bound::concrete(x)).collect();
        let encoded = network.encode(&point)?;
        let Some(actual) = self.evaluate(&encoded.query, inputs)? else {
            return Ok(None);
        };
        Ok(Some(
            expected
                .iter()
                .zip(&actual)
                .map(|(e, a)| (e - a).abs())
                .collect(),
        ))
    }

    /// Whether every input within `epsilon` (L∞) of `input` keeps
    /// `original_class` the top output.
    ///
    /// With a `target_class`, only that class is tried, and it must beat
    /// every other output. Otherwise each other class is tried in index
    /// order against the original one.
    #[instrument(skip_all, fields(epsilon = epsilon, class = original_class))]
    pub fn local_robustness(
        &self,
        network: &FeedForwardNetwork,
        input: &[f64],
        epsilon: f64,
        original_class: usize,
        target_class: Option<usize>,
    ) -> Result<RobustnessOutcome> {
        if input.len() != network.input_size() {
            return Err(MarlinError::ShapeMismatch {
                context: "network input",
                expected: network.input_size(),
                got: input.len(),
            });
        }
        if !(epsilon.is_finite() && epsilon >= 0.0) {
            return Err(MarlinError::InvalidRadius { epsilon });
        }
        if let Some(var) = input.iter().position(|x| !x.is_finite()) {
            return Err(MarlinError::InvalidBound {
                var,
                reason: format!("input value {} is not finite", input[var]),
            });
        }
        network.validate()?;
        let n_out = network.output_size();
        for class in std::iter::once(original_class).chain(target_class) {
            if class >= n_out {
                return Err(MarlinError::ShapeMismatch {
                    context: "class index",
                    expected: n_out,
                    got: class,
                });
            }
        }

        let region: Vec<Bound> = input
            .iter()
            .map(|&x| Bound::new(x - epsilon, x + epsilon))
            .collect();
        let encoded = network.encode(&region)?;
        let out = &encoded.outputs;
        let candidates: Vec<usize> = match target_class {
            Some(target) => vec![target],
            None => (0..n_out).filter(|&c| c != original_class).collect(),
        };

        let mut nodes = 0;
        for class in candidates {
            let mut query = encoded.query.clone();
            match target_class {
                // every other output ≤ target
                Some(target) => {
                    for j in (0..n_out).filter(|&j| j != target) {
                        query.add_inequality(&[out[j], out[target]], &[1.0, -1.0], 0.0, true)?;
                    }
                }
                // original ≤ class
                None => {
                    query.add_inequality(
                        &[out[original_class], out[class]],
                        &[1.0, -1.0],
                        0.0,
                        true,
                    )?;
                }
            }
            let outcome = self.solve(&query)?;
            nodes += outcome.stats.nodes;
            match outcome.verdict {
                Verdict::Sat(assignment) => {
                    info!(class, nodes, "adversarial point found");
                    return Ok(RobustnessOutcome::Adversarial { class, assignment });
                }
                Verdict::Unsat => continue,
                Verdict::Unknown(reason) => return Ok(RobustnessOutcome::Unknown(reason)),
            }
        }
        info!(nodes, "robust");
        Ok(RobustnessOutcome::Robust)
    }
}
