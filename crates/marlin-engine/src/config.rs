//! Search configuration.

use marlin_core::{Result, Tolerance};
use marlin_simplex::PivotRule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which violated constraint to split on next.
///
/// Both heuristics are deterministic; ties go to the lowest constraint index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BranchingHeuristic {
    /// Largest distance between the output and the relation's value.
    #[default]
    MostViolated,
    /// Lowest index first, i.e. the order the encoder added constraints
    /// (topological order for a feed-forward encoding).
    Sequential,
}

/// Configuration for the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget. `None` means no limit.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Maximum number of case splits applied. `None` means no limit.
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub branching: BranchingHeuristic,
    /// Tie-break rule for the first feasibility attempt; the alternate rule
    /// is used on retry.
    #[serde(default)]
    pub pivot_rule: PivotRule,
    /// Pivot budget per feasibility check.
    #[serde(default = "default_max_pivots")]
    pub max_pivots: usize,
    /// Cap on propagation rounds per fixpoint computation.
    #[serde(default = "default_max_propagation_rounds")]
    pub max_propagation_rounds: usize,
    /// Also derive bounds from the current tableau rows, not only from the
    /// original equations.
    #[serde(default = "default_tableau_row_tightening")]
    pub tableau_row_tightening: bool,
    #[serde(default)]
    pub tolerance: Tolerance,
}

fn default_max_pivots() -> usize {
    10_000
}

fn default_max_propagation_rounds() -> usize {
    50
}

fn default_tableau_row_tightening() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_nodes: None,
            branching: BranchingHeuristic::default(),
            pivot_rule: PivotRule::default(),
            max_pivots: default_max_pivots(),
            max_propagation_rounds: default_max_propagation_rounds(),
            tableau_row_tightening: default_tableau_row_tightening(),
            tolerance: Tolerance::DEFAULT,
        }
    }
}

impl EngineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    pub fn with_branching(mut self, branching: BranchingHeuristic) -> Self {
        self.branching = branching;
        self
    }

    pub fn with_pivot_rule(mut self, rule: PivotRule) -> Self {
        self.pivot_rule = rule;
        self
    }

    pub fn with_max_pivots(mut self, max_pivots: usize) -> Self {
        self.max_pivots = max_pivots;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
