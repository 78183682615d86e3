//! Verdicts, assignments and search statistics.

use marlin_core::{Bound, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why the search stopped without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownReason {
    /// The configured time budget ran out.
    Timeout,
    /// The configured node budget ran out.
    NodeBudget,
    /// Every leaf was closed, but some only because of numerical trouble.
    Numerical,
    /// An external abort was requested.
    Interrupted,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::Timeout => write!(f, "timeout"),
            UnknownReason::NodeBudget => write!(f, "node budget exhausted"),
            UnknownReason::Numerical => write!(f, "numerical instability"),
            UnknownReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// A satisfying assignment for the query's own variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    values: Vec<f64>,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
}

impl Assignment {
    pub fn new(values: Vec<f64>, inputs: Vec<VarId>, outputs: Vec<VarId>) -> Self {
        Self {
            values,
            inputs,
            outputs,
        }
    }

    #[inline]
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn input_values(&self) -> Vec<f64> {
        self.inputs.iter().map(|&v| self.values[v.0]).collect()
    }

    pub fn output_values(&self) -> Vec<f64> {
        self.outputs.iter().map(|&v| self.values[v.0]).collect()
    }
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Sat(Assignment),
    Unsat,
    Unknown(UnknownReason),
}

impl Verdict {
    pub fn is_sat(&self) -> bool {
        matches!(self, Verdict::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, Verdict::Unsat)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Verdict::Unknown(_))
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Verdict::Sat(a) => Some(a),
            _ => None,
        }
    }

    /// Conventional exit-code string for reporting.
    pub fn exit_code(&self) -> &'static str {
        match self {
            Verdict::Sat(_) => "sat",
            Verdict::Unsat => "unsat",
            Verdict::Unknown(UnknownReason::Timeout) => "TIMEOUT",
            Verdict::Unknown(UnknownReason::Interrupted) => "QUIT_REQUESTED",
            Verdict::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Sat(_) => write!(f, "sat"),
            Verdict::Unsat => write!(f, "unsat"),
            Verdict::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// Counters collected during one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Case splits applied, including alternatives tried on backtrack.
    pub nodes: usize,
    pub backtracks: usize,
    pub max_depth: usize,
    pub pivots: u64,
    pub propagation_rounds: usize,
    pub tightenings: usize,
    /// Phases fixed by bounds alone, without a checkpoint.
    pub implied_phase_fixes: usize,
    /// Branches closed because of numerical trouble rather than a proof.
    pub numerical_prunes: usize,
    pub refactorizations: usize,
    pub elapsed: Duration,
}

/// Verdict plus statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub verdict: Verdict,
    pub stats: Statistics,
}

/// Result of root-level bound calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundsOutcome {
    /// Propagation alone proved the query infeasible.
    Infeasible,
    /// Tightened interval of every query variable.
    Bounds(Vec<Bound>),
}

impl BoundsOutcome {
    pub fn bounds(&self) -> Option<&[Bound]> {
        match self {
            BoundsOutcome::Bounds(b) => Some(b),
            BoundsOutcome::Infeasible => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Verdict::Unsat.exit_code(), "unsat");
        assert_eq!(Verdict::Unknown(UnknownReason::Timeout).exit_code(), "TIMEOUT");
        assert_eq!(
            Verdict::Unknown(UnknownReason::Interrupted).exit_code(),
            "QUIT_REQUESTED"
        );
        assert_eq!(Verdict::Unknown(UnknownReason::Numerical).exit_code(), "UNKNOWN");
    }

    #[test]
    fn test_assignment_views() {
        let a = Assignment::new(vec![0.5, 1.0, 2.0], vec![VarId(0)], vec![VarId(2)]);
        assert_eq!(a.input_values(), vec![0.5]);
        assert_eq!(a.output_values(), vec![2.0]);
        let v = Verdict::Sat(a);
        assert!(v.is_sat());
        assert_eq!(v.assignment().map(|a| a.value(VarId(1))), Some(1.0));
    }

    #[test]
    fn test_statistics_serialize() {
        let stats = Statistics {
            nodes: 3,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: Statistics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
