//! Phases, case splits and the results constraints report.

use marlin_core::{BoundStore, Tightening, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which linear piece a constraint occupies.
///
/// ReLU-like constraints use `Active`/`Inactive`, Abs and Sign use
/// `Positive`/`Negative`, and k-way constraints (Max, Disjunction) use
/// `Element(i)` for their i-th alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Unfixed,
    Active,
    Inactive,
    Positive,
    Negative,
    Element(usize),
}

impl Phase {
    #[inline]
    pub fn is_fixed(self) -> bool {
        self != Phase::Unfixed
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unfixed => write!(f, "unfixed"),
            Phase::Active => write!(f, "active"),
            Phase::Inactive => write!(f, "inactive"),
            Phase::Positive => write!(f, "positive"),
            Phase::Negative => write!(f, "negative"),
            Phase::Element(i) => write!(f, "element {i}"),
        }
    }
}

/// A branch decision: a phase and the bound tightenings that enforce it.
///
/// Splits are bound-only. Linear consequences such as `f = b` are expressed
/// through auxiliary variables introduced during preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSplit {
    pub phase: Phase,
    pub tightenings: Vec<Tightening>,
}

impl CaseSplit {
    pub fn new(phase: Phase, tightenings: Vec<Tightening>) -> Self {
        Self { phase, tightenings }
    }
}

/// What the current bounds say about a constraint's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInference {
    /// More than one phase remains possible.
    Unknown,
    /// Only this phase is consistent with the bounds.
    Fixed(Phase),
    /// No phase is consistent with the bounds.
    Infeasible,
}

/// Result of checking a constraint against a concrete assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Satisfied,
    /// Violated by the given distance from the nearest satisfying output.
    Violated(f64),
}

impl Evaluation {
    #[inline]
    pub fn is_satisfied(self) -> bool {
        matches!(self, Evaluation::Satisfied)
    }

    /// Zero when satisfied.
    #[inline]
    pub fn violation(self) -> f64 {
        match self {
            Evaluation::Satisfied => 0.0,
            Evaluation::Violated(v) => v,
        }
    }
}

/// Push `var ≥ value` if it improves on the current bound.
pub(crate) fn propose_lower(out: &mut Vec<Tightening>, bounds: &BoundStore, var: VarId, value: f64) {
    if bounds.tolerance().improves_lower(bounds.lower(var), value) {
        out.push(Tightening::lower(var, value));
    }
}

/// Push `var ≤ value` if it improves on the current bound.
pub(crate) fn propose_upper(out: &mut Vec<Tightening>, bounds: &BoundStore, var: VarId, value: f64) {
    if bounds.tolerance().improves_upper(bounds.upper(var), value) {
        out.push(Tightening::upper(var, value));
    }
}

/// Compare an output against its expected value.
pub(crate) fn compare(actual: f64, expected: f64, tol: &marlin_core::Tolerance) -> Evaluation {
    if tol.approx_eq(actual, expected) {
        Evaluation::Satisfied
    } else {
        Evaluation::Violated((actual - expected).abs())
    }
}
