//! The capability set every piecewise-linear constraint provides, and the
//! tagged union the engine stores them in.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::abs::Abs;
use crate::case_split::{CaseSplit, Evaluation, Phase, PhaseInference};
use crate::disjunction::Disjunction;
use crate::leaky_relu::LeakyRelu;
use crate::max::Max;
use crate::relu::Relu;
use crate::sign::Sign;

/// Kind tag for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    Relu,
    LeakyRelu,
    Abs,
    Sign,
    Max,
    Disjunction,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Relu => "relu",
            ConstraintKind::LeakyRelu => "leaky_relu",
            ConstraintKind::Abs => "abs",
            ConstraintKind::Sign => "sign",
            ConstraintKind::Max => "max",
            ConstraintKind::Disjunction => "disjunction",
        };
        f.write_str(name)
    }
}

/// A relation that is linear on each of finitely many regions.
pub trait PiecewiseLinear {
    fn kind(&self) -> ConstraintKind;

    /// Every variable the constraint reads, auxiliaries included.
    fn variables(&self) -> Vec<VarId>;

    /// Check the defining relation against a concrete assignment.
    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation;

    fn is_satisfied(&self, values: &[f64], tol: &Tolerance) -> bool {
        self.evaluate(values, tol).is_satisfied()
    }

    /// The phase forced by `bounds` alone, if any.
    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference;

    /// Append bound tightenings entailed by the relation under `bounds`,
    /// whatever the phase. Only improving tightenings are appended.
    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>);

    /// The alternatives to branch on, in the order the search tries them.
    fn case_splits(&self) -> Vec<CaseSplit>;

    /// The split that enforces `phase`.
    fn case_split(&self, phase: Phase) -> Option<CaseSplit> {
        self.case_splits().into_iter().find(|s| s.phase == phase)
    }
}

/// Any supported piecewise-linear constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum PwlConstraint {
    Relu(Relu),
    LeakyRelu(LeakyRelu),
    Abs(Abs),
    Sign(Sign),
    Max(Max),
    Disjunction(Disjunction),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            PwlConstraint::Relu($c) => $body,
            PwlConstraint::LeakyRelu($c) => $body,
            PwlConstraint::Abs($c) => $body,
            PwlConstraint::Sign($c) => $body,
            PwlConstraint::Max($c) => $body,
            PwlConstraint::Disjunction($c) => $body,
        }
    };
}

impl PiecewiseLinear for PwlConstraint {
    fn kind(&self) -> ConstraintKind {
        dispatch!(self, c => c.kind())
    }

    fn variables(&self) -> Vec<VarId> {
        dispatch!(self, c => c.variables())
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        dispatch!(self, c => c.evaluate(values, tol))
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        dispatch!(self, c => c.implied_phase(bounds))
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        dispatch!(self, c => c.tighten(bounds, out))
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        dispatch!(self, c => c.case_splits())
    }

    fn case_split(&self, phase: Phase) -> Option<CaseSplit> {
        dispatch!(self, c => c.case_split(phase))
    }
}

macro_rules! impl_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for PwlConstraint {
                fn from(c: $variant) -> Self {
                    PwlConstraint::$variant(c)
                }
            }
        )*
    };
}

impl_from!(Relu, LeakyRelu, Abs, Sign, Max, Disjunction);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_matches_variant() {
        let c: PwlConstraint = Relu::new(VarId(0), VarId(1), VarId(2)).into();
        assert_eq!(c.kind(), ConstraintKind::Relu);
        assert_eq!(c.variables(), vec![VarId(0), VarId(1), VarId(2)]);
        assert_eq!(c.case_splits().len(), 2);
        assert_eq!(c.kind().to_string(), "relu");
    }

    #[test]
    fn test_default_case_split_lookup() {
        let c: PwlConstraint = Sign::new(VarId(0), VarId(1), &Tolerance::DEFAULT).into();
        let split = c.case_split(Phase::Negative).unwrap();
        assert_eq!(split.phase, Phase::Negative);
        assert!(c.case_split(Phase::Active).is_none());
    }

    #[test]
    fn test_is_satisfied_uses_evaluate() {
        let c: PwlConstraint = Abs::new(VarId(0), VarId(1), VarId(2), VarId(3)).into();
        assert!(c.is_satisfied(&[-2.0, 2.0, 4.0, 0.0], &Tolerance::DEFAULT));
    }
}
