//! `f = |b|`.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};

use crate::case_split::{compare, propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// Absolute value with `pos_aux = f - b ≥ 0` and `neg_aux = f + b ≥ 0`.
///
/// - Positive: `b ≥ 0`, `pos_aux ≤ 0` (so `f = b`).
/// - Negative: `b ≤ 0`, `neg_aux ≤ 0` (so `f = -b`).
#[derive(Debug, Clone, PartialEq)]
pub struct Abs {
    b: VarId,
    f: VarId,
    pos_aux: VarId,
    neg_aux: VarId,
}

impl Abs {
    pub fn new(b: VarId, f: VarId, pos_aux: VarId, neg_aux: VarId) -> Self {
        Self {
            b,
            f,
            pos_aux,
            neg_aux,
        }
    }
}

impl PiecewiseLinear for Abs {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Abs
    }

    fn variables(&self) -> Vec<VarId> {
        vec![self.b, self.f, self.pos_aux, self.neg_aux]
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        compare(values[self.f.0], values[self.b.0].abs(), tol)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        let tol = bounds.tolerance();
        let b = bounds.get(self.b);
        let pos = bounds.get(self.pos_aux);
        let neg = bounds.get(self.neg_aux);
        if !tol.is_negative(b.lower) || !tol.is_positive(pos.upper) || tol.is_positive(neg.lower) {
            PhaseInference::Fixed(Phase::Positive)
        } else if !tol.is_positive(b.upper) || !tol.is_positive(neg.upper) || tol.is_positive(pos.lower)
        {
            PhaseInference::Fixed(Phase::Negative)
        } else {
            PhaseInference::Unknown
        }
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        propose_lower(out, bounds, self.f, 0.0);
        propose_lower(out, bounds, self.pos_aux, 0.0);
        propose_lower(out, bounds, self.neg_aux, 0.0);

        let reach = b.lower.abs().max(b.upper.abs());
        if reach.is_finite() {
            propose_upper(out, bounds, self.f, reach);
        }
        if b.lower > 0.0 {
            propose_lower(out, bounds, self.f, b.lower);
        } else if b.upper < 0.0 {
            propose_lower(out, bounds, self.f, -b.upper);
        }
        if f.upper.is_finite() {
            propose_lower(out, bounds, self.b, -f.upper);
            propose_upper(out, bounds, self.b, f.upper);
        }
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        vec![
            CaseSplit::new(
                Phase::Positive,
                vec![
                    Tightening::lower(self.b, 0.0),
                    Tightening::upper(self.pos_aux, 0.0),
                ],
            ),
            CaseSplit::new(
                Phase::Negative,
                vec![
                    Tightening::upper(self.b, 0.0),
                    Tightening::upper(self.neg_aux, 0.0),
                ],
            ),
        ]
    }
}
