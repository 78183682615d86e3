//! `f = max(0, b)`.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};

use crate::case_split::{compare, propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// ReLU over input `b` and output `f`, with `aux = f - b ≥ 0` defined by an
/// equation added during preprocessing.
///
/// - Active: `b ≥ 0`, `aux ≤ 0` (so `f = b`).
/// - Inactive: `b ≤ 0`, `f ≤ 0` (so `f = 0`).
#[derive(Debug, Clone, PartialEq)]
pub struct Relu {
    b: VarId,
    f: VarId,
    aux: VarId,
}

impl Relu {
    pub fn new(b: VarId, f: VarId, aux: VarId) -> Self {
        Self { b, f, aux }
    }

    pub fn input(&self) -> VarId {
        self.b
    }

    pub fn output(&self) -> VarId {
        self.f
    }

    pub fn aux(&self) -> VarId {
        self.aux
    }

    fn active_split(&self) -> CaseSplit {
        CaseSplit::new(
            Phase::Active,
            vec![Tightening::lower(self.b, 0.0), Tightening::upper(self.aux, 0.0)],
        )
    }

    fn inactive_split(&self) -> CaseSplit {
        CaseSplit::new(
            Phase::Inactive,
            vec![Tightening::upper(self.b, 0.0), Tightening::upper(self.f, 0.0)],
        )
    }
}

impl PiecewiseLinear for Relu {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Relu
    }

    fn variables(&self) -> Vec<VarId> {
        vec![self.b, self.f, self.aux]
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        compare(values[self.f.0], values[self.b.0].max(0.0), tol)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        let tol = bounds.tolerance();
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        let aux = bounds.get(self.aux);
        if !tol.is_negative(b.lower) || tol.is_positive(f.lower) || !tol.is_positive(aux.upper) {
            PhaseInference::Fixed(Phase::Active)
        } else if !tol.is_positive(b.upper) || !tol.is_positive(f.upper) || tol.is_positive(aux.lower)
        {
            PhaseInference::Fixed(Phase::Inactive)
        } else {
            PhaseInference::Unknown
        }
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        propose_lower(out, bounds, self.f, 0.0);
        propose_lower(out, bounds, self.aux, 0.0);
        // f ≥ b
        if b.lower.is_finite() {
            propose_lower(out, bounds, self.f, b.lower);
        }
        if f.upper.is_finite() {
            propose_upper(out, bounds, self.b, f.upper);
        }
        if b.upper.is_finite() {
            propose_upper(out, bounds, self.f, b.upper.max(0.0));
        }
        // A positive output means the unit is active, so b = f.
        if f.lower > 0.0 {
            propose_lower(out, bounds, self.b, f.lower);
        }
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        vec![self.active_split(), self.inactive_split()]
    }

    fn case_split(&self, phase: Phase) -> Option<CaseSplit> {
        match phase {
            Phase::Active => Some(self.active_split()),
            Phase::Inactive => Some(self.inactive_split()),
            _ => None,
        }
    }
}
