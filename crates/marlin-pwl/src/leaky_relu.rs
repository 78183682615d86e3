//! `f = b` for `b ≥ 0`, `f = slope·b` otherwise, with `0 < slope < 1`.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};

use crate::case_split::{compare, propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// Leaky ReLU with two auxiliary variables, both non-negative:
/// `active_aux = f - b` and `inactive_aux = f - slope·b`.
///
/// - Active: `b ≥ 0`, `active_aux ≤ 0`.
/// - Inactive: `b ≤ 0`, `inactive_aux ≤ 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakyRelu {
    b: VarId,
    f: VarId,
    slope: f64,
    active_aux: VarId,
    inactive_aux: VarId,
}

impl LeakyRelu {
    pub fn new(b: VarId, f: VarId, slope: f64, active_aux: VarId, inactive_aux: VarId) -> Self {
        debug_assert!(slope > 0.0 && slope < 1.0);
        Self {
            b,
            f,
            slope,
            active_aux,
            inactive_aux,
        }
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    #[inline]
    fn forward(&self, x: f64) -> f64 {
        if x >= 0.0 {
            x
        } else {
            self.slope * x
        }
    }

    #[inline]
    fn inverse(&self, y: f64) -> f64 {
        if y >= 0.0 {
            y
        } else {
            y / self.slope
        }
    }
}

impl PiecewiseLinear for LeakyRelu {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::LeakyRelu
    }

    fn variables(&self) -> Vec<VarId> {
        vec![self.b, self.f, self.active_aux, self.inactive_aux]
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        compare(values[self.f.0], self.forward(values[self.b.0]), tol)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        let tol = bounds.tolerance();
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        let active = bounds.get(self.active_aux);
        let inactive = bounds.get(self.inactive_aux);
        if !tol.is_negative(b.lower)
            || tol.is_positive(f.lower)
            || !tol.is_positive(active.upper)
            || tol.is_positive(inactive.lower)
        {
            PhaseInference::Fixed(Phase::Active)
        } else if !tol.is_positive(b.upper)
            || tol.is_negative(f.upper)
            || !tol.is_positive(inactive.upper)
            || tol.is_positive(active.lower)
        {
            PhaseInference::Fixed(Phase::Inactive)
        } else {
            PhaseInference::Unknown
        }
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        propose_lower(out, bounds, self.active_aux, 0.0);
        propose_lower(out, bounds, self.inactive_aux, 0.0);
        // The function and its inverse are monotone increasing.
        if b.lower.is_finite() {
            propose_lower(out, bounds, self.f, self.forward(b.lower));
        }
        if b.upper.is_finite() {
            propose_upper(out, bounds, self.f, self.forward(b.upper));
        }
        if f.lower.is_finite() {
            propose_lower(out, bounds, self.b, self.inverse(f.lower));
        }
        if f.upper.is_finite() {
            propose_upper(out, bounds, self.b, self.inverse(f.upper));
        }
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        vec![
            CaseSplit::new(
                Phase::Active,
                vec![
                    Tightening::lower(self.b, 0.0),
                    Tightening::upper(self.active_aux, 0.0),
                ],
            ),
            CaseSplit::new(
                Phase::Inactive,
                vec![
                    Tightening::upper(self.b, 0.0),
                    Tightening::upper(self.inactive_aux, 0.0),
                ],
            ),
        ]
    }
}
