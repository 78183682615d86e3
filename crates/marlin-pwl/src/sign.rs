//! `f = 1` for `b ≥ 0`, `f = -1` otherwise.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};

use crate::case_split::{compare, propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// Sign function. No auxiliary variables are needed since both pieces are
/// constant.
///
/// - Positive: `b ≥ 0`, `f ≥ 1`.
/// - Negative: `b ≤ -margin`, `f ≤ -1`.
///
/// Zero, and anything within the tolerance band below it, maps to `+1`. The
/// negative piece keeps `b` a margin beyond that band so an assignment found
/// in the Negative phase is never read back as positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Sign {
    b: VarId,
    f: VarId,
    margin: f64,
}

impl Sign {
    pub fn new(b: VarId, f: VarId, tol: &Tolerance) -> Self {
        Self {
            b,
            f,
            margin: 3.0 * tol.epsilon,
        }
    }
}

impl PiecewiseLinear for Sign {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Sign
    }

    fn variables(&self) -> Vec<VarId> {
        vec![self.b, self.f]
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        let expected = tol.sign(values[self.b.0]);
        compare(values[self.f.0], expected, tol)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        let tol = bounds.tolerance();
        let b = bounds.get(self.b);
        let f = bounds.get(self.f);
        if !tol.is_negative(b.lower) || tol.is_positive(f.lower + 1.0) {
            PhaseInference::Fixed(Phase::Positive)
        } else if b.upper <= -self.margin || tol.is_negative(f.upper - 1.0) {
            PhaseInference::Fixed(Phase::Negative)
        } else {
            PhaseInference::Unknown
        }
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        propose_lower(out, bounds, self.f, -1.0);
        propose_upper(out, bounds, self.f, 1.0);
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        vec![
            CaseSplit::new(
                Phase::Positive,
                vec![Tightening::lower(self.b, 0.0), Tightening::lower(self.f, 1.0)],
            ),
            CaseSplit::new(
                Phase::Negative,
                vec![
                    Tightening::upper(self.b, -self.margin),
                    Tightening::upper(self.f, -1.0),
                ],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign() -> Sign {
        Sign::new(VarId(0), VarId(1), &Tolerance::DEFAULT)
    }

    fn store(bl: f64, bu: f64) -> BoundStore {
        BoundStore::from_bounds(vec![bl, -1.0], vec![bu, 1.0], Tolerance::DEFAULT).unwrap()
    }

    #[test]
    fn test_evaluate_away_from_zero() {
        let tol = Tolerance::DEFAULT;
        let s = sign();
        assert!(s.evaluate(&[0.3, 1.0], &tol).is_satisfied());
        assert!(s.evaluate(&[-0.3, -1.0], &tol).is_satisfied());
        assert_eq!(s.evaluate(&[-0.3, 1.0], &tol), Evaluation::Violated(2.0));
    }

    #[test]
    fn test_zero_is_positive() {
        let tol = Tolerance::DEFAULT;
        let s = sign();
        assert!(s.evaluate(&[0.0, 1.0], &tol).is_satisfied());
        assert!(s.evaluate(&[-1e-10, 1.0], &tol).is_satisfied());
        assert_eq!(s.evaluate(&[0.0, -1.0], &tol), Evaluation::Violated(2.0));
        assert_eq!(s.evaluate(&[-1e-10, -1.0], &tol), Evaluation::Violated(2.0));
        assert!(!s.evaluate(&[0.0, 0.0], &tol).is_satisfied());
    }

    #[test]
    fn test_implied_phase() {
        let s = sign();
        assert_eq!(s.implied_phase(&store(0.0, 1.0)), PhaseInference::Fixed(Phase::Positive));
        assert_eq!(s.implied_phase(&store(-1e-10, 1.0)), PhaseInference::Fixed(Phase::Positive));
        assert_eq!(s.implied_phase(&store(-1.0, -0.1)), PhaseInference::Fixed(Phase::Negative));
        assert_eq!(s.implied_phase(&store(-1.0, 0.0)), PhaseInference::Unknown);
    }

    #[test]
    fn test_negative_split_excludes_zero() {
        let tol = Tolerance::DEFAULT;
        let s = sign();
        let negative = &s.case_splits()[1];
        assert_eq!(negative.phase, Phase::Negative);
        let mut bounds = store(-1.0, 1.0);
        for t in &negative.tightenings {
            assert!(!bounds.apply(t).is_contradiction());
        }
        // The largest input the phase admits is still read as negative.
        let b = bounds.upper(VarId(0)) + tol.feasibility();
        assert_eq!(tol.sign(b), -1.0);

        let mut at_zero = store(0.0, 0.0);
        assert!(negative
            .tightenings
            .iter()
            .any(|t| at_zero.apply(t).is_contradiction()));
    }
}
