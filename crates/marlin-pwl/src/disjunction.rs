//! A disjunction of bound conjunctions.

use marlin_core::{BoundKind, BoundStore, Tightening, Tolerance, VarId};
use std::collections::BTreeMap;

use crate::case_split::{propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// Holds when every tightening of at least one disjunct holds.
///
/// Multi-variable linear disjuncts are reduced to single-variable bounds
/// during preprocessing by introducing an auxiliary variable for the sum.
#[derive(Debug, Clone, PartialEq)]
pub struct Disjunction {
    disjuncts: Vec<Vec<Tightening>>,
}

impl Disjunction {
    pub fn new(disjuncts: Vec<Vec<Tightening>>) -> Self {
        debug_assert!(!disjuncts.is_empty());
        Self { disjuncts }
    }

    pub fn disjuncts(&self) -> &[Vec<Tightening>] {
        &self.disjuncts
    }

    fn is_viable(disjunct: &[Tightening], bounds: &BoundStore) -> bool {
        let eps = bounds.tolerance().epsilon;
        disjunct.iter().all(|t| match t.kind {
            BoundKind::Lower => t.value <= bounds.upper(t.var) + eps,
            BoundKind::Upper => t.value >= bounds.lower(t.var) - eps,
        })
    }

    /// Indices of disjuncts not refuted by `bounds`.
    pub fn viable_disjuncts(&self, bounds: &BoundStore) -> Vec<usize> {
        (0..self.disjuncts.len())
            .filter(|&i| Self::is_viable(&self.disjuncts[i], bounds))
            .collect()
    }
}

/// Tightest bound a single disjunct places on each variable.
fn per_var(disjunct: &[Tightening], kind: BoundKind) -> BTreeMap<VarId, f64> {
    let mut map = BTreeMap::new();
    for t in disjunct.iter().filter(|t| t.kind == kind) {
        map.entry(t.var)
            .and_modify(|v: &mut f64| {
                *v = match kind {
                    BoundKind::Lower => v.max(t.value),
                    BoundKind::Upper => v.min(t.value),
                }
            })
            .or_insert(t.value);
    }
    map
}

impl PiecewiseLinear for Disjunction {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Disjunction
    }

    fn variables(&self) -> Vec<VarId> {
        let mut vars: Vec<VarId> = self.disjuncts.iter().flatten().map(|t| t.var).collect();
        vars.sort();
        vars.dedup();
        vars
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        let mut closest = f64::INFINITY;
        for disjunct in &self.disjuncts {
            let worst = disjunct
                .iter()
                .map(|t| {
                    let v = values[t.var.0];
                    match t.kind {
                        BoundKind::Lower => (t.value - v).max(0.0),
                        BoundKind::Upper => (v - t.value).max(0.0),
                    }
                })
                .fold(0.0, f64::max);
            if worst <= tol.epsilon {
                return Evaluation::Satisfied;
            }
            closest = closest.min(worst);
        }
        Evaluation::Violated(closest)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        match self.viable_disjuncts(bounds).as_slice() {
            [] => PhaseInference::Infeasible,
            [only] => PhaseInference::Fixed(Phase::Element(*only)),
            _ => PhaseInference::Unknown,
        }
    }

    /// Hull of the viable disjuncts: a variable bounded on one side by every
    /// viable disjunct is bounded by the loosest of those bounds.
    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        let viable = self.viable_disjuncts(bounds);
        if viable.is_empty() {
            return;
        }
        for kind in [BoundKind::Lower, BoundKind::Upper] {
            let maps: Vec<BTreeMap<VarId, f64>> = viable
                .iter()
                .map(|&i| per_var(&self.disjuncts[i], kind))
                .collect();
            let Some((first, rest)) = maps.split_first() else {
                continue;
            };
            for (&var, &value) in first {
                let mut hull = value;
                let mut everywhere = true;
                for map in rest {
                    match map.get(&var) {
                        Some(&v) => {
                            hull = match kind {
                                BoundKind::Lower => hull.min(v),
                                BoundKind::Upper => hull.max(v),
                            }
                        }
                        None => {
                            everywhere = false;
                            break;
                        }
                    }
                }
                if everywhere {
                    match kind {
                        BoundKind::Lower => propose_lower(out, bounds, var, hull),
                        BoundKind::Upper => propose_upper(out, bounds, var, hull),
                    }
                }
            }
        }
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        self.disjuncts
            .iter()
            .enumerate()
            .map(|(i, d)| CaseSplit::new(Phase::Element(i), d.clone()))
            .collect()
    }

    fn case_split(&self, phase: Phase) -> Option<CaseSplit> {
        match phase {
            Phase::Element(i) => self
                .disjuncts
                .get(i)
                .map(|d| CaseSplit::new(phase, d.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (x0 ≤ -1) ∨ (x0 ≥ 1 ∧ x1 ≤ 0)
    fn either_side() -> Disjunction {
        Disjunction::new(vec![
            vec![Tightening::upper(VarId(0), -1.0)],
            vec![Tightening::lower(VarId(0), 1.0), Tightening::upper(VarId(1), 0.0)],
        ])
    }

    fn store(x0: (f64, f64), x1: (f64, f64)) -> BoundStore {
        BoundStore::from_bounds(vec![x0.0, x1.0], vec![x0.1, x1.1], Tolerance::DEFAULT).unwrap()
    }

    #[test]
    fn test_evaluate() {
        let tol = Tolerance::DEFAULT;
        assert!(either_side().evaluate(&[-2.0, 5.0], &tol).is_satisfied());
        assert!(either_side().evaluate(&[1.5, -1.0], &tol).is_satisfied());
        assert_eq!(either_side().evaluate(&[0.0, 0.0], &tol), Evaluation::Violated(1.0));
    }

    #[test]
    fn test_feasible_disjunct_analysis() {
        let d = either_side();
        assert_eq!(d.implied_phase(&store((-5.0, 5.0), (-5.0, 5.0))), PhaseInference::Unknown);
        assert_eq!(
            d.implied_phase(&store((-5.0, 0.5), (-5.0, 5.0))),
            PhaseInference::Fixed(Phase::Element(0))
        );
        assert_eq!(
            d.implied_phase(&store((-0.5, 0.5), (-5.0, 5.0))),
            PhaseInference::Infeasible
        );
    }

    #[test]
    fn test_hull_tightening() {
        let d = Disjunction::new(vec![
            vec![Tightening::upper(VarId(0), 2.0)],
            vec![Tightening::upper(VarId(0), 3.0), Tightening::lower(VarId(1), 1.0)],
        ]);
        let mut out = Vec::new();
        d.tighten(&store((-5.0, 5.0), (-5.0, 5.0)), &mut out);
        assert_eq!(out, vec![Tightening::upper(VarId(0), 3.0)]);
    }

    #[test]
    fn test_k_way_split() {
        let splits = either_side().case_splits();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1].tightenings.len(), 2);
    }
}
