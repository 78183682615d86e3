//! `f = max(x₁, …, x_k)`, the building block of max-pooling layers.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};

use crate::case_split::{compare, propose_lower, propose_upper, CaseSplit, Evaluation, Phase, PhaseInference};
use crate::constraint::{ConstraintKind, PiecewiseLinear};

/// Maximum over `k` inputs with one auxiliary variable per input,
/// `aux_i = f - x_i ≥ 0`.
///
/// Phase `Element(i)` asserts `aux_i ≤ 0`, i.e. `f = x_i`; together with
/// `aux_j ≥ 0` this makes input `i` at least as large as every other input.
#[derive(Debug, Clone, PartialEq)]
pub struct Max {
    inputs: Vec<VarId>,
    output: VarId,
    aux: Vec<VarId>,
}

impl Max {
    pub fn new(inputs: Vec<VarId>, output: VarId, aux: Vec<VarId>) -> Self {
        debug_assert_eq!(inputs.len(), aux.len());
        debug_assert!(!inputs.is_empty());
        Self { inputs, output, aux }
    }

    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    pub fn output(&self) -> VarId {
        self.output
    }

    /// Inputs that can still be the maximum under `bounds`.
    pub fn viable_inputs(&self, bounds: &BoundStore) -> Vec<usize> {
        let eps = bounds.tolerance().epsilon;
        let max_lower = self
            .inputs
            .iter()
            .map(|&x| bounds.lower(x))
            .fold(bounds.lower(self.output), f64::max);
        (0..self.inputs.len())
            .filter(|&i| {
                bounds.upper(self.inputs[i]) + eps >= max_lower
                    && bounds.lower(self.aux[i]) <= eps
            })
            .collect()
    }
}

impl PiecewiseLinear for Max {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Max
    }

    fn variables(&self) -> Vec<VarId> {
        let mut vars = self.inputs.clone();
        vars.push(self.output);
        vars.extend_from_slice(&self.aux);
        vars
    }

    fn evaluate(&self, values: &[f64], tol: &Tolerance) -> Evaluation {
        let expected = self
            .inputs
            .iter()
            .map(|&x| values[x.0])
            .fold(f64::NEG_INFINITY, f64::max);
        compare(values[self.output.0], expected, tol)
    }

    fn implied_phase(&self, bounds: &BoundStore) -> PhaseInference {
        match self.viable_inputs(bounds).as_slice() {
            [] => PhaseInference::Infeasible,
            [only] => PhaseInference::Fixed(Phase::Element(*only)),
            _ => PhaseInference::Unknown,
        }
    }

    fn tighten(&self, bounds: &BoundStore, out: &mut Vec<Tightening>) {
        for &a in &self.aux {
            propose_lower(out, bounds, a, 0.0);
        }
        let max_lower = self
            .inputs
            .iter()
            .map(|&x| bounds.lower(x))
            .fold(f64::NEG_INFINITY, f64::max);
        if max_lower.is_finite() {
            propose_lower(out, bounds, self.output, max_lower);
        }
        let viable = self.viable_inputs(bounds);
        let max_upper = viable
            .iter()
            .map(|&i| bounds.upper(self.inputs[i]))
            .fold(f64::NEG_INFINITY, f64::max);
        if max_upper.is_finite() {
            propose_upper(out, bounds, self.output, max_upper);
        }
        let f_upper = bounds.upper(self.output);
        if f_upper.is_finite() {
            for &x in &self.inputs {
                propose_upper(out, bounds, x, f_upper);
            }
        }
    }

    fn case_splits(&self) -> Vec<CaseSplit> {
        self.aux
            .iter()
            .enumerate()
            .map(|(i, &a)| CaseSplit::new(Phase::Element(i), vec![Tightening::upper(a, 0.0)]))
            .collect()
    }

    fn case_split(&self, phase: Phase) -> Option<CaseSplit> {
        match phase {
            Phase::Element(i) if i < self.aux.len() => Some(CaseSplit::new(
                phase,
                vec![Tightening::upper(self.aux[i], 0.0)],
            )),
            _ => None,
        }
    }
}
