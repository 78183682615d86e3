//! Linear equations and inequalities over query variables.

use crate::tolerance::Tolerance;
use crate::var::VarId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relation between the weighted sum and the scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// `Σ aᵢxᵢ = c`
    Eq,
    /// `Σ aᵢxᵢ ≤ c`
    Le,
    /// `Σ aᵢxᵢ ≥ c`
    Ge,
}

/// One `coefficient · variable` term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Addend {
    pub coefficient: f64,
    pub var: VarId,
}

/// `Σ coefficient·var  (relation)  scalar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub addends: Vec<Addend>,
    pub scalar: f64,
    pub relation: Relation,
}

impl Equation {
    pub fn new(relation: Relation) -> Self {
        Self {
            addends: Vec::new(),
            scalar: 0.0,
            relation,
        }
    }

    /// Build from parallel slices of variables and coefficients.
    pub fn from_terms(vars: &[VarId], coeffs: &[f64], scalar: f64, relation: Relation) -> Self {
        debug_assert_eq!(vars.len(), coeffs.len());
        Self {
            addends: vars
                .iter()
                .zip(coeffs)
                .map(|(&var, &coefficient)| Addend { coefficient, var })
                .collect(),
            scalar,
            relation,
        }
    }

    pub fn add_addend(&mut self, coefficient: f64, var: VarId) {
        self.addends.push(Addend { coefficient, var });
    }

    pub fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.addends.iter().map(|a| a.var)
    }

    /// Terms sorted by variable, with repeated variables merged.
    pub fn merged_terms(&self) -> Vec<(VarId, f64)> {
        let mut terms: Vec<(VarId, f64)> =
            self.addends.iter().map(|a| (a.var, a.coefficient)).collect();
        terms.sort_by_key(|&(v, _)| v);
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(terms.len());
        for (var, c) in terms {
            match merged.last_mut() {
                Some((last, acc)) if *last == var => *acc += c,
                _ => merged.push((var, c)),
            }
        }
        merged.retain(|&(_, c)| c != 0.0);
        merged
    }

    /// Value of the weighted sum under `values` (indexed by variable).
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.addends
            .iter()
            .map(|a| a.coefficient * values[a.var.0])
            .sum()
    }

    /// `lhs - scalar`.
    pub fn residual(&self, values: &[f64]) -> f64 {
        self.lhs(values) - self.scalar
    }

    /// Whether `values` satisfies the relation up to the tolerance band.
    ///
    /// The band is scaled by the largest term magnitude so that equations
    /// over large values are not rejected for rounding alone.
    pub fn is_satisfied(&self, values: &[f64], tol: &Tolerance) -> bool {
        let residual = self.residual(values);
        let scale = self
            .addends
            .iter()
            .map(|a| (a.coefficient * values[a.var.0]).abs())
            .fold(self.scalar.abs(), f64::max)
            .max(1.0);
        let band = tol.epsilon * scale;
        match self.relation {
            Relation::Eq => residual.abs() <= band,
            Relation::Le => residual <= band,
            Relation::Ge => residual >= -band,
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, a) in self.addends.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}*{}", a.coefficient, a.var)?;
        }
        let op = match self.relation {
            Relation::Eq => "=",
            Relation::Le => "<=",
            Relation::Ge => ">=",
        };
        write!(f, " {} {}", op, self.scalar)
    }
}
