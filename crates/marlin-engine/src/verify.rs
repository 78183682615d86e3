//! Independent check of a candidate solution against the query as given.
//!
//! Works on the query's own equations, bounds and relations, not on the
//! preprocessed rows or the constraint objects the search used.

use marlin_core::{Tolerance, VarId};
use thiserror::Error;

use crate::query::InputQuery;

/// First reason a candidate assignment fails the query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolutionDefect {
    #[error("{var} = {value} lies outside [{lower}, {upper}]")]
    OutOfBounds {
        var: VarId,
        value: f64,
        lower: f64,
        upper: f64,
    },
    #[error("equation #{index} is violated (residual {residual})")]
    Equation { index: usize, residual: f64 },
    #[error("constraint #{index} ({kind}) is violated")]
    Constraint { index: usize, kind: &'static str },
    #[error("expected {expected} values, got {got}")]
    Length { expected: usize, got: usize },
}

/// Check `values` (indexed by query variable) against every bound, equation
/// and piecewise-linear relation of `query`.
pub fn verify_solution(
    query: &InputQuery,
    values: &[f64],
    tol: &Tolerance,
) -> Result<(), SolutionDefect> {
    if values.len() != query.num_vars() {
        return Err(SolutionDefect::Length {
            expected: query.num_vars(),
            got: values.len(),
        });
    }
    for (i, &value) in values.iter().enumerate() {
        let var = VarId(i);
        let (lower, upper) = (query.lower_bound(var), query.upper_bound(var));
        if !value.is_finite() || !tol.ge(value, lower) || !tol.le(value, upper) {
            return Err(SolutionDefect::OutOfBounds {
                var,
                value,
                lower,
                upper,
            });
        }
    }
    for (index, eq) in query.equations().enumerate() {
        if !eq.is_satisfied(values, tol) {
            return Err(SolutionDefect::Equation {
                index,
                residual: eq.residual(values),
            });
        }
    }
    for (index, def) in query.constraints().iter().enumerate() {
        if !def.holds(values, tol) {
            return Err(SolutionDefect::Constraint {
                index,
                kind: def.name(),
            });
        }
    }
    Ok(())
}
