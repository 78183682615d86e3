//! General simplex over floating-point values with an undo trail.
//!
//! The tableau holds one row per equation, in the form
//!
//! ```text
//! s₁ = a₁₁x₁ + a₁₂x₂ + ...     (slack variable for equation 1)
//! s₂ = a₂₁x₁ + a₂₂x₂ + ...
//! ```
//!
//! Basic variables (left side) are determined by the non-basic ones. Bounds
//! live in a [`BoundStore`] owned by the caller; the tableau only reads them.
//! [`Tableau::check`] pivots until every basic variable is within its bounds
//! or a row proves the bounds infeasible.
//!
//! # Incrementality
//!
//! Every row rewrite and every non-basic value change is recorded on a trail.
//! Basic values are always recomputed from the rows, so after
//! [`undo_to`](Tableau::undo_to) the rows, the basis and all values are
//! bit-identical to what they were at the mark.

use marlin_core::{BoundStore, Tightening, Tolerance, VarId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::row_bounds::tighten_linear;

/// `basic = Σ coefficient·var`, terms sorted by variable and free of basic variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub basic: VarId,
    pub terms: Vec<(VarId, f64)>,
}

impl Row {
    pub fn new(basic: VarId, mut terms: Vec<(VarId, f64)>) -> Self {
        terms.sort_by_key(|&(v, _)| v);
        Self { basic, terms }
    }

    /// Coefficient of `var`, if it occurs.
    #[inline]
    pub fn coefficient(&self, var: VarId) -> Option<f64> {
        self.terms
            .binary_search_by_key(&var, |&(v, _)| v)
            .ok()
            .map(|i| self.terms[i].1)
    }

    #[inline]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * values[v.0]).sum()
    }
}

/// Tie-break policy for choosing leaving and entering variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PivotRule {
    /// Smallest violated basic variable, smallest eligible non-basic. Cannot cycle.
    #[default]
    Bland,
    /// Largest violation, largest eligible coefficient; ties by smallest index.
    Dantzig,
}

impl PivotRule {
    /// The rule to fall back on when this one stalls.
    pub fn alternate(self) -> Self {
        match self {
            PivotRule::Bland => PivotRule::Dantzig,
            PivotRule::Dantzig => PivotRule::Bland,
        }
    }
}

/// Why [`Tableau::check`] could not produce a feasible assignment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableauFailure {
    /// The row of `basic` proves the current bounds admit no solution.
    #[error("row of {basic} is infeasible under the current bounds")]
    Infeasible { basic: VarId },
    /// The pivot budget ran out before reaching feasibility.
    #[error("no feasible basis after {pivots} pivots")]
    Degenerate { pivots: usize },
    /// A violated row has no usable pivot but does not prove infeasibility.
    #[error("row of {basic} is stuck within numerical noise")]
    Numerical { basic: VarId },
}

#[derive(Debug, Clone)]
enum Undo {
    Row { index: usize, old: Row },
    Value { var: VarId, old: f64 },
}

/// Counters for the tableau.
#[derive(Clone, Debug, Default)]
pub struct TableauStats {
    pub pivots: u64,
    pub checks: u64,
    pub refactorizations: u64,
    pub basis_resets: u64,
}

/// An incremental simplex tableau.
#[derive(Debug, Clone)]
pub struct Tableau {
    /// The rows as first given; shared by every fork of this tableau.
    definitions: Arc<Vec<Row>>,
    rows: Vec<Row>,
    row_of: Vec<Option<usize>>,
    values: Vec<f64>,
    trail: Vec<Undo>,
    stats: TableauStats,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Increase,
    Decrease,
}

impl Tableau {
    /// Build a tableau over `num_vars` variables whose initial basis is the
    /// `basic` variable of each definition row. All values start at zero.
    pub fn new(num_vars: usize, definitions: Vec<Row>) -> Self {
        let mut row_of = vec![None; num_vars];
        for (i, row) in definitions.iter().enumerate() {
            debug_assert!(row_of[row.basic.0].is_none(), "{} is basic twice", row.basic);
            row_of[row.basic.0] = Some(i);
        }
        let rows = definitions.clone();
        let mut tableau = Self {
            definitions: Arc::new(definitions),
            rows,
            row_of,
            values: vec![0.0; num_vars],
            trail: Vec::new(),
            stats: TableauStats::default(),
        };
        tableau.refresh_basic();
        tableau
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_basic(&self, var: VarId) -> bool {
        self.row_of[var.0].is_some()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn definitions(&self) -> &[Row] {
        &self.definitions
    }

    /// Basic variable of each row, in row order.
    pub fn basic_variables(&self) -> Vec<VarId> {
        self.rows.iter().map(|r| r.basic).collect()
    }

    #[inline]
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    /// Current assignment, indexed by variable.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Copy of the current assignment.
    pub fn compute_assignment(&self) -> Vec<f64> {
        self.values.clone()
    }

    pub fn stats(&self) -> &TableauStats {
        &self.stats
    }

    /// Position in the trail; pass to [`undo_to`](Self::undo_to) to restore.
    #[inline]
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    #[inline]
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// Forget the history. The current basis becomes the base state.
    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }

    /// Restore rows, basis and values to what they were at `mark`.
    pub fn undo_to(&mut self, mark: usize) {
        if self.trail.len() <= mark {
            return;
        }
        let touched: Vec<usize> = self.trail[mark..]
            .iter()
            .filter_map(|u| match u {
                Undo::Row { index, .. } => Some(*index),
                Undo::Value { .. } => None,
            })
            .collect();
        for &i in &touched {
            self.row_of[self.rows[i].basic.0] = None;
        }
        while self.trail.len() > mark {
            match self.trail.pop() {
                Some(Undo::Row { index, old }) => self.rows[index] = old,
                Some(Undo::Value { var, old }) => self.values[var.0] = old,
                None => break,
            }
        }
        for &i in &touched {
            self.row_of[self.rows[i].basic.0] = Some(i);
        }
        self.refresh_basic();
    }

    fn set_value(&mut self, var: VarId, value: f64) {
        self.trail.push(Undo::Value {
            var,
            old: self.values[var.0],
        });
        self.values[var.0] = value;
    }

    /// Recompute every basic value from its row.
    fn refresh_basic(&mut self) {
        for row in &self.rows {
            let v = row.evaluate(&self.values);
            self.values[row.basic.0] = v;
        }
    }

    /// Largest disagreement between the current values and the original
    /// definition rows. Grows as pivoting accumulates rounding error.
    pub fn max_definition_residual(&self) -> f64 {
        self.definitions
            .iter()
            .map(|d| (d.evaluate(&self.values) - self.values[d.basic.0]).abs())
            .fold(0.0, f64::max)
    }

    /// Pivot until every basic variable is within its bounds.
    ///
    /// Non-basic variables are first moved inside their bounds. Returns the
    /// number of pivots performed.
    pub fn check(
        &mut self,
        bounds: &BoundStore,
        rule: PivotRule,
        max_pivots: usize,
    ) -> Result<usize, TableauFailure> {
        self.stats.checks += 1;
        for var in 0..self.values.len() {
            if self.row_of[var].is_some() {
                continue;
            }
            let v = self.values[var];
            let clamped = bounds.get(VarId(var)).clamp(v);
            if clamped != v {
                self.set_value(VarId(var), clamped);
            }
        }
        self.refresh_basic();

        let mut pivots = 0;
        loop {
            let Some((row_idx, target, direction)) = self.select_leaving(bounds, rule) else {
                trace!(pivots, "tableau feasible");
                return Ok(pivots);
            };
            if pivots >= max_pivots {
                debug!(pivots, ?rule, "pivot budget exhausted");
                return Err(TableauFailure::Degenerate { pivots });
            }
            let basic = self.rows[row_idx].basic;
            match self.select_entering(row_idx, direction, bounds, rule) {
                Some(entering) => {
                    trace!(%basic, %entering, target, "pivot");
                    self.pivot_and_update(row_idx, entering, target, bounds.tolerance());
                    pivots += 1;
                }
                None if self.row_proves_infeasible(row_idx, direction, bounds) => {
                    return Err(TableauFailure::Infeasible { basic });
                }
                None => return Err(TableauFailure::Numerical { basic }),
            }
        }
    }

    fn select_leaving(
        &self,
        bounds: &BoundStore,
        rule: PivotRule,
    ) -> Option<(usize, f64, Direction)> {
        let band = bounds.tolerance().feasibility();
        let mut best: Option<(usize, f64, Direction, f64)> = None;
        for (idx, row) in self.rows.iter().enumerate() {
            let v = self.values[row.basic.0];
            let b = bounds.get(row.basic);
            let (target, direction, violation) = if v < b.lower - band {
                (b.lower, Direction::Increase, b.lower - v)
            } else if v > b.upper + band {
                (b.upper, Direction::Decrease, v - b.upper)
            } else {
                continue;
            };
            let better = match best {
                None => true,
                Some((i, _, _, best_violation)) => match rule {
                    PivotRule::Bland => row.basic < self.rows[i].basic,
                    PivotRule::Dantzig => {
                        violation > best_violation
                            || (violation == best_violation && row.basic < self.rows[i].basic)
                    }
                },
            };
            if better {
                best = Some((idx, target, direction, violation));
            }
        }
        best.map(|(idx, target, direction, _)| (idx, target, direction))
    }

    fn select_entering(
        &self,
        row_idx: usize,
        direction: Direction,
        bounds: &BoundStore,
        rule: PivotRule,
    ) -> Option<VarId> {
        let tol = bounds.tolerance();
        let mut best: Option<(VarId, f64)> = None;
        for &(var, a) in &self.rows[row_idx].terms {
            if a.abs() <= tol.pivot {
                continue;
            }
            let v = self.values[var.0];
            let b = bounds.get(var);
            let can_increase = v < b.upper;
            let can_decrease = v > b.lower;
            let helps = match direction {
                Direction::Increase => (a > 0.0 && can_increase) || (a < 0.0 && can_decrease),
                Direction::Decrease => (a > 0.0 && can_decrease) || (a < 0.0 && can_increase),
            };
            if !helps {
                continue;
            }
            match rule {
                PivotRule::Bland => return Some(var),
                PivotRule::Dantzig => {
                    if best.map_or(true, |(_, c)| a.abs() > c) {
                        best = Some((var, a.abs()));
                    }
                }
            }
        }
        best.map(|(v, _)| v)
    }

    /// Interval reasoning over the row: can any point of the non-basic box
    /// move the basic variable back into its bounds?
    fn row_proves_infeasible(&self, row_idx: usize, direction: Direction, bounds: &BoundStore) -> bool {
        let row = &self.rows[row_idx];
        let band = bounds.tolerance().feasibility();
        let b = bounds.get(row.basic);
        let mut reach = 0.0;
        for &(var, a) in &row.terms {
            let vb = bounds.get(var);
            let term = match direction {
                Direction::Increase if a > 0.0 => a * vb.upper,
                Direction::Increase => a * vb.lower,
                Direction::Decrease if a > 0.0 => a * vb.lower,
                Direction::Decrease => a * vb.upper,
            };
            if !term.is_finite() {
                return false;
            }
            reach += term;
        }
        match direction {
            Direction::Increase => reach < b.lower - band,
            Direction::Decrease => reach > b.upper + band,
        }
    }

    /// Move `entering` so the row's basic variable lands on `target`, then
    /// swap the two.
    fn pivot_and_update(&mut self, row_idx: usize, entering: VarId, target: f64, tol: &Tolerance) {
        let leaving = self.rows[row_idx].basic;
        let Some(a) = self.rows[row_idx].coefficient(entering) else {
            return;
        };
        let theta = (target - self.values[leaving.0]) / a;
        let moved = self.values[entering.0] + theta;
        self.set_value(entering, moved);
        self.pivot(row_idx, entering, tol);
        self.set_value(leaving, target);
        self.refresh_basic();
    }

    /// Exchange the basic variable of `row_idx` with the non-basic `entering`
    /// and substitute the rewritten row into every other row.
    pub fn pivot(&mut self, row_idx: usize, entering: VarId, tol: &Tolerance) {
        let old = self.rows[row_idx].clone();
        let Some(a) = old.coefficient(entering) else {
            return;
        };
        let leaving = old.basic;
        let inv = 1.0 / a;
        let mut terms: Vec<(VarId, f64)> = old
            .terms
            .iter()
            .filter(|&&(v, _)| v != entering)
            .map(|&(v, c)| (v, -c * inv))
            .collect();
        let pos = terms.partition_point(|&(v, _)| v < leaving);
        terms.insert(pos, (leaving, inv));
        let new_row = Row {
            basic: entering,
            terms,
        };

        self.trail.push(Undo::Row {
            index: row_idx,
            old,
        });
        self.row_of[leaving.0] = None;
        self.row_of[entering.0] = Some(row_idx);

        for idx in 0..self.rows.len() {
            if idx == row_idx {
                continue;
            }
            let Some(c) = self.rows[idx].coefficient(entering) else {
                continue;
            };
            let merged = axpy_merge(&self.rows[idx].terms, c, &new_row.terms, entering, tol);
            let previous = std::mem::replace(&mut self.rows[idx].terms, merged);
            self.trail.push(Undo::Row {
                index: idx,
                old: Row {
                    basic: self.rows[idx].basic,
                    terms: previous,
                },
            });
        }
        self.rows[row_idx] = new_row;
        self.stats.pivots += 1;
    }

    /// Rebuild every row from the original definitions for the current basis
    /// by Gauss-Jordan elimination, discarding accumulated rounding error.
    ///
    /// Returns `false` when the basis turned out singular; the tableau then
    /// falls back to the initial basis of the definitions.
    pub fn refactor(&mut self, tol: &Tolerance) -> bool {
        let m = self.rows.len();
        let basis = self.basic_variables();
        let mut work: Vec<Vec<(VarId, f64)>> = self
            .definitions
            .iter()
            .map(|d| {
                let mut v: Vec<(VarId, f64)> = d.terms.iter().map(|&(x, c)| (x, -c)).collect();
                let pos = v.partition_point(|&(x, _)| x < d.basic);
                v.insert(pos, (d.basic, 1.0));
                v
            })
            .collect();
        let mut used = vec![false; m];
        let mut assigned = vec![0usize; m];

        for (pos, &b) in basis.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (w, row) in work.iter().enumerate() {
                if used[w] {
                    continue;
                }
                if let Some(c) = coefficient_in(row, b) {
                    if best.map_or(true, |(_, bc)| c.abs() > bc.abs()) {
                        best = Some((w, c));
                    }
                }
            }
            let Some((w, c)) = best.filter(|&(_, c)| c.abs() > tol.pivot) else {
                debug!(basic = %b, "singular basis during refactorization");
                self.reset_to_definitions();
                return false;
            };
            used[w] = true;
            assigned[pos] = w;
            for t in work[w].iter_mut() {
                t.1 /= c;
            }
            let pivot_row = work[w].clone();
            for (other, row) in work.iter_mut().enumerate() {
                if other == w {
                    continue;
                }
                if let Some(k) = coefficient_in(row, b) {
                    *row = axpy_merge(row, -k, &pivot_row, b, tol);
                }
            }
        }

        for (pos, &b) in basis.iter().enumerate() {
            let terms: Vec<(VarId, f64)> = work[assigned[pos]]
                .iter()
                .filter(|&&(x, _)| x != b)
                .map(|&(x, e)| (x, -e))
                .collect();
            let old = std::mem::replace(&mut self.rows[pos], Row { basic: b, terms });
            self.trail.push(Undo::Row { index: pos, old });
        }
        self.refresh_basic();
        self.stats.refactorizations += 1;
        true
    }

    /// Return to the initial basis, keeping the values of non-basic variables.
    fn reset_to_definitions(&mut self) {
        let definitions = Arc::clone(&self.definitions);
        for def in definitions.iter() {
            if self.row_of[def.basic.0].is_none() {
                // Becoming basic: its value will be recomputed, so record it.
                self.trail.push(Undo::Value {
                    var: def.basic,
                    old: self.values[def.basic.0],
                });
            }
        }
        for row in &self.rows {
            self.row_of[row.basic.0] = None;
        }
        for (i, def) in definitions.iter().enumerate() {
            let old = std::mem::replace(&mut self.rows[i], def.clone());
            self.trail.push(Undo::Row { index: i, old });
            self.row_of[def.basic.0] = Some(i);
        }
        self.refresh_basic();
        self.stats.basis_resets += 1;
    }

    /// Bounds implied by each current row on each of its variables.
    pub fn derive_tighter_bounds(&self, bounds: &BoundStore) -> Vec<Tightening> {
        let mut out = Vec::new();
        for row in &self.rows {
            let terms = std::iter::once((row.basic, -1.0)).chain(row.terms.iter().copied());
            tighten_linear(terms, bounds, &mut out);
        }
        out
    }
}

fn coefficient_in(terms: &[(VarId, f64)], var: VarId) -> Option<f64> {
    terms
        .binary_search_by_key(&var, |&(v, _)| v)
        .ok()
        .map(|i| terms[i].1)
}

/// `base + scale·other`, both sorted, with `skip` removed from both sides and
/// negligible results dropped.
fn axpy_merge(
    base: &[(VarId, f64)],
    scale: f64,
    other: &[(VarId, f64)],
    skip: VarId,
    tol: &Tolerance,
) -> Vec<(VarId, f64)> {
    let mut out = Vec::with_capacity(base.len() + other.len());
    let (mut i, mut j) = (0, 0);
    loop {
        let next = match (base.get(i), other.get(j)) {
            (None, None) => break,
            (Some(&(v, c)), None) => {
                i += 1;
                (v, c)
            }
            (None, Some(&(v, c))) => {
                j += 1;
                (v, scale * c)
            }
            (Some(&(vb, cb)), Some(&(vo, co))) => {
                if vb < vo {
                    i += 1;
                    (vb, cb)
                } else if vo < vb {
                    j += 1;
                    (vo, scale * co)
                } else {
                    i += 1;
                    j += 1;
                    (vb, cb + scale * co)
                }
            }
        };
        if next.0 != skip && !tol.is_negligible_coefficient(next.1) {
            out.push(next);
        }
    }
    out
}
