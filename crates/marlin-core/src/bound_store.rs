//! The bound store: current interval of every variable, with an undo trail.
//!
//! Every accepted tightening pushes the previous value onto a trail, so a
//! search can take a [`mark`](BoundStore::mark) before a case split and later
//! [`undo_to`](BoundStore::undo_to) it in time proportional to the number of
//! changes made since. Restored values are the stored `f64`s themselves, so
//! the state after undo is bit-identical to the state at the mark.

use crate::bound::{Bound, BoundKind, Tightening};
use crate::tolerance::Tolerance;
use crate::var::VarId;

/// Outcome of a tightening request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TightenResult {
    /// The request did not narrow the interval by more than the tolerance band.
    NoChange,
    /// At least one side moved inward.
    Improved,
    /// The request would leave lower above upper; the store is unchanged.
    Contradiction,
}

impl TightenResult {
    #[inline]
    pub fn is_contradiction(self) -> bool {
        self == TightenResult::Contradiction
    }

    #[inline]
    pub fn is_improved(self) -> bool {
        self == TightenResult::Improved
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundChange {
    var: VarId,
    kind: BoundKind,
    old: f64,
}

/// Current `[lower, upper]` interval per variable.
#[derive(Debug, Clone)]
pub struct BoundStore {
    lower: Vec<f64>,
    upper: Vec<f64>,
    trail: Vec<BoundChange>,
    tolerance: Tolerance,
}

impl BoundStore {
    /// A store where every variable is unbounded.
    pub fn new(num_vars: usize, tolerance: Tolerance) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; num_vars],
            upper: vec![f64::INFINITY; num_vars],
            trail: Vec::new(),
            tolerance,
        }
    }

    /// A store seeded with explicit intervals.
    ///
    /// Returns the first variable whose lower bound exceeds its upper bound
    /// beyond the tolerance band as the error.
    pub fn from_bounds(
        lower: Vec<f64>,
        upper: Vec<f64>,
        tolerance: Tolerance,
    ) -> Result<Self, VarId> {
        debug_assert_eq!(lower.len(), upper.len());
        let mut store = Self {
            lower,
            upper,
            trail: Vec::new(),
            tolerance,
        };
        for i in 0..store.lower.len() {
            let (l, u) = (store.lower[i], store.upper[i]);
            if tolerance.crosses(l, u) {
                return Err(VarId(i));
            }
            if l > u {
                // Within the band: collapse onto the upper bound.
                store.lower[i] = u;
            }
        }
        Ok(store)
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.lower.len()
    }

    #[inline]
    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    #[inline]
    pub fn lower(&self, var: VarId) -> f64 {
        self.lower[var.0]
    }

    #[inline]
    pub fn upper(&self, var: VarId) -> f64 {
        self.upper[var.0]
    }

    #[inline]
    pub fn get(&self, var: VarId) -> Bound {
        Bound {
            lower: self.lower[var.0],
            upper: self.upper[var.0],
        }
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    /// Whether `var` is pinned to a single value.
    #[inline]
    pub fn is_fixed(&self, var: VarId) -> bool {
        self.upper[var.0] - self.lower[var.0] <= self.tolerance.epsilon
    }

    /// Narrow the interval of `var`.
    ///
    /// A side moves only if the new value improves on the current one by more
    /// than the tolerance band. If the resulting interval would be empty
    /// beyond the band the store is left untouched and `Contradiction` is
    /// returned. A crossing within the band collapses onto the other side.
    pub fn tighten(
        &mut self,
        var: VarId,
        new_lower: Option<f64>,
        new_upper: Option<f64>,
    ) -> TightenResult {
        let i = var.0;
        let tol = self.tolerance;
        let mut lower = self.lower[i];
        let mut upper = self.upper[i];
        let mut lower_moved = false;
        let mut upper_moved = false;

        if let Some(l) = new_lower {
            if tol.improves_lower(lower, l) {
                lower = l;
                lower_moved = true;
            }
        }
        if let Some(u) = new_upper {
            if tol.improves_upper(upper, u) {
                upper = u;
                upper_moved = true;
            }
        }
        if !lower_moved && !upper_moved {
            return TightenResult::NoChange;
        }
        if tol.crosses(lower, upper) {
            return TightenResult::Contradiction;
        }
        if lower > upper {
            if lower_moved {
                lower = upper;
            } else {
                upper = lower;
            }
        }

        if lower_moved {
            self.trail.push(BoundChange {
                var,
                kind: BoundKind::Lower,
                old: self.lower[i],
            });
            self.lower[i] = lower;
        }
        if upper_moved {
            self.trail.push(BoundChange {
                var,
                kind: BoundKind::Upper,
                old: self.upper[i],
            });
            self.upper[i] = upper;
        }
        TightenResult::Improved
    }

    #[inline]
    pub fn tighten_lower(&mut self, var: VarId, value: f64) -> TightenResult {
        self.tighten(var, Some(value), None)
    }

    #[inline]
    pub fn tighten_upper(&mut self, var: VarId, value: f64) -> TightenResult {
        self.tighten(var, None, Some(value))
    }

    /// Apply a single-sided tightening.
    #[inline]
    pub fn apply(&mut self, tightening: &Tightening) -> TightenResult {
        match tightening.kind {
            BoundKind::Lower => self.tighten_lower(tightening.var, tightening.value),
            BoundKind::Upper => self.tighten_upper(tightening.var, tightening.value),
        }
    }

    /// Position in the trail; pass to [`undo_to`](Self::undo_to) to restore.
    #[inline]
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    /// Undo every change recorded after `mark`, newest first.
    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some(change) = self.trail.pop() else {
                break;
            };
            match change.kind {
                BoundKind::Lower => self.lower[change.var.0] = change.old,
                BoundKind::Upper => self.upper[change.var.0] = change.old,
            }
        }
    }

    /// Forget the history. Changes made so far become permanent.
    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }

    #[inline]
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// True when every variable has `lower <= upper`.
    pub fn is_consistent(&self) -> bool {
        self.lower.iter().zip(&self.upper).all(|(l, u)| l <= u)
    }

    /// Whether `values` lies inside every interval, up to the tolerance band.
    pub fn contains(&self, values: &[f64]) -> bool {
        values.iter().enumerate().all(|(i, &v)| {
            v >= self.lower[i] - self.tolerance.epsilon && v <= self.upper[i] + self.tolerance.epsilon
        })
    }
}
