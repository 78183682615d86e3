//! The numeric tolerance policy shared by every component.
//!
//! All floating-point comparisons made by the bound store, the tableau, the
//! row tightener and the piecewise-linear constraints go through a single
//! [`Tolerance`] value. Components never hard-code their own epsilons.

use serde::{Deserialize, Serialize};

/// Tolerance bands for floating-point reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Bound crossings, equality checks and "meaningful improvement" use this band.
    pub epsilon: f64,
    /// Smallest coefficient magnitude accepted as a simplex pivot element.
    pub pivot: f64,
    /// Coefficients below this magnitude are dropped from tableau rows.
    pub coefficient: f64,
}

impl Tolerance {
    /// Default policy: 1e-8 bound band, 1e-9 pivot threshold, 1e-12 coefficient cutoff.
    pub const DEFAULT: Tolerance = Tolerance {
        epsilon: 1e-8,
        pivot: 1e-9,
        coefficient: 1e-12,
    };

    /// Band within which a basic variable counts as satisfying its bounds.
    ///
    /// Kept an order of magnitude below `epsilon` so that assignments accepted
    /// by the simplex also pass relation checks made with `epsilon`.
    #[inline]
    pub fn feasibility(&self) -> f64 {
        self.epsilon * 0.1
    }

    #[inline]
    pub fn is_positive(&self, x: f64) -> bool {
        x > self.epsilon
    }

    #[inline]
    pub fn is_negative(&self, x: f64) -> bool {
        x < -self.epsilon
    }

    /// Equal within tolerance, scaled by magnitude for large values.
    #[inline]
    pub fn approx_eq(&self, a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        let scale = 1.0_f64.max(a.abs()).max(b.abs());
        (a - b).abs() <= self.epsilon * scale
    }

    /// `a ≤ b` up to tolerance.
    #[inline]
    pub fn le(&self, a: f64, b: f64) -> bool {
        a <= b || self.approx_eq(a, b)
    }

    /// `a ≥ b` up to tolerance.
    #[inline]
    pub fn ge(&self, a: f64, b: f64) -> bool {
        self.le(b, a)
    }

    /// Sign with zero counted as positive. Values inside the band below zero
    /// count as zero, so rounding noise never flips the result.
    #[inline]
    pub fn sign(&self, x: f64) -> f64 {
        if self.is_negative(x) {
            -1.0
        } else {
            1.0
        }
    }

    /// A lower bound above an upper bound by more than the band.
    #[inline]
    pub fn crosses(&self, lower: f64, upper: f64) -> bool {
        lower > upper + self.epsilon
    }

    /// `candidate` raises the lower bound `current` by more than the band.
    #[inline]
    pub fn improves_lower(&self, current: f64, candidate: f64) -> bool {
        if candidate.is_nan() || candidate == f64::NEG_INFINITY {
            return false;
        }
        current == f64::NEG_INFINITY || candidate > current + self.epsilon
    }

    /// `candidate` lowers the upper bound `current` by more than the band.
    #[inline]
    pub fn improves_upper(&self, current: f64, candidate: f64) -> bool {
        if candidate.is_nan() || candidate == f64::INFINITY {
            return false;
        }
        current == f64::INFINITY || candidate < current - self.epsilon
    }

    #[inline]
    pub fn is_negligible_coefficient(&self, c: f64) -> bool {
        c.abs() <= self.coefficient
    }

    /// Loosen a derived lower bound to absorb rounding in its derivation.
    #[inline]
    pub fn relax_lower(&self, value: f64) -> f64 {
        value - self.feasibility() * 1.0_f64.max(value.abs())
    }

    /// Loosen a derived upper bound to absorb rounding in its derivation.
    #[inline]
    pub fn relax_upper(&self, value: f64) -> f64 {
        value + self.feasibility() * 1.0_f64.max(value.abs())
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
