//! Intervals and single-sided bound tightenings.

use crate::var::VarId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bound on a scalar value: [lower, upper]. Either side may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    /// Create a new bound.
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "Invalid bound: {lower} > {upper}");
        Self { lower, upper }
    }

    /// The unbounded interval.
    #[inline]
    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Create a concrete (point) bound.
    #[inline]
    pub fn concrete(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Nearest point of the interval to `value`.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.lower {
            self.lower
        } else if value > self.upper {
            self.upper
        } else {
            value
        }
    }
}

impl Default for Bound {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Which side of an interval a tightening moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundKind {
    Lower,
    Upper,
}

/// A request to move one side of a variable's interval inward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tightening {
    pub var: VarId,
    pub value: f64,
    pub kind: BoundKind,
}

impl Tightening {
    #[inline]
    pub fn lower(var: VarId, value: f64) -> Self {
        Self {
            var,
            value,
            kind: BoundKind::Lower,
        }
    }

    #[inline]
    pub fn upper(var: VarId, value: f64) -> Self {
        Self {
            var,
            value,
            kind: BoundKind::Upper,
        }
    }

    /// Whether `value` satisfies this tightening up to `epsilon`.
    #[inline]
    pub fn holds_for(&self, value: f64, epsilon: f64) -> bool {
        match self.kind {
            BoundKind::Lower => value >= self.value - epsilon,
            BoundKind::Upper => value <= self.value + epsilon,
        }
    }
}

impl fmt::Display for Tightening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BoundKind::Lower => write!(f, "{} >= {}", self.var, self.value),
            BoundKind::Upper => write!(f, "{} <= {}", self.var, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_clamp() {
        let b = Bound::new(-1.0, 1.0);
        assert_eq!(b.clamp(-5.0), -1.0);
        assert_eq!(b.clamp(0.25), 0.25);
        assert_eq!(Bound::unbounded().clamp(7.0), 7.0);
    }

    #[test]
    fn test_tightening_holds_for() {
        let t = Tightening::lower(VarId(3), 0.5);
        assert!(t.holds_for(0.5 - 1e-10, 1e-8));
        assert!(!t.holds_for(0.4, 1e-8));
        assert_eq!(t.to_string(), "x3 >= 0.5");
    }
}
