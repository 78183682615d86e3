//! Row-based bound derivation.
//!
//! For a row `Σ cₖxₖ = 0`, the bounds of every variable but one bound the
//! remaining one: `cₜxₜ = -Σ_{k≠t} cₖxₖ`. Interval sums are accumulated once
//! per row together with a count of infinite contributions, so each variable's
//! bound costs O(1) after a single pass.

use marlin_core::{Bound, BoundStore, Tightening, VarId};

/// Interval of `c·x` for `x ∈ b`.
#[inline]
fn contribution(c: f64, b: Bound) -> (f64, f64) {
    if c > 0.0 {
        (c * b.lower, c * b.upper)
    } else {
        (c * b.upper, c * b.lower)
    }
}

/// Append to `out` every bound implied by `Σ c·x = 0` that improves on
/// `bounds` by more than the tolerance band.
///
/// Derived values are relaxed outward by the feasibility band before being
/// compared, so rounding in the interval sums never cuts off a solution.
pub fn tighten_linear<I>(terms: I, bounds: &BoundStore, out: &mut Vec<Tightening>)
where
    I: Iterator<Item = (VarId, f64)> + Clone,
{
    let tol = *bounds.tolerance();
    let mut min_sum = 0.0;
    let mut max_sum = 0.0;
    let mut min_inf = 0usize;
    let mut max_inf = 0usize;
    for (var, c) in terms.clone() {
        if c == 0.0 {
            continue;
        }
        let (lo, hi) = contribution(c, bounds.get(var));
        if lo == f64::NEG_INFINITY {
            min_inf += 1;
        } else {
            min_sum += lo;
        }
        if hi == f64::INFINITY {
            max_inf += 1;
        } else {
            max_sum += hi;
        }
    }
    if min_inf > 1 && max_inf > 1 {
        return;
    }

    for (var, c) in terms {
        if tol.is_negligible_coefficient(c) {
            continue;
        }
        let (lo, hi) = contribution(c, bounds.get(var));
        let rest_min = match (min_inf, lo == f64::NEG_INFINITY) {
            (0, _) => min_sum - lo,
            (1, true) => min_sum,
            _ => f64::NEG_INFINITY,
        };
        let rest_max = match (max_inf, hi == f64::INFINITY) {
            (0, _) => max_sum - hi,
            (1, true) => max_sum,
            _ => f64::INFINITY,
        };
        // c·x = -rest
        let (new_lower, new_upper) = if c > 0.0 {
            (-rest_max / c, -rest_min / c)
        } else {
            (-rest_min / c, -rest_max / c)
        };
        if new_lower.is_finite() {
            let v = tol.relax_lower(new_lower);
            if tol.improves_lower(bounds.lower(var), v) {
                out.push(Tightening::lower(var, v));
            }
        }
        if new_upper.is_finite() {
            let v = tol.relax_upper(new_upper);
            if tol.improves_upper(bounds.upper(var), v) {
                out.push(Tightening::upper(var, v));
            }
        }
    }
}
