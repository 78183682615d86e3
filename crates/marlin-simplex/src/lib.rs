//! Linear feasibility engine for Marlin.
//!
//! [`Tableau`] is an incremental general simplex in the
//! basic/non-basic form, with an undo trail for cheap backtracking.
//! [`row_bounds`] derives bound tightenings from linear rows.

#![warn(clippy::all)]

pub mod row_bounds;
pub mod tableau;

pub use row_bounds::tighten_linear;
pub use tableau::{PivotRule, Row, Tableau, TableauFailure, TableauStats};
