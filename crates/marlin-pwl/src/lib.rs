//! Piecewise-linear constraints for Marlin.
//!
//! Each constraint kind implements [`PiecewiseLinear`]: it can evaluate
//! itself on an assignment, derive bound tightenings, detect when bounds
//! alone fix its phase, and enumerate the case splits to branch on.
//! [`PwlConstraint`] is the tagged union the engine stores; it forwards
//! every call to the variant.
//!
//! All case splits are conjunctions of single-variable bounds. Equalities
//! such as `f = b` are turned into bounds on auxiliary variables that
//! preprocessing defines by equations (`aux = f - b`, then `aux ≤ 0`).

#![warn(clippy::all)]

pub mod abs;
pub mod case_split;
pub mod constraint;
pub mod disjunction;
pub mod leaky_relu;
pub mod max;
pub mod phase;
pub mod relu;
pub mod sign;

pub use abs::Abs;
pub use case_split::{CaseSplit, Evaluation, Phase, PhaseInference};
pub use constraint::{ConstraintKind, PiecewiseLinear, PwlConstraint};
pub use disjunction::Disjunction;
pub use leaky_relu::LeakyRelu;
pub use max::Max;
pub use phase::PhaseStore;
pub use relu::Relu;
pub use sign::Sign;
