//! Core types for Marlin, a piecewise-linear neural network verifier.
//!
//! This crate holds the pieces every other Marlin crate shares: variable
//! identifiers, intervals and the trail-backed [`BoundStore`], linear
//! [`Equation`]s, the [`Tolerance`] policy, and the error type.

#![warn(clippy::all)]

pub mod bound;
pub mod bound_store;
pub mod equation;
pub mod error;
pub mod tolerance;
pub mod var;

pub use bound::{Bound, BoundKind, Tightening};
pub use bound_store::{BoundStore, TightenResult};
pub use equation::{Addend, Equation, Relation};
pub use error::{MarlinError, Result};
pub use tolerance::Tolerance;
pub use var::VarId;
