//! Marlin search engine.
//!
//! Decides whether a query over a piecewise-linear network has a solution:
//!
//! 1. [`Problem`] lowers an [`InputQuery`] into definition rows, bounds and
//!    constraint objects.
//! 2. [`BoundTightener`] propagates bounds to a fixpoint.
//! 3. [`SearchEngine`] runs branch-and-bound over case splits, checking each
//!    node with the simplex tableau and rewinding through checkpoints.
//! 4. [`Engine`] wraps it all and adds network-level queries.
//!
//! ```no_run
//! use marlin_core::VarId;
//! use marlin_engine::{Engine, EngineConfig, InputQuery};
//!
//! let mut query = InputQuery::new();
//! let x = query.new_variable();
//! let y = query.new_variable();
//! query.add_relu(x, y);
//! query.set_lower_bound(x, -1.0);
//! query.set_upper_bound(x, 1.0);
//! query.set_lower_bound(y, 0.75);
//!
//! let outcome = Engine::new(EngineConfig::default()).solve(&query)?;
//! println!("{}", outcome.verdict);
//! # Ok::<(), marlin_core::MarlinError>(())
//! ```

#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod engine;
pub mod network;
pub mod problem;
pub mod query;
pub mod result;
pub mod search;
pub mod tightener;
pub mod verify;

pub use checkpoint::{Checkpoint, CheckpointStack};
pub use config::{BranchingHeuristic, EngineConfig};
pub use context::{BranchFailure, ContextMarks, SearchContext};
pub use engine::Engine;
pub use network::{
    EncodedNetwork, FeedForwardNetwork, Layer, LinearLayer, MaxPoolLayer, RobustnessOutcome,
};
pub use problem::Problem;
pub use query::{ConstraintDef, InputQuery};
pub use result::{
    Assignment, BoundsOutcome, SolveOutcome, Statistics, UnknownReason, Verdict,
};
pub use search::{AbortHandle, SearchEngine, SearchState};
pub use tightener::{BoundTightener, PropagationSummary};
pub use verify::{verify_solution, SolutionDefect};

pub use marlin_simplex::PivotRule;
