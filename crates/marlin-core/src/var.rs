use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a variable in a query.
///
/// Every input, pre-activation, post-activation and output quantity is one
/// variable. Auxiliary and slack variables introduced by preprocessing share
/// the same index space, after the query's own variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(pub usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for VarId {
    fn from(index: usize) -> Self {
        VarId(index)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
