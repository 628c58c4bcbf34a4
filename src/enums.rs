use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Direction of a search step along an [`Axis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Backward,
    Forward,
}

impl Step {
    #[inline]
    pub(crate) fn apply(self, index: usize) -> usize {
        match self {
            Step::Backward => index - 1,
            Step::Forward => index + 1,
        }
    }
}

/// How the grid origins of reference and target are compared before a
/// comparison starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginPolicy {
    /// Origins must be exactly equal.
    #[default]
    Strict,
    /// Only the grid sizes are compared.
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    Serial,
    /// Z-planes are distributed over the rayon thread pool.
    #[default]
    Parallel,
}
