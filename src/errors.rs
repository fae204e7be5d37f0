//! Error taxonomy shared by the projection, ranking and selection layers.
//!
//! Every variant is raised synchronously by the call that violated its
//! precondition; nothing here is retried internally. Numerical degeneracies
//! (coincident points, zero distances, narrow windows) are not errors and are
//! resolved locally by the algorithms that meet them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LampError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index out of range: {index}/{len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Insufficient data: {required} instances required, {found} found")]
    InsufficientData { required: usize, found: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid timestep range: {0}")]
    InvalidRange(String),

    #[error("Invalid index {0}: {1}")]
    InvalidIndex(usize, String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Matrix decomposition failed: {0}")]
    Decomposition(String),
}

pub type Result<T> = std::result::Result<T, LampError>;

/// Checks `index < len`, the bound every curve/baseline index must satisfy.
#[inline]
pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(LampError::IndexOutOfRange { index, len });
    }
    Ok(())
}
