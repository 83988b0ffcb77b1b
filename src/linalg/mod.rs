//! Block-sparse linear algebra and the CGLS least-squares solver.
//!
//! - [`BlockVector`] and [`BlockMatrix`]: lists of dense blocks at index offsets, with
//!   overlapping blocks summed when read
//! - [`Cgls`]: conjugate gradient on the normal equations, driven only by `J·x` and `Jᵀ·y`

pub mod block_matrix;
pub mod block_vector;
pub mod cgls;

pub use block_matrix::{BlockMatrix, BlockMatrixIndices};
pub use block_vector::BlockVector;
pub use cgls::{Cgls, CglsStatus, CglsSummary};

use thiserror::Error;
use tracing::error;

/// Linear algebra specific error types for apex-fusion
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Block layout or vector length does not match the operation
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| LinAlgError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying third-party error
    ///
    /// # Example
    /// ```ignore
    /// SparseColMat::try_new_from_triplets(rows, cols, &triplets)
    ///     .map_err(|e| {
    ///         LinAlgError::SparseMatrixCreation("export failed".to_string())
    ///             .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;
