//! Core building blocks of the factor-graph engine.
//!
//! - [`values::Values`]: type-erased store of manifold variables with a partitioned global
//!   tangent space
//! - [`differentiable::Tracked`]: values carrying a reverse-mode pullback into that tangent space
//! - [`jacobian`]: Jacobian extraction from differentiable functions of a `Values`
//! - [`gaussian_factor_graph::GaussianFactorGraph`]: the stacked linear system `J·dx ≈ b`
//! - [`factor_graph::NonlinearFactorGraph`]: the list of nonlinear factors and its linearization
//!
//! The data flow of one optimization step is
//!
//! ```text
//! NonlinearFactorGraph ──linearized(values)──▶ GaussianFactorGraph ──Cgls──▶ dx
//!          ▲                                                                  │
//!          └────────────────────── values.move_along(dx) ◀───────────────────┘
//! ```

pub mod differentiable;
pub mod factor_graph;
pub mod gaussian_factor_graph;
pub mod jacobian;
pub mod values;
pub mod variable;

use thiserror::Error;
use tracing::error;

/// Core module error types for variable storage and factor graphs
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A key was inserted twice into the same `Values`
    #[error("Duplicate key: {0} is already present")]
    DuplicateKey(usize),

    /// A key was looked up that was never inserted
    #[error("Missing key: {0}")]
    MissingKey(usize),

    /// A variable was accessed as a different type than it was inserted with
    #[error("Type mismatch for key {key}: stored {stored}, requested {requested}")]
    TypeMismatch {
        key: usize,
        stored: &'static str,
        requested: &'static str,
    },

    /// A `move_along` direction was not a single block covering the whole tangent space
    #[error("Malformed direction: {0}")]
    MalformedDirection(String),

    /// Jacobian and bias of a linear system disagree in size
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// values
    ///     .try_get::<Pose2>(key)
    ///     .map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying error that caused it
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
