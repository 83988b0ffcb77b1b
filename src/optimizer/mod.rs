//! Outer optimization loops over a [`NonlinearFactorGraph`](crate::core::factor_graph::NonlinearFactorGraph).
//!
//! Each iteration linearizes the graph at the current [`Values`](crate::core::values::Values),
//! solves the resulting least-squares system with [`Cgls`](crate::linalg::Cgls), and retracts
//! every variable along its slice of the solution.

use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

pub mod gauss_newton;

pub use gauss_newton::{GaussNewton, GaussNewtonConfig, GaussNewtonSummary, IterationStats};

/// Optimizer-specific error types for apex-fusion
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// The `Values` store holds no variable to optimize
    #[error("Problem has no variables to optimize")]
    EmptyProblem,

    /// The factor graph contains no factors
    #[error("Factor graph has no factors")]
    NoFactors,

    /// A factor reads a key the `Values` store does not hold
    #[error("Factor references unknown key {key}")]
    UnknownKey { key: usize },
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// graph.check_keys(values)
    ///     .map_err(|e| OptimizerError::UnknownKey { key }.log_with_source(e))?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the error that caused it
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Why an optimization run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Relative cost change fell below the cost tolerance
    CostToleranceReached,
    /// Step norm fell below the parameter tolerance
    ParameterToleranceReached,
    /// Iteration budget exhausted
    MaxIterationsReached,
    /// Wall-clock budget exhausted
    Timeout,
    /// NaN or Inf in the cost or the step
    InvalidNumericalValues,
}

impl OptimizationStatus {
    /// True for the tolerance-based stops.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::CostToleranceReached
                | OptimizationStatus::ParameterToleranceReached
        )
    }
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::CostToleranceReached => write!(f, "Cost tolerance reached"),
            OptimizationStatus::ParameterToleranceReached => {
                write!(f, "Parameter tolerance reached")
            }
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::Timeout => write!(f, "Timeout"),
            OptimizationStatus::InvalidNumericalValues => {
                write!(f, "Invalid numerical values (NaN/Inf)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            OptimizationStatus::CostToleranceReached.to_string(),
            "Cost tolerance reached"
        );
        assert_eq!(OptimizationStatus::Timeout.to_string(), "Timeout");
        assert!(OptimizationStatus::ParameterToleranceReached.is_converged());
        assert!(!OptimizationStatus::MaxIterationsReached.is_converged());
        assert!(!OptimizationStatus::InvalidNumericalValues.is_converged());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            OptimizerError::UnknownKey { key: 4 }.to_string(),
            "Factor references unknown key 4"
        );
        assert_eq!(
            OptimizerError::EmptyProblem.log().to_string(),
            "Problem has no variables to optimize"
        );
    }
}
