//! Error types for the apex-fusion library
//!
//! Every module owns an error enum (`CoreError`, `LinAlgError`, `ManifoldError`,
//! `OptimizerError`); [`ApexFusionError`] wraps them for the fallible public entry points while
//! keeping the source chain intact.
//!
//! ```text
//! ApexFusionError::Optimizer(
//!     OptimizerError::UnknownKey { key: 42 }
//! )
//! ```
//!
//! Breaking a structural invariant (inserting a key twice, reading a variable as the wrong type)
//! panics in the plain API; the `try_*` twins return the module error instead.

use crate::{
    core::CoreError, linalg::LinAlgError, manifold::ManifoldError, optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the apex-fusion library
pub type ApexFusionResult<T> = Result<T, ApexFusionError>;

/// Top-level error type of the library
///
/// ```rust,ignore
/// if let Err(e) = solver.optimize(&graph, &mut values) {
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum ApexFusionError {
    /// Variable store and factor graph errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Optimization driver errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Block linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Manifold construction errors
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}

impl ApexFusionError {
    /// Full error chain, one error per line, causes indented with an arrow.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Single-line version of [`ApexFusionError::chain`].
    ///
    /// ```rust,ignore
    /// error!("Optimization failed: {}", e.chain_compact());
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_transparent() {
        let error = ApexFusionError::from(CoreError::MissingKey(3));
        assert_eq!(error.to_string(), "Missing key: 3");
    }

    #[test]
    fn test_chain() {
        let error = ApexFusionError::from(LinAlgError::DimensionMismatch(
            "rows have different block structures".to_string(),
        ));
        let chain = error.chain();
        assert!(chain.starts_with("Dimension mismatch"));
        assert!(chain.contains("block structures"));
    }

    #[test]
    fn test_chain_compact() {
        let error = ApexFusionError::from(OptimizerError::UnknownKey { key: 9 });
        assert!(error.chain_compact().contains("unknown key 9"));
        assert!(!error.chain_compact().contains('\n'));
    }

    #[test]
    fn test_result_err() {
        let result: ApexFusionResult<i32> = Err(CoreError::DuplicateKey(1).into());
        assert!(matches!(
            result,
            Err(ApexFusionError::Core(CoreError::DuplicateKey(1)))
        ));
    }

    #[test]
    fn test_transparent_error_conversion() {
        let manifold_error = ManifoldError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };

        let apex_error: ApexFusionError = manifold_error.into();
        match apex_error {
            ApexFusionError::Manifold(_) => {}
            _ => panic!("Expected Manifold variant"),
        }
    }
}
