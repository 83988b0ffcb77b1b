//! Nonlinear factors: measurement constraints over a few variables of a [`Values`] store.
//!
//! A factor owns an ordered list of variable keys and a residual function `r(x)` of those
//! variables. The optimizer minimizes the total cost
//!
//! ```text
//! Σᵢ ‖rᵢ(x)‖²
//! ```
//!
//! Residuals are written once, against [`Tracked`] variables read from the store, so their
//! Jacobians come out of reverse-mode differentiation instead of per-factor derivative code:
//!
//! ```
//! use apex_fusion::core::differentiable::Tracked;
//! use apex_fusion::core::values::Values;
//! use apex_fusion::factors::{Factor, NonlinearFactor};
//! use apex_fusion::manifold::Vector2;
//! use nalgebra::DVector;
//!
//! /// Pulls two points towards each other.
//! struct SpringFactor {
//!     keys: [usize; 2],
//! }
//!
//! impl Factor for SpringFactor {
//!     fn keys(&self) -> &[usize] {
//!         &self.keys
//!     }
//! }
//!
//! impl NonlinearFactor for SpringFactor {
//!     fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>> {
//!         let a = values.tracked::<Vector2>(self.keys[0]).to_vector();
//!         let b = values.tracked::<Vector2>(self.keys[1]).to_vector();
//!         &a - &b
//!     }
//! }
//!
//! let mut values = Values::new();
//! values.insert(0, Vector2::new([0.0, 0.0]));
//! values.insert(1, Vector2::new([3.0, 4.0]));
//!
//! let spring = SpringFactor { keys: [0, 1] };
//! assert_eq!(spring.error(&values), 25.0);
//! assert_eq!(spring.linearized(&values).row_count(), 2);
//! ```

pub mod between_factor;
pub mod prior_factor;

pub use between_factor::BetweenFactor;
pub use prior_factor::PriorFactor;

use crate::core::differentiable::Tracked;
use crate::core::gaussian_factor_graph::GaussianFactorGraph;
use crate::core::jacobian::value_with_jacobian;
use crate::core::values::Values;
use crate::linalg::BlockVector;
use nalgebra::DVector;

/// Anything attached to a fixed list of variable keys.
pub trait Factor {
    /// Keys of the variables this factor reads, in residual order.
    fn keys(&self) -> &[usize];
}

/// A differentiable residual over the variables named by [`Factor::keys`].
///
/// Factors are stateless after construction, so they can be linearized concurrently against a
/// shared `Values`.
pub trait NonlinearFactor: Factor + Send + Sync {
    /// Residual `r(x)` with its pullback into the global tangent space of `values`.
    ///
    /// # Panics
    /// If a key is missing from `values` or holds a different manifold type.
    fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>>;

    /// Differentiable squared residual norm.
    fn tracked_error(&self, values: &Values) -> Tracked<f64> {
        self.error_vector(values).squared_norm()
    }

    /// `‖r(x)‖²`
    fn error(&self, values: &Values) -> f64 {
        self.error_vector(values).value().norm_squared()
    }

    /// First-order model `J·dx ≈ -r(x)`, with `J` placed at the global tangent offsets of the
    /// factor's variables.
    fn linearized(&self, values: &Values) -> GaussianFactorGraph {
        let (residual, jacobian) = value_with_jacobian(|v| self.error_vector(v), values);
        GaussianFactorGraph::new(jacobian, BlockVector::from(-residual))
    }
}
