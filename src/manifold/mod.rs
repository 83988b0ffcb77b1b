//! Manifold representations for optimization on non-Euclidean spaces.
//!
//! Every variable type a [`Values`](crate::core::values::Values) store can hold implements
//! [`LieGroup`]:
//!
//! Type          | Group       | dim | Tangent layout      | Compose
//! ------------- | ----------- | --- | ------------------- | -------------
//! `VectorN<N>`  | (Rⁿ, +)     | N   | `[v]`               | v₁ + v₂
//! `Rot2`        | SO(2)       | 1   | `[θ]`               | R₁R₂
//! `Pose2`       | SE(2)       | 3   | `[x, y, θ]`         | (R₁R₂, R₁t₂ + t₁)
//! `Rot3`        | SO(3)       | 3   | `[ωx, ωy, ωz]`      | q₁q₂
//! `Pose3`       | SE(3)       | 6   | `[vx, vy, vz, ω]`   | (R₁R₂, R₁t₂ + t₁)
//!
//! Perturbations are applied on the right throughout:
//!
//! ```text
//! retract(p, τ)          = p ∘ Exp(τ)
//! local_coordinate(p, q) = Log(p⁻¹ ∘ q)
//! retract(p, local_coordinate(p, q)) = q
//! ```
//!
//! Every operation can report its analytic Jacobians with respect to the right-perturbation
//! tangent spaces of its arguments, following the conventions of the
//! [manif](https://github.com/artivis/manif) library. Those Jacobians are what the
//! differentiable accessors in [`crate::core::differentiable`] chain together.

use nalgebra::{DMatrix, DVector, Matrix3};
use std::ops::{Index, Mul, Neg};
use std::{
    error, fmt,
    fmt::{Debug, Display, Formatter},
};

pub mod pose2;
pub mod pose3;
pub mod rot2;
pub mod rot3;
pub mod vector;

pub use pose2::{Pose2, Pose2Tangent};
pub use pose3::{Pose3, Pose3Tangent};
pub use rot2::{Rot2, Rot2Tangent};
pub use rot3::{Rot3, Rot3Tangent};
pub use vector::{Vector1, Vector2, Vector3, Vector4, Vector5, Vector6, VectorN};

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifoldError {
    /// Dimension validation failed during conversion
    DimensionMismatch { expected: usize, actual: usize },
    /// NaN or Inf detected in manifold element
    InvalidNumber,
    /// Normalization failed for manifold element
    NormalizationFailed(String),
}

impl Display for ManifoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            ManifoldError::InvalidNumber => {
                write!(f, "Invalid number: NaN or Inf detected")
            }
            ManifoldError::NormalizationFailed(msg) => {
                write!(f, "Normalization failed: {msg}")
            }
        }
    }
}

impl error::Error for ManifoldError {}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Check that a raw coordinate slice has the expected length and finite entries.
pub(crate) fn check_coordinates(data: &[f64], expected: usize) -> ManifoldResult<()> {
    if data.len() != expected {
        return Err(ManifoldError::DimensionMismatch {
            expected,
            actual: data.len(),
        });
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(ManifoldError::InvalidNumber);
    }
    Ok(())
}

/// Core trait for Lie group operations.
///
/// Mirrors the manif API restricted to what factor linearization needs: group operations,
/// the logarithm, the adjoint and right-perturbation plus/minus, each with optional
/// Jacobian outputs.
pub trait LieGroup: Clone + PartialEq + Debug + Display + Send + Sync + 'static {
    /// The tangent space vector type
    type TangentVector: Tangent<Self>;

    /// The (square, tangent-dimension) Jacobian matrix type
    type JacobianMatrix: Clone
        + PartialEq
        + Debug
        + Neg<Output = Self::JacobianMatrix>
        + Mul<Output = Self::JacobianMatrix>
        + Index<(usize, usize), Output = f64>;

    /// The neutral element e with e ∘ g = g ∘ e = g.
    fn identity() -> Self;

    /// Compute the inverse of this manifold element.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂(g⁻¹)/∂g = -Ad(g)
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self;

    /// Compose this element with another (group multiplication).
    ///
    /// # Arguments
    /// * `other` - The right operand for composition
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₁ = Ad(g₂⁻¹)
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₂ = I
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self;

    /// Logarithmic map from manifold to tangent space.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂Log(g)/∂g = Jr⁻¹(Log(g))
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector;

    /// Adjoint matrix Ad(g), so that g ∘ Exp(τ) = Exp(Ad(g)·τ) ∘ g.
    fn adjoint(&self) -> Self::JacobianMatrix;

    /// Generate a random element (useful for testing and initialization).
    fn random() -> Self;

    /// Identity matrix of Jacobian size.
    fn jacobian_identity() -> Self::JacobianMatrix;

    /// Check if the element is approximately equal to another element.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        self.local_coordinate(other, None, None).is_zero(tolerance)
    }

    /// Right plus operation: g ⊞ τ = g ∘ Exp(τ).
    ///
    /// # Notes
    /// J_g = Ad(Exp(τ))⁻¹, J_τ = Jr(τ)
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let exp_tangent = tangent.exp(None);

        if let Some(jac_tangent) = jacobian_tangent {
            *jac_tangent = tangent.right_jacobian();
        }

        self.compose(&exp_tangent, jacobian_self, None)
    }

    /// Right minus operation: g₁ ⊟ g₂ = Log(g₂⁻¹ ∘ g₁).
    ///
    /// # Notes
    /// J_g₁ = Jr⁻¹(τ), J_g₂ = -Jl⁻¹(τ)
    fn right_minus(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        let result = other.inverse(None).compose(self, None, None).log(None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = result.right_jacobian_inv();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = -result.left_jacobian_inv();
        }

        result
    }

    /// Compute g₁⁻¹ ∘ g₂ (relative transformation).
    ///
    /// # Notes
    /// J_g₁ = -Ad(g₂⁻¹ ∘ g₁), J_g₂ = I
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let result = self.inverse(None).compose(other, None, None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = -result.inverse(None).adjoint();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Self::jacobian_identity();
        }

        result
    }

    /// Move along a tangent direction: p ∘ Exp(τ).
    fn retract(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        self.right_plus(tangent, jacobian_self, jacobian_tangent)
    }

    /// Tangent vector taking `self` to `other`: Log(self⁻¹ ∘ other).
    ///
    /// Inverse of [`LieGroup::retract`]: `p.retract(&p.local_coordinate(&q, ..), ..) == q`.
    fn local_coordinate(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        other.right_minus(self, jacobian_other, jacobian_self)
    }

    /// Get the dimension of the tangent space for this manifold element.
    fn tangent_dim(&self) -> usize {
        Self::TangentVector::DIM
    }
}

/// Trait for tangent space (Lie algebra) vectors of a [`LieGroup`].
///
/// The `DVector` conversions expose the tangent coordinates in the layout documented on each
/// group, which is how the global tangent vector of a
/// [`Values`](crate::core::values::Values) store is sliced per variable.
pub trait Tangent<Group: LieGroup>:
    Clone + PartialEq + Debug + From<DVector<f64>> + Into<DVector<f64>>
{
    /// Dimension of the tangent space
    const DIM: usize;

    /// Exponential map to Lie group: Exp(τ).
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂Exp(τ)/∂τ = Jr(τ)
    fn exp(&self, jacobian: Option<&mut Group::JacobianMatrix>) -> Group;

    /// Right Jacobian Jr: Exp(τ + δτ) ≈ Exp(τ) ∘ Exp(Jr·δτ).
    fn right_jacobian(&self) -> Group::JacobianMatrix;

    /// Left Jacobian Jl: Exp(τ + δτ) ≈ Exp(Jl·δτ) ∘ Exp(τ).
    fn left_jacobian(&self) -> Group::JacobianMatrix;

    /// Inverse of right Jacobian Jr⁻¹.
    fn right_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Inverse of left Jacobian Jl⁻¹.
    fn left_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Zero tangent vector.
    fn zero() -> Group::TangentVector;

    /// Random tangent vector (useful for testing).
    fn random() -> Group::TangentVector;

    /// Check if the tangent vector is approximately zero.
    fn is_zero(&self, tolerance: f64) -> bool;
}

/// Skew-symmetric matrix [v]ₓ such that [v]ₓ·u = v × u.
pub fn skew(v: &nalgebra::Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Copy a group Jacobian into a dynamically sized matrix.
pub fn jacobian_to_dmatrix<M: LieGroup>(jacobian: &M::JacobianMatrix) -> DMatrix<f64> {
    let dim = <M::TangentVector as Tangent<M>>::DIM;
    DMatrix::from_fn(dim, dim, |r, c| jacobian[(r, c)])
}
