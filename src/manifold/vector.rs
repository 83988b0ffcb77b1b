//! Rⁿ - fixed-size Euclidean vectors as an additive Lie group.
//!
//! Composition is vector addition, so every Jacobian is ±I and the tangent space is the
//! vector space itself. [`VectorN`] is therefore its own tangent type.

use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_coordinates};
use nalgebra::{DVector, SMatrix, SVector};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
    ops::{Add, Index, Neg, Sub},
};

/// Element of Rᴺ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorN<const N: usize> {
    data: SVector<f64, N>,
}

pub type Vector1 = VectorN<1>;
pub type Vector2 = VectorN<2>;
pub type Vector3 = VectorN<3>;
pub type Vector4 = VectorN<4>;
pub type Vector5 = VectorN<5>;
pub type Vector6 = VectorN<6>;

impl<const N: usize> VectorN<N> {
    pub fn new(components: [f64; N]) -> Self {
        Self {
            data: SVector::from(components),
        }
    }

    pub fn from_vector(data: SVector<f64, N>) -> Self {
        Self { data }
    }

    /// Build from a slice, validating length and finiteness.
    pub fn try_from_slice(components: &[f64]) -> ManifoldResult<Self> {
        check_coordinates(components, N)?;
        Ok(Self {
            data: SVector::from_column_slice(components),
        })
    }

    pub fn vector(&self) -> &SVector<f64, N> {
        &self.data
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data.as_slice()
    }

    pub fn norm(&self) -> f64 {
        self.data.norm()
    }

    pub fn squared_norm(&self) -> f64 {
        self.data.norm_squared()
    }
}

impl<const N: usize> Default for VectorN<N> {
    fn default() -> Self {
        Self {
            data: SVector::zeros(),
        }
    }
}

impl<const N: usize> Display for VectorN<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Vector{N}(")?;
        for (i, value) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value:.4}")?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> Index<usize> for VectorN<N> {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.data[index]
    }
}

impl<const N: usize> Add for VectorN<N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_vector(self.data + rhs.data)
    }
}

impl<const N: usize> Sub for VectorN<N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_vector(self.data - rhs.data)
    }
}

impl<const N: usize> Neg for VectorN<N> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_vector(-self.data)
    }
}

/// # Panics
/// If the vector does not have exactly `N` entries.
impl<const N: usize> From<DVector<f64>> for VectorN<N> {
    fn from(data: DVector<f64>) -> Self {
        assert_eq!(
            data.len(),
            N,
            "cannot build a {N}-vector from {} coordinates",
            data.len()
        );
        Self::from_vector(SVector::from_column_slice(data.as_slice()))
    }
}

impl<const N: usize> From<VectorN<N>> for DVector<f64> {
    fn from(vector: VectorN<N>) -> Self {
        DVector::from_column_slice(vector.data.as_slice())
    }
}

impl<const N: usize> From<SVector<f64, N>> for VectorN<N> {
    fn from(data: SVector<f64, N>) -> Self {
        Self { data }
    }
}

impl<const N: usize> LieGroup for VectorN<N> {
    type TangentVector = VectorN<N>;
    type JacobianMatrix = SMatrix<f64, N, N>;

    fn identity() -> Self {
        Self::default()
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -SMatrix::identity();
        }
        -*self
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = SMatrix::identity();
        }
        if let Some(jac) = jacobian_other {
            *jac = SMatrix::identity();
        }
        *self + *other
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        if let Some(jac) = jacobian {
            *jac = SMatrix::identity();
        }
        *self
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        SMatrix::identity()
    }

    fn random() -> Self {
        let mut rng = rand::rng();
        Self::from_vector(SVector::from_fn(|_, _| rng.random_range(-5.0..5.0)))
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        SMatrix::identity()
    }
}

impl<const N: usize> Tangent<VectorN<N>> for VectorN<N> {
    const DIM: usize = N;

    fn exp(&self, jacobian: Option<&mut SMatrix<f64, N, N>>) -> VectorN<N> {
        if let Some(jac) = jacobian {
            *jac = SMatrix::identity();
        }
        *self
    }

    fn right_jacobian(&self) -> SMatrix<f64, N, N> {
        SMatrix::identity()
    }

    fn left_jacobian(&self) -> SMatrix<f64, N, N> {
        SMatrix::identity()
    }

    fn right_jacobian_inv(&self) -> SMatrix<f64, N, N> {
        SMatrix::identity()
    }

    fn left_jacobian_inv(&self) -> SMatrix<f64, N, N> {
        SMatrix::identity()
    }

    fn zero() -> VectorN<N> {
        Self::default()
    }

    fn random() -> VectorN<N> {
        let mut rng = rand::rng();
        Self::from_vector(SVector::from_fn(|_, _| rng.random_range(-1.0..1.0)))
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }
}
