//! Rot2 - planar rotations, SO(2).
//!
//! Stored as a unit complex number. The tangent space is a single angle in radians, and since
//! SO(2) is commutative every adjoint and Jacobian is the scalar ±1.

use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_coordinates};
use nalgebra::{DVector, Matrix1, Matrix2, UnitComplex, Vector2};
use rand::Rng;
use std::{
    f64::consts::PI,
    fmt,
    fmt::{Display, Formatter},
};

/// Element of SO(2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot2 {
    complex: UnitComplex<f64>,
}

impl Display for Rot2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Rot2(angle: {:.4})", self.angle())
    }
}

impl Rot2 {
    pub fn new(complex: UnitComplex<f64>) -> Self {
        Rot2 { complex }
    }

    /// Rotation by `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Rot2::new(UnitComplex::from_angle(angle))
    }

    pub fn complex(&self) -> UnitComplex<f64> {
        self.complex
    }

    /// Angle in (-π, π].
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.complex.to_rotation_matrix().into_inner()
    }

    /// Rotate a planar point.
    pub fn rotate(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.complex * *point
    }
}

impl From<DVector<f64>> for Rot2 {
    fn from(data: DVector<f64>) -> Self {
        Rot2::from_angle(data[0])
    }
}

impl From<Rot2> for DVector<f64> {
    fn from(rotation: Rot2) -> Self {
        DVector::from_vec(vec![rotation.angle()])
    }
}

impl LieGroup for Rot2 {
    type TangentVector = Rot2Tangent;
    type JacobianMatrix = Matrix1<f64>;

    fn identity() -> Self {
        Rot2::new(UnitComplex::identity())
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -Matrix1::identity();
        }
        Rot2::new(self.complex.inverse())
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = Matrix1::identity();
        }
        if let Some(jac) = jacobian_other {
            *jac = Matrix1::identity();
        }
        Rot2::new(self.complex * other.complex)
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        Rot2Tangent::new(self.angle())
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn random() -> Self {
        let mut rng = rand::rng();
        Rot2::from_angle(rng.random_range(-PI..PI))
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix1::identity()
    }
}

/// Element of so(2): an angle in radians, not wrapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot2Tangent {
    angle: f64,
}

impl Rot2Tangent {
    pub fn new(angle: f64) -> Self {
        Rot2Tangent { angle }
    }

    /// Build from a one-element slice, validating finiteness.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        check_coordinates(data, 1)?;
        Ok(Rot2Tangent::new(data[0]))
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

impl Display for Rot2Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "rot2(angle: {:.4})", self.angle)
    }
}

impl From<DVector<f64>> for Rot2Tangent {
    fn from(data: DVector<f64>) -> Self {
        Rot2Tangent::new(data[0])
    }
}

impl From<Rot2Tangent> for DVector<f64> {
    fn from(tangent: Rot2Tangent) -> Self {
        DVector::from_vec(vec![tangent.angle])
    }
}

impl Tangent<Rot2> for Rot2Tangent {
    const DIM: usize = 1;

    fn exp(&self, jacobian: Option<&mut Matrix1<f64>>) -> Rot2 {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        Rot2::from_angle(self.angle)
    }

    fn right_jacobian(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn left_jacobian(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn right_jacobian_inv(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn left_jacobian_inv(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn zero() -> Rot2Tangent {
        Rot2Tangent::new(0.0)
    }

    fn random() -> Rot2Tangent {
        let mut rng = rand::rng();
        Rot2Tangent::new(rng.random_range(-PI..PI))
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.angle.abs() < tolerance
    }
}
