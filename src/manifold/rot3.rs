//! Rot3 - spatial rotations, SO(3).
//!
//! Stored as a unit quaternion; tangent vectors are rotation vectors ω = θ·axis. Jacobians
//! follow "A micro Lie theory for state estimation in robotics" (Solà et al.):
//!
//! ```text
//! Jr(ω)  = I - a·[ω]ₓ + b·[ω]ₓ²        a = (1 - cos θ) / θ²
//! Jl(ω)  = I + a·[ω]ₓ + b·[ω]ₓ²        b = (θ - sin θ) / θ³
//! Jr⁻¹(ω) = I + ½[ω]ₓ + c·[ω]ₓ²        c = (1 - θ / (2 tan(θ/2))) / θ²
//! Jl⁻¹(ω) = I - ½[ω]ₓ + c·[ω]ₓ²
//! ```

use crate::manifold::{
    LieGroup, ManifoldError, ManifoldResult, Tangent, check_coordinates, skew,
};
use nalgebra::{DVector, Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};
use rand::Rng;
use std::{
    f64::consts::PI,
    fmt,
    fmt::{Display, Formatter},
};

/// Below this θ² the Jacobian coefficients switch to their Taylor expansions.
pub(crate) const SMALL_ANGLE_SQUARED: f64 = 1e-6;

/// Element of SO(3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot3 {
    quaternion: UnitQuaternion<f64>,
}

impl Display for Rot3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "Rot3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl Rot3 {
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        Rot3 { quaternion }
    }

    /// Normalize `w + xi + yj + zk` into a rotation.
    pub fn try_from_quaternion(w: f64, x: f64, y: f64, z: f64) -> ManifoldResult<Self> {
        check_coordinates(&[w, x, y, z], 4)?;
        UnitQuaternion::try_new(Quaternion::new(w, x, y, z), f64::EPSILON)
            .map(Rot3::new)
            .ok_or_else(|| {
                ManifoldError::NormalizationFailed("quaternion has zero norm".to_string())
            })
    }

    /// Build from `[w, x, y, z]`.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        check_coordinates(data, 4)?;
        Rot3::try_from_quaternion(data[0], data[1], data[2], data[3])
    }

    /// Rotation of `angle` radians about `axis` (normalized internally).
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Self {
        Rot3::new(UnitQuaternion::from_axis_angle(
            &Unit::new_normalize(*axis),
            angle,
        ))
    }

    /// Rotation from roll, pitch and yaw in radians.
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        Rot3::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Rotate a point.
    pub fn rotate(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * *point
    }
}

impl From<Rot3> for DVector<f64> {
    fn from(rotation: Rot3) -> Self {
        let q = rotation.quaternion.quaternion();
        DVector::from_vec(vec![q.w, q.i, q.j, q.k])
    }
}

impl LieGroup for Rot3 {
    type TangentVector = Rot3Tangent;
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        Rot3::new(UnitQuaternion::identity())
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.rotation_matrix();
        }
        Rot3::new(self.quaternion.inverse())
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = other.rotation_matrix().transpose();
        }
        if let Some(jac) = jacobian_other {
            *jac = Matrix3::identity();
        }
        Rot3::new(self.quaternion * other.quaternion)
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let q = self.quaternion.quaternion();
        let vector = q.imag();
        let sin_half_squared = vector.norm_squared();

        let scale = if sin_half_squared > f64::EPSILON {
            let sin_half = sin_half_squared.sqrt();
            // w < 0 picks the equivalent quaternion -q so the angle stays in [-π, π]
            let angle = if q.w < 0.0 {
                2.0 * f64::atan2(-sin_half, -q.w)
            } else {
                2.0 * f64::atan2(sin_half, q.w)
            };
            angle / sin_half
        } else {
            2.0 / q.w * (1.0 - sin_half_squared / (3.0 * q.w * q.w))
        };

        let result = Rot3Tangent::new(vector * scale);
        if let Some(jac) = jacobian {
            *jac = result.right_jacobian_inv();
        }
        result
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        self.rotation_matrix()
    }

    fn random() -> Self {
        Rot3Tangent::random().exp(None)
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }
}

/// Element of so(3), a rotation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot3Tangent {
    data: Vector3<f64>,
}

impl Rot3Tangent {
    pub fn new(data: Vector3<f64>) -> Self {
        Rot3Tangent { data }
    }

    pub fn coordinates(&self) -> &Vector3<f64> {
        &self.data
    }

    /// Rotation angle θ = ‖ω‖.
    pub fn angle(&self) -> f64 {
        self.data.norm()
    }

    /// `[ω]ₓ`
    pub fn hat(&self) -> Matrix3<f64> {
        skew(&self.data)
    }

    /// `((1 - cos θ)/θ², (θ - sin θ)/θ³)`
    fn jacobian_coefficients(&self) -> (f64, f64) {
        let theta_sq = self.data.norm_squared();
        if theta_sq < SMALL_ANGLE_SQUARED {
            (0.5 - theta_sq / 24.0, 1.0 / 6.0 - theta_sq / 120.0)
        } else {
            let theta = theta_sq.sqrt();
            let half_sin = (0.5 * theta).sin();
            (
                2.0 * half_sin * half_sin / theta_sq,
                (theta - theta.sin()) / (theta_sq * theta),
            )
        }
    }

    /// `(1 - θ / (2 tan(θ/2))) / θ²`
    fn inverse_jacobian_coefficient(&self) -> f64 {
        let theta_sq = self.data.norm_squared();
        if theta_sq < SMALL_ANGLE_SQUARED {
            1.0 / 12.0 + theta_sq / 720.0 + theta_sq * theta_sq / 30240.0
        } else {
            let theta = theta_sq.sqrt();
            (1.0 - theta / (2.0 * (0.5 * theta).tan())) / theta_sq
        }
    }
}

impl Display for Rot3Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rot3(omega: [{:.4}, {:.4}, {:.4}])",
            self.data.x, self.data.y, self.data.z
        )
    }
}

impl From<DVector<f64>> for Rot3Tangent {
    fn from(data: DVector<f64>) -> Self {
        Rot3Tangent::new(Vector3::new(data[0], data[1], data[2]))
    }
}

impl From<Rot3Tangent> for DVector<f64> {
    fn from(tangent: Rot3Tangent) -> Self {
        DVector::from_column_slice(tangent.data.as_slice())
    }
}

impl Tangent<Rot3> for Rot3Tangent {
    const DIM: usize = 3;

    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> Rot3 {
        let theta_sq = self.data.norm_squared();
        let (w, scale) = if theta_sq > f64::EPSILON {
            let theta = theta_sq.sqrt();
            let half = 0.5 * theta;
            (half.cos(), half.sin() / theta)
        } else {
            (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
        };
        let xyz = self.data * scale;

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }
        Rot3::new(UnitQuaternion::new_normalize(Quaternion::new(
            w, xyz.x, xyz.y, xyz.z,
        )))
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        let (a, b) = self.jacobian_coefficients();
        let w = self.hat();
        Matrix3::identity() - a * w + b * w * w
    }

    fn left_jacobian(&self) -> Matrix3<f64> {
        let (a, b) = self.jacobian_coefficients();
        let w = self.hat();
        Matrix3::identity() + a * w + b * w * w
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        let c = self.inverse_jacobian_coefficient();
        let w = self.hat();
        Matrix3::identity() + 0.5 * w + c * w * w
    }

    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        let c = self.inverse_jacobian_coefficient();
        let w = self.hat();
        Matrix3::identity() - 0.5 * w + c * w * w
    }

    fn zero() -> Rot3Tangent {
        Rot3Tangent::new(Vector3::zeros())
    }

    fn random() -> Rot3Tangent {
        let mut rng = rand::rng();
        let axis = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let angle = rng.random_range(0.0..PI);
        Rot3Tangent::new(axis.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::x) * angle)
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }
}
