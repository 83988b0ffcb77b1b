//! Pose3 - spatial rigid transforms, SE(3).
//!
//! Tangent vectors are `[ρ, φ]` with the body-frame translational part first. The exponential
//! reuses the SO(3) left Jacobian:
//!
//! ```text
//! Exp([ρ, φ]) = (Exp(φ), Jl(φ)·ρ)
//! Log(R, t)   = [Jl⁻¹(φ)·t, φ]       φ = Log(R)
//! ```
//!
//! The SE(3) Jacobians couple the two halves through the Q(ρ, φ) block of Barfoot,
//! "State Estimation for Robotics", eq. 7.86.

use crate::manifold::{
    LieGroup, ManifoldResult, Tangent, check_coordinates,
    rot3::{Rot3, Rot3Tangent},
    skew,
};
use nalgebra::{DVector, Matrix3, Matrix4, Matrix6, Vector3, Vector6};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Below this θ² the Q coefficients switch to their Taylor expansions.
const Q_SMALL_ANGLE_SQUARED: f64 = 1e-4;

/// Element of SE(3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3 {
    rotation: Rot3,
    translation: Vector3<f64>,
}

impl Display for Pose3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.rotation.quaternion().into_inner();
        write!(
            f,
            "Pose3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            self.translation.x,
            self.translation.y,
            self.translation.z,
            q.w,
            q.i,
            q.j,
            q.k
        )
    }
}

impl Pose3 {
    pub fn new(rotation: Rot3, translation: Vector3<f64>) -> Self {
        Pose3 {
            rotation,
            translation,
        }
    }

    /// Pose from a position and roll/pitch/yaw angles.
    pub fn from_translation_euler(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Pose3::new(
            Rot3::from_euler_angles(roll, pitch, yaw),
            Vector3::new(x, y, z),
        )
    }

    /// Build from `[x, y, z, qw, qx, qy, qz]`.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        check_coordinates(data, 7)?;
        let rotation = Rot3::try_from_slice(&data[3..])?;
        Ok(Pose3::new(
            rotation,
            Vector3::new(data[0], data[1], data[2]),
        ))
    }

    pub fn rotation(&self) -> Rot3 {
        self.rotation
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn z(&self) -> f64 {
        self.translation.z
    }

    /// Map a point from the pose frame into the reference frame.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.rotate(point) + self.translation
    }

    /// Homogeneous 4x4 matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.rotation_matrix());
        matrix
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        matrix
    }
}

impl From<Pose3> for DVector<f64> {
    fn from(pose: Pose3) -> Self {
        let q = pose.rotation.quaternion().into_inner();
        DVector::from_vec(vec![pose.x(), pose.y(), pose.z(), q.w, q.i, q.j, q.k])
    }
}

impl LieGroup for Pose3 {
    type TangentVector = Pose3Tangent;
    type JacobianMatrix = Matrix6<f64>;

    fn identity() -> Self {
        Pose3::new(Rot3::identity(), Vector3::zeros())
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }
        let rotation = self.rotation.inverse(None);
        Pose3::new(rotation, -rotation.rotate(&self.translation))
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = other.inverse(None).adjoint();
        }
        if let Some(jac) = jacobian_other {
            *jac = Matrix6::identity();
        }
        Pose3::new(
            self.rotation.compose(&other.rotation, None, None),
            self.transform_point(&other.translation),
        )
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let phi = self.rotation.log(None);
        let rho = phi.left_jacobian_inv() * self.translation;
        let result = Pose3Tangent::new(rho, *phi.coordinates());

        if let Some(jac) = jacobian {
            *jac = result.right_jacobian_inv();
        }
        result
    }

    /// `[R  [t]ₓR; 0  R]`
    fn adjoint(&self) -> Self::JacobianMatrix {
        let rotation = self.rotation.rotation_matrix();
        let mut adjoint = Matrix6::zeros();
        adjoint.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        adjoint
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(skew(&self.translation) * rotation));
        adjoint.fixed_view_mut::<3, 3>(3, 3).copy_from(&rotation);
        adjoint
    }

    fn random() -> Self {
        let mut rng = rand::rng();
        Pose3::new(
            Rot3::random(),
            Vector3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ),
        )
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix6::identity()
    }
}

/// Element of se(3), `[ρ, φ]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3Tangent {
    rho: Vector3<f64>,
    phi: Vector3<f64>,
}

impl Pose3Tangent {
    pub fn new(rho: Vector3<f64>, phi: Vector3<f64>) -> Self {
        Pose3Tangent { rho, phi }
    }

    /// Translational part.
    pub fn rho(&self) -> Vector3<f64> {
        self.rho
    }

    /// Rotational part.
    pub fn phi(&self) -> Vector3<f64> {
        self.phi
    }

    pub fn coordinates(&self) -> Vector6<f64> {
        Vector6::new(
            self.rho.x, self.rho.y, self.rho.z, self.phi.x, self.phi.y, self.phi.z,
        )
    }

    fn rotation_part(&self) -> Rot3Tangent {
        Rot3Tangent::new(self.phi)
    }
}

/// Q(ρ, φ), the off-diagonal block of the SE(3) left Jacobian.
fn q_block(rho: &Vector3<f64>, phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta_sq = phi.norm_squared();
    let (c1, c2, c3) = if theta_sq < Q_SMALL_ANGLE_SQUARED {
        let theta_4 = theta_sq * theta_sq;
        (
            1.0 / 6.0 - theta_sq / 120.0 + theta_4 / 5040.0,
            1.0 / 24.0 - theta_sq / 720.0 + theta_4 / 40320.0,
            1.0 / 120.0 - theta_sq / 2520.0 + theta_4 / 120960.0,
        )
    } else {
        let theta = theta_sq.sqrt();
        let (sin, cos) = theta.sin_cos();
        (
            (theta - sin) / (theta_sq * theta),
            (theta_sq + 2.0 * cos - 2.0) / (2.0 * theta_sq * theta_sq),
            (2.0 * theta - 3.0 * sin + theta * cos) / (2.0 * theta_sq * theta_sq * theta),
        )
    };

    let p = skew(phi);
    let r = skew(rho);
    let pr = p * r;
    let rp = r * p;
    let prp = pr * p;
    let ppr = p * pr;
    let rpp = rp * p;

    0.5 * r + c1 * (pr + rp + prp) + c2 * (ppr + rpp - 3.0 * prp) + c3 * (prp * p + p * prp)
}

/// Assemble `[A B; 0 A]`.
fn upper_block_triangular(diagonal: &Matrix3<f64>, corner: &Matrix3<f64>) -> Matrix6<f64> {
    let mut jacobian = Matrix6::zeros();
    jacobian.fixed_view_mut::<3, 3>(0, 0).copy_from(diagonal);
    jacobian.fixed_view_mut::<3, 3>(0, 3).copy_from(corner);
    jacobian.fixed_view_mut::<3, 3>(3, 3).copy_from(diagonal);
    jacobian
}

impl Display for Pose3Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pose3(rho: [{:.4}, {:.4}, {:.4}], phi: [{:.4}, {:.4}, {:.4}])",
            self.rho.x, self.rho.y, self.rho.z, self.phi.x, self.phi.y, self.phi.z
        )
    }
}

impl From<DVector<f64>> for Pose3Tangent {
    fn from(data: DVector<f64>) -> Self {
        Pose3Tangent::new(
            Vector3::new(data[0], data[1], data[2]),
            Vector3::new(data[3], data[4], data[5]),
        )
    }
}

impl From<Pose3Tangent> for DVector<f64> {
    fn from(tangent: Pose3Tangent) -> Self {
        DVector::from_column_slice(tangent.coordinates().as_slice())
    }
}

impl Tangent<Pose3> for Pose3Tangent {
    const DIM: usize = 6;

    fn exp(&self, jacobian: Option<&mut Matrix6<f64>>) -> Pose3 {
        let rotation_tangent = self.rotation_part();
        let translation = rotation_tangent.left_jacobian() * self.rho;

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }
        Pose3::new(rotation_tangent.exp(None), translation)
    }

    fn right_jacobian(&self) -> Matrix6<f64> {
        upper_block_triangular(
            &self.rotation_part().right_jacobian(),
            &q_block(&-self.rho, &-self.phi),
        )
    }

    fn left_jacobian(&self) -> Matrix6<f64> {
        upper_block_triangular(
            &self.rotation_part().left_jacobian(),
            &q_block(&self.rho, &self.phi),
        )
    }

    fn right_jacobian_inv(&self) -> Matrix6<f64> {
        let a_inv = self.rotation_part().right_jacobian_inv();
        let q = q_block(&-self.rho, &-self.phi);
        upper_block_triangular(&a_inv, &(-a_inv * q * a_inv))
    }

    fn left_jacobian_inv(&self) -> Matrix6<f64> {
        let a_inv = self.rotation_part().left_jacobian_inv();
        let q = q_block(&self.rho, &self.phi);
        upper_block_triangular(&a_inv, &(-a_inv * q * a_inv))
    }

    fn zero() -> Pose3Tangent {
        Pose3Tangent::new(Vector3::zeros(), Vector3::zeros())
    }

    fn random() -> Pose3Tangent {
        let mut rng = rand::rng();
        Pose3Tangent::new(
            Vector3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ),
            *Rot3Tangent::random().coordinates(),
        )
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.coordinates().norm() < tolerance
    }
}
