//! Pose2 - planar rigid transforms, SE(2).
//!
//! A pose is a rotation followed by a translation, `p(x) = R·x + t`. Tangent vectors are laid
//! out translation first, `[x, y, θ]`, and the translational part lives in the body frame:
//!
//! ```text
//! Exp([ρ, θ]) = (R(θ), V(θ)·ρ)     V(θ) = [a  -b]   a = sin θ / θ
//!                                         [b   a]   b = (1 - cos θ) / θ
//! ```

use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_coordinates, rot2::Rot2};
use nalgebra::{DVector, Matrix2, Matrix3, Vector2, Vector3};
use rand::Rng;
use std::{
    f64::consts::PI,
    fmt,
    fmt::{Display, Formatter},
};

/// Below this θ² the trigonometric ratios switch to their Taylor expansions.
const SMALL_ANGLE_SQUARED: f64 = 1e-6;

/// Element of SE(2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2 {
    rotation: Rot2,
    translation: Vector2<f64>,
}

impl Display for Pose2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose2(translation: [{:.4}, {:.4}], rotation: {:.4})",
            self.translation.x,
            self.translation.y,
            self.theta()
        )
    }
}

impl Pose2 {
    /// Pose from planar position and heading.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2::from_parts(Rot2::from_angle(theta), Vector2::new(x, y))
    }

    pub fn from_parts(rotation: Rot2, translation: Vector2<f64>) -> Self {
        Pose2 {
            rotation,
            translation,
        }
    }

    /// Build from `[x, y, θ]`, validating length and finiteness.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        check_coordinates(data, 3)?;
        Ok(Pose2::new(data[0], data[1], data[2]))
    }

    pub fn rotation(&self) -> Rot2 {
        self.rotation
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.translation
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn theta(&self) -> f64 {
        self.rotation.angle()
    }

    /// Map a point from the pose frame into the reference frame.
    pub fn transform_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation.rotate(point) + self.translation
    }

    /// Homogeneous 3x3 matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        let mut matrix = Matrix3::identity();
        matrix
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.rotation.rotation_matrix());
        matrix[(0, 2)] = self.translation.x;
        matrix[(1, 2)] = self.translation.y;
        matrix
    }
}

impl From<DVector<f64>> for Pose2 {
    fn from(data: DVector<f64>) -> Self {
        Pose2::new(data[0], data[1], data[2])
    }
}

impl From<Pose2> for DVector<f64> {
    fn from(pose: Pose2) -> Self {
        DVector::from_vec(vec![pose.x(), pose.y(), pose.theta()])
    }
}

impl LieGroup for Pose2 {
    type TangentVector = Pose2Tangent;
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        Pose2::from_parts(Rot2::identity(), Vector2::zeros())
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }
        let rotation = self.rotation.inverse(None);
        Pose2::from_parts(rotation, -rotation.rotate(&self.translation))
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
            *jac = Matrix3::identity();
        }
        Pose2::from_parts(
            self.rotation.compose(&other.rotation, None, None),
            self.transform_point(&other.translation),
        )
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let theta = self.theta();
        let (a, b) = exp_coefficients(theta);

        // V⁻¹ = 1/(a² + b²) [a b; -b a]
        let scale = 1.0 / (a * a + b * b);
        let (x, y) = (self.translation.x, self.translation.y);
        let result = Pose2Tangent::new(
            scale * (a * x + b * y),
            scale * (-b * x + a * y),
            theta,
        );

        if let Some(jac) = jacobian {
            *jac = result.right_jacobian_inv();
        }
        result
    }

    /// `[R  (y, -x)ᵀ; 0 1]`
    fn adjoint(&self) -> Self::JacobianMatrix {
        let mut adjoint = Matrix3::identity();
        adjoint
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.rotation.rotation_matrix());
        adjoint[(0, 2)] = self.translation.y;
        adjoint[(1, 2)] = -self.translation.x;
        adjoint
    }

    fn random() -> Self {
        let mut rng = rand::rng();
        Pose2::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-PI..PI),
        )
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }
}

/// `(sin θ / θ, (1 - cos θ) / θ)`
fn exp_coefficients(theta: f64) -> (f64, f64) {
    let theta_sq = theta * theta;
    if theta_sq < SMALL_ANGLE_SQUARED {
        (1.0 - theta_sq / 6.0, 0.5 * theta - theta * theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    }
}

/// `((1 - cos θ) / θ², (θ - sin θ) / θ²)`
fn jacobian_coefficients(theta: f64) -> (f64, f64) {
    let theta_sq = theta * theta;
    if theta_sq < SMALL_ANGLE_SQUARED {
        (
            0.5 - theta_sq / 24.0 + theta_sq * theta_sq / 720.0,
            theta / 6.0 - theta * theta_sq / 120.0,
        )
    } else {
        let half_sin = (0.5 * theta).sin();
        (
            2.0 * half_sin * half_sin / theta_sq,
            (theta - theta.sin()) / theta_sq,
        )
    }
}

/// Element of se(2), `[x, y, θ]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2Tangent {
    data: Vector3<f64>,
}

impl Pose2Tangent {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2Tangent {
            data: Vector3::new(x, y, theta),
        }
    }

    pub fn x(&self) -> f64 {
        self.data[0]
    }

    pub fn y(&self) -> f64 {
        self.data[1]
    }

    pub fn theta(&self) -> f64 {
        self.data[2]
    }

    pub fn coordinates(&self) -> &Vector3<f64> {
        &self.data
    }
}

impl Display for Pose2Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pose2(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.x(),
            self.y(),
            self.theta()
        )
    }
}

impl From<DVector<f64>> for Pose2Tangent {
    fn from(data: DVector<f64>) -> Self {
        Pose2Tangent::new(data[0], data[1], data[2])
    }
}

impl From<Pose2Tangent> for DVector<f64> {
    fn from(tangent: Pose2Tangent) -> Self {
        DVector::from_column_slice(tangent.data.as_slice())
    }
}

impl Tangent<Pose2> for Pose2Tangent {
    const DIM: usize = 3;

    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> Pose2 {
        let theta = self.theta();
        let (a, b) = exp_coefficients(theta);
        let (x, y) = (self.x(), self.y());

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }
        Pose2::from_parts(
            Rot2::from_angle(theta),
            Vector2::new(a * x - b * y, b * x + a * y),
        )
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        let theta = self.theta();
        let (a, b) = exp_coefficients(theta);
        let (c, d) = jacobian_coefficients(theta);
        let (x, y) = (self.x(), self.y());

        Matrix3::new(
            a,
            b,
            -y * c + x * d,
            -b,
            a,
            x * c + y * d,
            0.0,
            0.0,
            1.0,
        )
    }

    fn left_jacobian(&self) -> Matrix3<f64> {
        Pose2Tangent { data: -self.data }.right_jacobian()
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        invert_jacobian(&self.right_jacobian())
    }

    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        invert_jacobian(&self.left_jacobian())
    }

    fn zero() -> Pose2Tangent {
        Pose2Tangent::new(0.0, 0.0, 0.0)
    }

    fn random() -> Pose2Tangent {
        let mut rng = rand::rng();
        Pose2Tangent::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-PI..PI),
        )
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }
}

/// Invert `[A c; 0 1]` as `[A⁻¹ -A⁻¹c; 0 1]`, with `A = [p q; -q p]`.
fn invert_jacobian(jacobian: &Matrix3<f64>) -> Matrix3<f64> {
    let (p, q) = (jacobian[(0, 0)], jacobian[(0, 1)]);
    let scale = 1.0 / (p * p + q * q);
    let a_inv = Matrix2::new(p, -q, q, p) * scale;
    let c = Vector2::new(jacobian[(0, 2)], jacobian[(1, 2)]);
    let top_right = -(a_inv * c);

    let mut inverse = Matrix3::identity();
    inverse.fixed_view_mut::<2, 2>(0, 0).copy_from(&a_inv);
    inverse[(0, 2)] = top_right.x;
    inverse[(1, 2)] = top_right.y;
    inverse
}
