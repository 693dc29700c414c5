//! SO(3) helpers used by the projection factors
//!
//! Rotations are carried as nalgebra `UnitQuaternion<f64>` / `Matrix3<f64>`.
//! Tangent vectors are axis-angle vectors in R³ and perturbations are applied
//! on the right: `R ← R · Exp(δθ)`.

use nalgebra::{Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};

/// Below this squared angle the exponential map uses its first-order expansion.
pub const SMALL_ANGLE_THRESHOLD: f64 = 1e-10;

/// Skew-symmetric (hat) matrix of a vector.
///
/// [v]× such that [v]× * w = v × w
///
/// ```text
/// [v]× = [  0  -vz  vy ]
///        [  vz  0  -vx ]
///        [ -vy  vx  0  ]
/// ```
#[inline]
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation matrix for a rotation of `angle` radians about a fixed unit axis.
///
/// Rodrigues' formula:
/// ```text
/// R = I + sin θ [k]× + (1 - cos θ) [k]×²
/// ```
pub fn rodrigues_rotation(axis: &Unit<Vector3<f64>>, angle: f64) -> Matrix3<f64> {
    let k = skew_symmetric(axis.as_ref());
    Matrix3::identity() + angle.sin() * k + (1.0 - angle.cos()) * k * k
}

/// SO(3) exponential map from an axis-angle vector to a unit quaternion.
///
/// q = Exp(θu) = cos(θ/2) + u sin(θ/2)
pub fn exp(theta: &Vector3<f64>) -> UnitQuaternion<f64> {
    if theta.norm_squared() > SMALL_ANGLE_THRESHOLD {
        UnitQuaternion::from_scaled_axis(*theta)
    } else {
        UnitQuaternion::from_quaternion(Quaternion::new(
            1.0,
            theta.x / 2.0,
            theta.y / 2.0,
            theta.z / 2.0,
        ))
    }
}

/// Right-plus on SO(3): `q ⊗ Exp(δθ)`.
#[inline]
pub fn right_plus(rotation: &UnitQuaternion<f64>, delta: &Vector3<f64>) -> UnitQuaternion<f64> {
    rotation * exp(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_skew_symmetric_is_cross_product() {
        let v = Vector3::new(0.3, -1.2, 2.5);
        let w = Vector3::new(-0.7, 0.4, 1.1);
        assert!((skew_symmetric(&v) * w - v.cross(&w)).norm() < TOLERANCE);
        assert!((skew_symmetric(&v) + skew_symmetric(&v).transpose()).norm() < TOLERANCE);
    }

    #[test]
    fn test_rodrigues_quarter_turn_about_z() {
        let r = rodrigues_rotation(&Vector3::z_axis(), FRAC_PI_2);
        let rotated = r * Vector3::x();
        assert!((rotated - Vector3::y()).norm() < TOLERANCE);
    }

    #[test]
    fn test_rodrigues_matches_nalgebra() {
        let axis = Unit::new_normalize(Vector3::new(1.0, -2.0, 0.5));
        let angle = 0.83;
        let expected = UnitQuaternion::from_axis_angle(&axis, angle).to_rotation_matrix();
        assert!((rodrigues_rotation(&axis, angle) - expected.matrix()).norm() < TOLERANCE);
    }

    #[test]
    fn test_rodrigues_zero_angle_is_identity() {
        let axis = Unit::new_normalize(Vector3::new(0.2, 0.3, 0.9));
        assert!((rodrigues_rotation(&axis, 0.0) - Matrix3::identity()).norm() < TOLERANCE);
    }

    #[test]
    fn test_exp_small_angle_branch() {
        let theta = Vector3::new(1e-7, -2e-7, 3e-7);
        let q = exp(&theta);
        assert!((q.scaled_axis() - theta).norm() < 1e-15);
    }

    #[test]
    fn test_right_plus_composes_on_the_right() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.4, 0.9);
        let delta = Vector3::new(0.05, 0.02, -0.03);
        let expected = q.to_rotation_matrix().matrix() * exp(&delta).to_rotation_matrix().matrix();
        let actual = right_plus(&q, &delta).to_rotation_matrix().into_inner();
        assert!((actual - expected).norm() < TOLERANCE);
    }
}
