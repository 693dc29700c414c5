//! Residual formulations for reprojection factors.
//!
//! Both models take the landmark expressed in the observing camera frame,
//! `x = [X, Y, Z]`, and compare it with the observed ray `u`.
//!
//! # Pinhole
//!
//! ```text
//! r = [X/Z, Y/Z] - [u_x, u_y]
//!
//! ∂r/∂x = [ 1/Z   0   -X/Z² ]
//!         [  0   1/Z  -Y/Z² ]
//! ```
//!
//! # Unit sphere
//!
//! ```text
//! r = B (x/|x| - u/|u|)
//!
//! ∂r/∂x = B (I - x xᵀ/|x|²) / |x|
//! ```
//!
//! `B` is a 2×3 orthonormal basis of the plane perpendicular to `u/|u|`, built once
//! per observation.

use nalgebra::{Matrix2x3, Matrix3, Vector2, Vector3};

use crate::calibration::ResidualModelType;
use crate::error::{ApexVioError, ApexVioResult};

/// Residual strategy bound to one observed ray.
#[derive(Debug, Clone, PartialEq)]
pub enum ResidualModel {
    /// Normalized image plane error
    Pinhole,
    /// Tangent-plane error on the unit sphere
    UnitSphere {
        /// `u / |u|`
        unit_observation: Vector3<f64>,
        /// Rows span the plane perpendicular to `unit_observation`
        tangent_base: Matrix2x3<f64>,
    },
}

impl ResidualModel {
    /// Build the strategy for an observed ray.
    ///
    /// The unit-sphere model needs a non-zero, finite ray.
    pub fn new(model_type: ResidualModelType, observation: &Vector3<f64>) -> ApexVioResult<Self> {
        match model_type {
            ResidualModelType::Pinhole => Ok(ResidualModel::Pinhole),
            ResidualModelType::UnitSphere => {
                let norm = observation.norm();
                if !norm.is_finite() || norm < f64::EPSILON {
                    return Err(ApexVioError::InvalidInput(format!(
                        "unit-sphere residual needs a non-zero observed ray, got [{}, {}, {}]",
                        observation.x, observation.y, observation.z
                    )));
                }
                let unit_observation = observation / norm;
                Ok(ResidualModel::UnitSphere {
                    unit_observation,
                    tangent_base: tangent_basis(&unit_observation),
                })
            }
        }
    }

    pub fn model_type(&self) -> ResidualModelType {
        match self {
            ResidualModel::Pinhole => ResidualModelType::Pinhole,
            ResidualModel::UnitSphere { .. } => ResidualModelType::UnitSphere,
        }
    }

    /// Unwhitened residual of the predicted point against the observed ray.
    #[inline]
    pub fn residual(&self, point: &Vector3<f64>, observation: &Vector3<f64>) -> Vector2<f64> {
        match self {
            ResidualModel::Pinhole => {
                let depth = point.z;
                Vector2::new(point.x / depth - observation.x, point.y / depth - observation.y)
            }
            ResidualModel::UnitSphere {
                unit_observation,
                tangent_base,
            } => tangent_base * (point / point.norm() - unit_observation),
        }
    }

    /// Derivative of the unwhitened residual with respect to the predicted point.
    #[inline]
    pub fn reduction(&self, point: &Vector3<f64>) -> Matrix2x3<f64> {
        match self {
            ResidualModel::Pinhole => {
                let z_inv = 1.0 / point.z;
                let z_inv_sq = z_inv * z_inv;
                Matrix2x3::new(
                    z_inv,
                    0.0,
                    -point.x * z_inv_sq,
                    0.0,
                    z_inv,
                    -point.y * z_inv_sq,
                )
            }
            ResidualModel::UnitSphere { tangent_base, .. } => {
                let norm = point.norm();
                let norm_cubed = norm * norm * norm;
                let normalize_jacobian =
                    Matrix3::identity() / norm - point * point.transpose() / norm_cubed;
                tangent_base * normalize_jacobian
            }
        }
    }
}

/// Orthonormal basis of the plane perpendicular to a unit vector `a`.
///
/// Gram-Schmidt of the reference axis `(0, 0, 1)` against `a`; the reference
/// switches to `(1, 0, 0)` when `a` is parallel to it.
pub fn tangent_basis(a: &Vector3<f64>) -> Matrix2x3<f64> {
    let mut reference = Vector3::z();
    let mut projected = reference - a * a.dot(&reference);
    if projected.norm() < 1e-6 {
        reference = Vector3::x();
        projected = reference - a * a.dot(&reference);
    }
    let b1 = projected.normalize();
    let b2 = a.cross(&b1);

    let mut basis = Matrix2x3::zeros();
    basis.row_mut(0).copy_from(&b1.transpose());
    basis.row_mut(1).copy_from(&b2.transpose());
    basis
}
