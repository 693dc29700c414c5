//! Mount calibration and projection factor configuration.
//!
//! The camera may sit on a motorized mount that rotates about a fixed axis.
//! At a frame with encoder angle `θ`, the camera offset from the IMU is
//!
//! ```text
//! t_ic(θ) = t_ie + Rodrigues(axis, θ) · lever_arm
//! ```
//!
//! where `t_ie` is the (optimized) pivot translation and `lever_arm` the fixed
//! pivot-to-camera offset.

use std::sync::Arc;

use nalgebra::{Matrix2, Matrix3, Unit, Vector3};

use crate::diagnostics::EvaluationStats;
use crate::error::{ApexVioError, ApexVioResult};
use crate::manifold::so3::rodrigues_rotation;

/// Focal length used to scale normalized-plane residuals into pixel-like units.
pub const FOCAL_LENGTH: f64 = 460.0;

/// Fixed geometry of the rotating mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountCalibration {
    axis: Unit<Vector3<f64>>,
    lever_arm: Vector3<f64>,
}

impl MountCalibration {
    /// Create a calibration from a rotation axis (normalized here) and lever arm.
    pub fn new(axis: Vector3<f64>, lever_arm: Vector3<f64>) -> ApexVioResult<Self> {
        let norm = axis.norm();
        if !norm.is_finite() || norm < f64::EPSILON {
            return Err(ApexVioError::Calibration(format!(
                "rotation axis must be finite and non-zero, got [{}, {}, {}]",
                axis.x, axis.y, axis.z
            )));
        }
        if !lever_arm.iter().all(|v| v.is_finite()) {
            return Err(ApexVioError::Calibration(
                "lever arm must be finite".to_string(),
            ));
        }
        Ok(Self {
            axis: Unit::new_normalize(axis),
            lever_arm,
        })
    }

    #[inline]
    pub fn axis(&self) -> &Unit<Vector3<f64>> {
        &self.axis
    }

    #[inline]
    pub fn lever_arm(&self) -> &Vector3<f64> {
        &self.lever_arm
    }

    /// Mount rotation for an encoder angle.
    #[inline]
    pub fn mount_rotation(&self, angle: f64) -> Matrix3<f64> {
        rodrigues_rotation(&self.axis, angle)
    }

    /// Lever arm rotated to an encoder angle: `Rodrigues(axis, angle) · lever_arm`.
    #[inline]
    pub fn lever_offset(&self, angle: f64) -> Vector3<f64> {
        self.mount_rotation(angle) * self.lever_arm
    }
}

impl Default for MountCalibration {
    fn default() -> Self {
        Self {
            axis: Vector3::z_axis(),
            lever_arm: Vector3::zeros(),
        }
    }
}

/// Residual formulation used by the projection factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualModelType {
    /// Normalized image plane: `x/z - u`
    #[default]
    Pinhole,
    /// Tangent plane of the unit sphere at the observed ray
    UnitSphere,
}

/// What evaluation does when the landmark depth degenerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthPolicy {
    /// Let inf/NaN flow through to the optimizer and report success
    #[default]
    Propagate,
    /// Fail the evaluation with `ApexVioError::DegenerateDepth`
    Reject,
}

/// Configuration shared by all projection factors of one optimization problem.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Residual formulation
    pub residual_model: ResidualModelType,
    /// Whitening matrix applied to every residual and Jacobian
    pub sqrt_info: Matrix2<f64>,
    /// Rotating mount geometry
    pub calibration: MountCalibration,
    /// Handling of zero depth / zero inverse depth
    pub depth_policy: DepthPolicy,
    /// Timing accumulator shared by every factor built from this configuration
    pub stats: Arc<EvaluationStats>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            residual_model: ResidualModelType::default(),
            sqrt_info: Self::default_sqrt_info(),
            calibration: MountCalibration::default(),
            depth_policy: DepthPolicy::default(),
            stats: Arc::new(EvaluationStats::new()),
        }
    }
}

impl ProjectionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// `FOCAL_LENGTH / 1.5 · I`: one-and-a-half pixel standard deviation.
    pub fn default_sqrt_info() -> Matrix2<f64> {
        Matrix2::identity() * (FOCAL_LENGTH / 1.5)
    }

    /// Set the residual formulation
    pub fn with_residual_model(mut self, residual_model: ResidualModelType) -> Self {
        self.residual_model = residual_model;
        self
    }

    /// Set the whitening matrix
    pub fn with_sqrt_info(mut self, sqrt_info: Matrix2<f64>) -> Self {
        self.sqrt_info = sqrt_info;
        self
    }

    /// Set the mount calibration
    pub fn with_calibration(mut self, calibration: MountCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Set the degenerate depth policy
    pub fn with_depth_policy(mut self, depth_policy: DepthPolicy) -> Self {
        self.depth_policy = depth_policy;
        self
    }

    /// Share an existing timing accumulator
    pub fn with_stats(mut self, stats: Arc<EvaluationStats>) -> Self {
        self.stats = stats;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_calibration_normalizes_axis() -> Result<(), Box<dyn std::error::Error>> {
        let calib = MountCalibration::new(Vector3::new(0.0, 3.0, 4.0), Vector3::zeros())?;
        assert!((calib.axis().norm() - 1.0).abs() < TOLERANCE);
        assert!((calib.axis().as_ref() - Vector3::new(0.0, 0.6, 0.8)).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_calibration_rejects_zero_axis() {
        let result = MountCalibration::new(Vector3::zeros(), Vector3::new(0.1, 0.0, 0.0));
        assert!(matches!(result, Err(ApexVioError::Calibration(_))));
    }

    #[test]
    fn test_calibration_rejects_nan_lever_arm() {
        let result = MountCalibration::new(Vector3::z(), Vector3::new(f64::NAN, 0.0, 0.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_lever_offset_half_turn() -> Result<(), Box<dyn std::error::Error>> {
        let calib = MountCalibration::new(Vector3::z(), Vector3::new(0.05, 0.0, 0.02))?;
        assert!((calib.lever_offset(0.0) - Vector3::new(0.05, 0.0, 0.02)).norm() < TOLERANCE);
        assert!((calib.lever_offset(PI) - Vector3::new(-0.05, 0.0, 0.02)).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_config_builder() {
        let stats = Arc::new(EvaluationStats::new());
        let config = ProjectionConfig::new()
            .with_residual_model(ResidualModelType::UnitSphere)
            .with_sqrt_info(Matrix2::identity() * 2.0)
            .with_depth_policy(DepthPolicy::Reject)
            .with_stats(Arc::clone(&stats));

        assert_eq!(config.residual_model, ResidualModelType::UnitSphere);
        assert_eq!(config.sqrt_info, Matrix2::identity() * 2.0);
        assert_eq!(config.depth_policy, DepthPolicy::Reject);
        assert!(Arc::ptr_eq(&config.stats, &stats));
    }

    #[test]
    fn test_default_config() {
        let config = ProjectionConfig::default();
        assert_eq!(config.residual_model, ResidualModelType::Pinhole);
        assert_eq!(config.depth_policy, DepthPolicy::Propagate);
        assert!((config.sqrt_info[(0, 0)] - FOCAL_LENGTH / 1.5).abs() < TOLERANCE);
        assert_eq!(config.sqrt_info[(0, 1)], 0.0);
        assert_eq!(config.calibration, MountCalibration::default());
    }
}
