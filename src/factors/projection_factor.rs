//! Two-frame reprojection factor with a rotating camera mount.
//!
//! A landmark parameterized by its inverse depth `ρ` in frame `i` is observed as
//! the ray `pts_i` in frame `i` and `pts_j` in frame `j`. The camera is attached to
//! the body through the extrinsic `(t_ie, q_ie)` and, when the mount rotates, an
//! extra rotation `A_k = Rodrigues(axis, angle_k)` read from the encoder.
//!
//! # Transform chain
//!
//! ```text
//! ric_k      = A_k · R(q_ie)
//! tic_k      = t_ie + A_k · lever_arm
//!
//! p_cam_i    = pts_i / ρ
//! p_imu_i    = ric_i · p_cam_i + tic_i
//! p_w        = R_i · p_imu_i + P_i
//! p_imu_j    = R_jᵀ · (p_w - P_j)
//! p_cam_j    = ric_jᵀ · (p_imu_j - tic_j)
//! ```
//!
//! For a static mount `A_i = A_j = I` and both frames share `tic = t_ie + lever_arm`.
//!
//! # Jacobians
//!
//! With `D = sqrt_info · ∂r/∂p_cam_j` (see [`ResidualModel::reduction`]) and right
//! perturbations `P ← P + δp`, `R ← R · Exp(δθ)`:
//!
//! ```text
//! ∂p_cam_j/∂[δP_i, δθ_i]  = [ ric_jᵀ R_jᵀ ,  -ric_jᵀ R_jᵀ R_i [p_imu_i]× ]
//! ∂p_cam_j/∂[δP_j, δθ_j]  = [ -ric_jᵀ R_jᵀ ,  ric_jᵀ [p_imu_j]× ]
//! ∂p_cam_j/∂[δt_ie, δθ_ie] = [ ric_jᵀ (R_jᵀ R_i - I) ,
//!                              -T [p_cam_i]× + [T p_cam_i]× + [ric_jᵀ (R_jᵀ (R_i tic_i + P_i - P_j) - tic_j)]× ]
//! ∂p_cam_j/∂ρ              = -T · pts_i / ρ²
//!
//! T = ric_jᵀ R_jᵀ R_i ric_i
//! ```
//!
//! Every pose-like block is 2×7; the seventh column stays zero because the
//! quaternion only has three degrees of freedom.

use std::sync::Arc;
use std::time::Instant;

use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Matrix3x6, SMatrix, Vector2, Vector3};
use tracing::{debug, trace, warn};

use crate::calibration::{DepthPolicy, MountCalibration, ProjectionConfig};
use crate::diagnostics::EvaluationStats;
use crate::error::{ApexVioError, ApexVioResult};
use crate::factors::residual_model::ResidualModel;
use crate::factors::{Factor, JacobianRequest};
use crate::manifold::PoseBlock;
use crate::manifold::so3::skew_symmetric;

/// Jacobian of the residual with respect to a 7-wide pose block.
pub type PoseJacobian = SMatrix<f64, 2, 7>;

/// Motion of the camera mount between the two observing frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MountMotion {
    /// Camera rigidly attached to the body
    #[default]
    Static,
    /// Camera on a rotating mount, with the encoder angle of each frame
    Rotating { angle_i: f64, angle_j: f64 },
}

impl MountMotion {
    /// Encoder angles of the two frames; zero for a static mount.
    pub fn angles(&self) -> (f64, f64) {
        match *self {
            MountMotion::Static => (0.0, 0.0),
            MountMotion::Rotating { angle_i, angle_j } => (angle_i, angle_j),
        }
    }

    pub fn is_rotating(&self) -> bool {
        matches!(self, MountMotion::Rotating { .. })
    }
}

/// Current values of the four parameter blocks touched by a projection factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParameters {
    /// Body pose of the first observing frame
    pub pose_i: PoseBlock,
    /// Body pose of the second observing frame
    pub pose_j: PoseBlock,
    /// Pivot-to-camera (rotating) or IMU-to-camera (static) transform
    pub extrinsic: PoseBlock,
    /// Inverse depth of the landmark in frame `i`
    pub inverse_depth: f64,
}

impl ProjectionParameters {
    /// Parse raw blocks of sizes `[7, 7, 7, 1]`.
    pub fn from_blocks(blocks: &[&[f64]]) -> ApexVioResult<Self> {
        if blocks.len() != ProjectionFactor::PARAMETER_BLOCK_SIZES.len() {
            return Err(ApexVioError::InvalidInput(format!(
                "projection factor expects {} parameter blocks, got {}",
                ProjectionFactor::PARAMETER_BLOCK_SIZES.len(),
                blocks.len()
            )));
        }
        let inverse_depth = match blocks[3] {
            [rho] => *rho,
            other => {
                return Err(ApexVioError::InvalidInput(format!(
                    "inverse depth block must have 1 value, got {}",
                    other.len()
                )));
            }
        };
        Ok(Self {
            pose_i: PoseBlock::from_slice(blocks[0])?,
            pose_j: PoseBlock::from_slice(blocks[1])?,
            extrinsic: PoseBlock::from_slice(blocks[2])?,
            inverse_depth,
        })
    }
}

/// Requested Jacobian blocks; `None` when not requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionJacobians {
    pub pose_i: Option<PoseJacobian>,
    pub pose_j: Option<PoseJacobian>,
    pub extrinsic: Option<PoseJacobian>,
    pub inverse_depth: Option<Vector2<f64>>,
}

/// Whitened residual and requested Jacobians of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionEvaluation {
    pub residual: Vector2<f64>,
    pub jacobians: ProjectionJacobians,
}

/// Reprojection factor between two frames observing the same landmark.
///
/// # Example
///
/// ```
/// use apex_vio::calibration::ProjectionConfig;
/// use apex_vio::factors::JacobianRequest;
/// use apex_vio::factors::projection_factor::{ProjectionFactor, ProjectionParameters};
/// use apex_vio::manifold::PoseBlock;
/// use nalgebra::Vector3;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ProjectionConfig::default();
/// let ray = Vector3::new(0.0, 0.0, 1.0);
/// let factor = ProjectionFactor::new(ray, ray, &config)?;
///
/// let params = ProjectionParameters {
///     pose_i: PoseBlock::identity(),
///     pose_j: PoseBlock::identity(),
///     extrinsic: PoseBlock::identity(),
///     inverse_depth: 1.0,
/// };
/// let evaluation = factor.evaluate(&params, JacobianRequest::all())?;
/// assert!(evaluation.residual.norm() < 1e-12);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProjectionFactor {
    pts_i: Vector3<f64>,
    pts_j: Vector3<f64>,
    motion: MountMotion,
    model: ResidualModel,
    sqrt_info: Matrix2<f64>,
    depth_policy: DepthPolicy,
    /// `A_i`, `A_j`: mount rotations at the two encoder angles
    mount_rotation_i: Matrix3<f64>,
    mount_rotation_j: Matrix3<f64>,
    /// `A_i · lever_arm`, `A_j · lever_arm`
    lever_offset_i: Vector3<f64>,
    lever_offset_j: Vector3<f64>,
    stats: Arc<EvaluationStats>,
}

impl ProjectionFactor {
    /// Sizes of the pose_i, pose_j, extrinsic and inverse depth blocks.
    pub const PARAMETER_BLOCK_SIZES: [usize; 4] = [7, 7, 7, 1];

    /// Residual dimension
    pub const RESIDUAL_DIM: usize = 2;

    /// Total columns of the dense Jacobian produced by [`Factor::linearize`].
    pub const JACOBIAN_COLS: usize = 22;

    /// Factor for a camera rigidly attached to the body.
    pub fn new(
        pts_i: Vector3<f64>,
        pts_j: Vector3<f64>,
        config: &ProjectionConfig,
    ) -> ApexVioResult<Self> {
        Self::with_motion(pts_i, pts_j, MountMotion::Static, config)
    }

    /// Factor for a camera on a rotating mount, with the encoder angles of both frames.
    pub fn new_rotating(
        pts_i: Vector3<f64>,
        pts_j: Vector3<f64>,
        angle_i: f64,
        angle_j: f64,
        config: &ProjectionConfig,
    ) -> ApexVioResult<Self> {
        Self::with_motion(
            pts_i,
            pts_j,
            MountMotion::Rotating { angle_i, angle_j },
            config,
        )
    }

    pub fn with_motion(
        pts_i: Vector3<f64>,
        pts_j: Vector3<f64>,
        motion: MountMotion,
        config: &ProjectionConfig,
    ) -> ApexVioResult<Self> {
        if !pts_i.iter().chain(pts_j.iter()).all(|v| v.is_finite()) {
            return Err(ApexVioError::InvalidInput(
                "observed rays must be finite".to_string(),
            ));
        }
        let (angle_i, angle_j) = motion.angles();
        if !angle_i.is_finite() || !angle_j.is_finite() {
            return Err(ApexVioError::InvalidInput(format!(
                "encoder angles must be finite, got ({angle_i}, {angle_j})"
            )));
        }
        let model = ResidualModel::new(config.residual_model, &pts_j)?;
        let calibration: &MountCalibration = &config.calibration;

        debug!(
            "projection factor: model {:?}, motion {:?}",
            model.model_type(),
            motion
        );

        Ok(Self {
            pts_i,
            pts_j,
            motion,
            model,
            sqrt_info: config.sqrt_info,
            depth_policy: config.depth_policy,
            mount_rotation_i: calibration.mount_rotation(angle_i),
            mount_rotation_j: calibration.mount_rotation(angle_j),
            lever_offset_i: calibration.lever_offset(angle_i),
            lever_offset_j: calibration.lever_offset(angle_j),
            stats: Arc::clone(&config.stats),
        })
    }

    pub fn pts_i(&self) -> &Vector3<f64> {
        &self.pts_i
    }

    pub fn pts_j(&self) -> &Vector3<f64> {
        &self.pts_j
    }

    pub fn motion(&self) -> MountMotion {
        self.motion
    }

    pub fn residual_model(&self) -> &ResidualModel {
        &self.model
    }

    pub fn sqrt_info(&self) -> &Matrix2<f64> {
        &self.sqrt_info
    }

    pub fn stats(&self) -> &Arc<EvaluationStats> {
        &self.stats
    }

    /// Parse raw parameter blocks and evaluate.
    pub fn evaluate_blocks(
        &self,
        blocks: &[&[f64]],
        request: JacobianRequest,
    ) -> ApexVioResult<ProjectionEvaluation> {
        let params = ProjectionParameters::from_blocks(blocks)?;
        self.evaluate(&params, request)
    }

    /// Compute the whitened residual and the requested Jacobian blocks.
    ///
    /// Always succeeds under [`DepthPolicy::Propagate`]; degenerate depth then
    /// shows up as non-finite values.
    pub fn evaluate(
        &self,
        params: &ProjectionParameters,
        request: JacobianRequest,
    ) -> ApexVioResult<ProjectionEvaluation> {
        let start = Instant::now();
        let result = self.evaluate_internal(params, request);
        let elapsed = start.elapsed();
        self.stats.record(elapsed);
        trace!("projection factor evaluated in {:?}", elapsed);
        result
    }

    fn evaluate_internal(
        &self,
        params: &ProjectionParameters,
        request: JacobianRequest,
    ) -> ApexVioResult<ProjectionEvaluation> {
        let ProjectionParameters {
            pose_i,
            pose_j,
            extrinsic,
            inverse_depth,
        } = params;
        let inv_dep_i = *inverse_depth;

        if self.depth_policy == DepthPolicy::Reject && inv_dep_i.abs() < f64::EPSILON {
            warn!("rejecting evaluation: inverse depth {inv_dep_i}");
            return Err(ApexVioError::DegenerateDepth(format!(
                "inverse depth {inv_dep_i} is zero"
            )));
        }

        let r_i = pose_i.rotation_matrix();
        let r_j = pose_j.rotation_matrix();
        let r_ie = extrinsic.rotation_matrix();
        let ric_i = self.mount_rotation_i * r_ie;
        let ric_j = self.mount_rotation_j * r_ie;
        let tic_i = extrinsic.translation + self.lever_offset_i;
        let tic_j = extrinsic.translation + self.lever_offset_j;

        let pts_camera_i = self.pts_i / inv_dep_i;
        let pts_imu_i = ric_i * pts_camera_i + tic_i;
        let pts_w = r_i * pts_imu_i + pose_i.translation;
        let pts_imu_j = r_j.transpose() * (pts_w - pose_j.translation);
        let pts_camera_j = ric_j.transpose() * (pts_imu_j - tic_j);

        if self.depth_policy == DepthPolicy::Reject {
            self.check_depth(&pts_camera_j)?;
        }

        let residual = self.sqrt_info * self.model.residual(&pts_camera_j, &self.pts_j);

        if self.depth_policy == DepthPolicy::Reject && !residual.iter().all(|v| v.is_finite()) {
            warn!("rejecting evaluation: non-finite residual {:?}", residual);
            return Err(ApexVioError::DegenerateDepth(
                "residual is not finite".to_string(),
            ));
        }

        let mut jacobians = ProjectionJacobians::default();
        if !request.any() {
            return Ok(ProjectionEvaluation {
                residual,
                jacobians,
            });
        }

        let reduce = self.sqrt_info * self.model.reduction(&pts_camera_j);
        // Rotation taking world-aligned body-j vectors into camera j
        let r_cj_bj = ric_j.transpose();
        let r_cj_w = r_cj_bj * r_j.transpose();
        // Rotation taking camera i vectors into camera j
        let r_cj_ci = r_cj_w * r_i * ric_i;

        if request.pose_i {
            let jaco_i = stack(&r_cj_w, &(r_cj_w * r_i * -skew_symmetric(&pts_imu_i)));
            jacobians.pose_i = Some(pose_jacobian(&reduce, &jaco_i));
        }

        if request.pose_j {
            let jaco_j = stack(&-r_cj_w, &(r_cj_bj * skew_symmetric(&pts_imu_j)));
            jacobians.pose_j = Some(pose_jacobian(&reduce, &jaco_j));
        }

        if request.extrinsic {
            let translation = r_cj_bj * (r_j.transpose() * r_i - Matrix3::identity());
            let lever = r_cj_bj
                * (r_j.transpose() * (r_i * tic_i + pose_i.translation - pose_j.translation)
                    - tic_j);
            let rotation = -r_cj_ci * skew_symmetric(&pts_camera_i)
                + skew_symmetric(&(r_cj_ci * pts_camera_i))
                + skew_symmetric(&lever);
            jacobians.extrinsic = Some(pose_jacobian(&reduce, &stack(&translation, &rotation)));
        }

        if request.inverse_depth {
            jacobians.inverse_depth =
                Some(reduce * r_cj_ci * self.pts_i * (-1.0 / (inv_dep_i * inv_dep_i)));
        }

        Ok(ProjectionEvaluation {
            residual,
            jacobians,
        })
    }

    fn check_depth(&self, pts_camera_j: &Vector3<f64>) -> ApexVioResult<()> {
        let degenerate = match self.model {
            ResidualModel::Pinhole => pts_camera_j.z.abs() < f64::EPSILON,
            ResidualModel::UnitSphere { .. } => pts_camera_j.norm() < f64::EPSILON,
        };
        if degenerate {
            warn!(
                "rejecting evaluation: landmark at zero depth in frame j ({}, {}, {})",
                pts_camera_j.x, pts_camera_j.y, pts_camera_j.z
            );
            return Err(ApexVioError::DegenerateDepth(format!(
                "landmark depth in frame j is {}",
                pts_camera_j.z
            )));
        }
        Ok(())
    }
}

/// `[translation | rotation]` as a 3×6 block.
#[inline]
fn stack(translation: &Matrix3<f64>, rotation: &Matrix3<f64>) -> Matrix3x6<f64> {
    let mut jaco = Matrix3x6::zeros();
    jaco.fixed_view_mut::<3, 3>(0, 0).copy_from(translation);
    jaco.fixed_view_mut::<3, 3>(0, 3).copy_from(rotation);
    jaco
}

/// Chain the reduction through a 3×6 point Jacobian, leaving column 7 zero.
#[inline]
fn pose_jacobian(reduce: &SMatrix<f64, 2, 3>, jaco: &Matrix3x6<f64>) -> PoseJacobian {
    let mut jacobian = PoseJacobian::zeros();
    jacobian
        .fixed_view_mut::<2, 6>(0, 0)
        .copy_from(&(reduce * jaco));
    jacobian
}

impl Factor for ProjectionFactor {
    /// Dense residual and `2 × 22` Jacobian `[pose_i | pose_j | extrinsic | ρ]`.
    ///
    /// Malformed parameter layouts yield a NaN residual.
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> (DVector<f64>, Option<DMatrix<f64>>) {
        let blocks: Vec<&[f64]> = params.iter().map(|p| p.as_slice()).collect();
        let request = if compute_jacobian {
            JacobianRequest::all()
        } else {
            JacobianRequest::none()
        };

        let evaluation = match self.evaluate_blocks(&blocks, request) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!("projection factor linearization failed: {err}");
                let residual = DVector::from_element(Self::RESIDUAL_DIM, f64::NAN);
                let jacobian = compute_jacobian.then(|| {
                    DMatrix::from_element(Self::RESIDUAL_DIM, Self::JACOBIAN_COLS, f64::NAN)
                });
                return (residual, jacobian);
            }
        };

        let residual = DVector::from_column_slice(evaluation.residual.as_slice());
        let jacobian = compute_jacobian.then(|| {
            let mut jacobian = DMatrix::zeros(Self::RESIDUAL_DIM, Self::JACOBIAN_COLS);
            let jacs = &evaluation.jacobians;
            let blocks = [&jacs.pose_i, &jacs.pose_j, &jacs.extrinsic];
            for (index, block) in blocks.into_iter().enumerate() {
                if let Some(block) = block {
                    jacobian
                        .fixed_view_mut::<2, 7>(0, index * PoseBlock::SIZE)
                        .copy_from(block);
                }
            }
            if let Some(column) = &jacs.inverse_depth {
                jacobian
                    .fixed_view_mut::<2, 1>(0, 3 * PoseBlock::SIZE)
                    .copy_from(column);
            }
            jacobian
        });
        (residual, jacobian)
    }

    fn get_dimension(&self) -> usize {
        Self::RESIDUAL_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ResidualModelType;
    use nalgebra::UnitQuaternion;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-10;

    fn identity_params(inverse_depth: f64) -> ProjectionParameters {
        ProjectionParameters {
            pose_i: PoseBlock::identity(),
            pose_j: PoseBlock::identity(),
            extrinsic: PoseBlock::identity(),
            inverse_depth,
        }
    }

    #[test]
    fn test_identity_scenario_zero_residual() -> TestResult {
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &ProjectionConfig::default())?;
        let evaluation = factor.evaluate(&identity_params(1.0), JacobianRequest::all())?;

        assert!(evaluation.residual.norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_pinhole_residual_value() -> TestResult {
        // Landmark at (0.2, 0.1, 2) seen from the same frame, observed at (0, 0)
        let config = ProjectionConfig::default().with_sqrt_info(Matrix2::identity());
        let factor =
            ProjectionFactor::new(Vector3::new(0.1, 0.05, 1.0), Vector3::new(0.0, 0.0, 1.0), &config)?;
        let evaluation = factor.evaluate(&identity_params(0.5), JacobianRequest::none())?;

        assert!((evaluation.residual - Vector2::new(0.1, 0.05)).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_translation_shifts_projection() -> TestResult {
        let config = ProjectionConfig::default().with_sqrt_info(Matrix2::identity());
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &config)?;
        let mut params = identity_params(0.5);
        params.pose_j = PoseBlock::new(Vector3::new(0.2, 0.0, 0.0), UnitQuaternion::identity());

        let evaluation = factor.evaluate(&params, JacobianRequest::none())?;
        // Landmark at depth 2, camera j shifted 0.2 along x: x/z = -0.1
        assert!((evaluation.residual - Vector2::new(-0.1, 0.0)).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_omitted_blocks_are_not_computed() -> TestResult {
        let ray = Vector3::new(0.1, 0.2, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &ProjectionConfig::default())?;
        let request = JacobianRequest::none().with_pose_j().with_inverse_depth();
        let evaluation = factor.evaluate(&identity_params(0.4), request)?;

        assert!(evaluation.jacobians.pose_i.is_none());
        assert!(evaluation.jacobians.pose_j.is_some());
        assert!(evaluation.jacobians.extrinsic.is_none());
        assert!(evaluation.jacobians.inverse_depth.is_some());
        Ok(())
    }

    #[test]
    fn test_seventh_column_is_zero() -> TestResult {
        let config = ProjectionConfig::default();
        let factor = ProjectionFactor::new_rotating(
            Vector3::new(0.1, -0.2, 1.0),
            Vector3::new(0.05, -0.1, 1.0),
            0.3,
            -0.4,
            &config,
        )?;
        let mut params = identity_params(0.3);
        params.pose_j = PoseBlock::new(
            Vector3::new(0.3, 0.1, -0.1),
            UnitQuaternion::from_euler_angles(0.05, 0.1, -0.2),
        );
        let evaluation = factor.evaluate(&params, JacobianRequest::all())?;
        let jacs = evaluation.jacobians;
        for block in [jacs.pose_i, jacs.pose_j, jacs.extrinsic] {
            let block = block.ok_or("requested block missing")?;
            assert_eq!(block.column(6).norm(), 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_rejects_zero_inverse_depth() -> TestResult {
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let config = ProjectionConfig::default().with_depth_policy(DepthPolicy::Reject);
        let factor = ProjectionFactor::new(ray, ray, &config)?;

        let result = factor.evaluate(&identity_params(0.0), JacobianRequest::all());
        assert!(matches!(result, Err(ApexVioError::DegenerateDepth(_))));
        Ok(())
    }

    #[test]
    fn test_rejects_zero_depth_in_frame_j() -> TestResult {
        // Landmark on the x axis of frame j: z = 0
        let config = ProjectionConfig::default().with_depth_policy(DepthPolicy::Reject);
        let factor = ProjectionFactor::new(
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, 1.0),
            &config,
        )?;
        let mut params = identity_params(1.0);
        params.pose_j = PoseBlock::new(Vector3::new(-1.0, 0.0, 1.0), UnitQuaternion::identity());

        let result = factor.evaluate(&params, JacobianRequest::none());
        assert!(matches!(result, Err(ApexVioError::DegenerateDepth(_))));
        Ok(())
    }

    #[test]
    fn test_propagates_zero_inverse_depth() -> TestResult {
        let ray = Vector3::new(0.1, 0.0, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &ProjectionConfig::default())?;

        let evaluation = factor.evaluate(&identity_params(0.0), JacobianRequest::all())?;
        assert!(evaluation.residual.iter().any(|v| !v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_unit_sphere_rejects_zero_observation() {
        let config = ProjectionConfig::default().with_residual_model(ResidualModelType::UnitSphere);
        let result = ProjectionFactor::new(Vector3::new(0.0, 0.0, 1.0), Vector3::zeros(), &config);
        assert!(matches!(result, Err(ApexVioError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_non_finite_angles() {
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let result =
            ProjectionFactor::new_rotating(ray, ray, f64::NAN, 0.0, &ProjectionConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_blocks_validates_layout() {
        let pose = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let ok = ProjectionParameters::from_blocks(&[&pose, &pose, &pose, &[1.0]]);
        assert!(ok.is_ok());

        let missing = ProjectionParameters::from_blocks(&[&pose, &pose, &pose]);
        assert!(matches!(missing, Err(ApexVioError::InvalidInput(_))));

        let wide_depth = ProjectionParameters::from_blocks(&[&pose, &pose, &pose, &[1.0, 2.0]]);
        assert!(matches!(wide_depth, Err(ApexVioError::InvalidInput(_))));
    }

    #[test]
    fn test_linearize_layout() -> TestResult {
        let ray = Vector3::new(0.05, 0.02, 1.0);
        let factor = ProjectionFactor::new(ray, Vector3::new(0.0, 0.0, 1.0), &ProjectionConfig::default())?;
        let params = identity_params(0.5);
        let dense: Vec<DVector<f64>> = vec![
            params.pose_i.into(),
            params.pose_j.into(),
            params.extrinsic.into(),
            DVector::from_element(1, params.inverse_depth),
        ];

        let (residual, jacobian) = factor.linearize(&dense, true);
        let jacobian = jacobian.ok_or("Jacobian should be Some when compute_jacobian=true")?;
        assert_eq!(factor.get_dimension(), 2);
        assert_eq!(residual.len(), 2);
        assert_eq!(jacobian.nrows(), 2);
        assert_eq!(jacobian.ncols(), ProjectionFactor::JACOBIAN_COLS);

        let evaluation = factor.evaluate(&params, JacobianRequest::all())?;
        let pose_i = evaluation.jacobians.pose_i.ok_or("pose_i missing")?;
        let inverse_depth = evaluation.jacobians.inverse_depth.ok_or("inverse depth missing")?;
        assert!((jacobian.fixed_view::<2, 7>(0, 0) - pose_i).norm() < TOLERANCE);
        assert!((jacobian.fixed_view::<2, 1>(0, 21) - inverse_depth).norm() < TOLERANCE);
        assert!((residual[0] - evaluation.residual[0]).abs() < TOLERANCE);

        let (_, no_jacobian) = factor.linearize(&dense, false);
        assert!(no_jacobian.is_none());
        Ok(())
    }

    #[test]
    fn test_linearize_bad_layout_is_nan() -> TestResult {
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &ProjectionConfig::default())?;
        let (residual, jacobian) = factor.linearize(&[DVector::zeros(7)], true);

        assert!(residual.iter().all(|v| v.is_nan()));
        let jacobian = jacobian.ok_or("Jacobian should be Some when compute_jacobian=true")?;
        assert_eq!(jacobian.ncols(), ProjectionFactor::JACOBIAN_COLS);
        Ok(())
    }

    #[test]
    fn test_evaluation_is_recorded() -> TestResult {
        let config = ProjectionConfig::default();
        let ray = Vector3::new(0.0, 0.0, 1.0);
        let factor = ProjectionFactor::new(ray, ray, &config)?;
        for _ in 0..3 {
            factor.evaluate(&identity_params(1.0), JacobianRequest::none())?;
        }
        assert_eq!(config.stats.evaluations(), 3);
        Ok(())
    }
}
