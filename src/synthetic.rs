//! Synthetic two-frame observations for testing and benchmarking.
//!
//! A scene draws a mount calibration, two nearby body poses, an extrinsic and a
//! landmark in front of camera `i`, then projects the landmark into camera `j`
//! through rigid transforms built from `PoseBlock`s. The projection does not
//! share code with the factor, so it serves as an independent reference.

use nalgebra::{UnitQuaternion, Vector3, Vector6};
use rand::Rng;

use crate::calibration::{MountCalibration, ProjectionConfig};
use crate::error::ApexVioResult;
use crate::factors::projection_factor::{MountMotion, ProjectionFactor, ProjectionParameters};
use crate::manifold::PoseBlock;

/// One landmark observed from two frames, with exact observations.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub calibration: MountCalibration,
    pub motion: MountMotion,
    pub params: ProjectionParameters,
    /// Landmark on the normalized plane of camera i (`z = 1`)
    pub pts_i: Vector3<f64>,
    /// Landmark on the normalized plane of camera j (`z = 1`)
    pub pts_j: Vector3<f64>,
}

fn uniform_vector<R: Rng + ?Sized>(rng: &mut R, half_range: f64) -> Vector3<f64> {
    Vector3::new(
        rng.gen_range(-half_range..half_range),
        rng.gen_range(-half_range..half_range),
        rng.gen_range(-half_range..half_range),
    )
}

fn random_rotation<R: Rng + ?Sized>(rng: &mut R, half_range: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(uniform_vector(rng, half_range))
}

impl SyntheticScene {
    /// Draw a random, well-conditioned scene.
    ///
    /// Depth in camera i is 2–6 m; the second frame moves by at most 0.3 m and
    /// 0.15 rad per axis so the landmark stays in front of camera j.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, rotating: bool) -> ApexVioResult<Self> {
        let calibration = MountCalibration::new(
            uniform_vector(rng, 1.0) + Vector3::new(0.0, 0.0, 1.5),
            uniform_vector(rng, 0.1),
        )?;
        let motion = if rotating {
            let angle_i = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
            MountMotion::Rotating {
                angle_i,
                angle_j: angle_i + rng.gen_range(-0.2..0.2),
            }
        } else {
            MountMotion::Static
        };

        let pose_i = PoseBlock::new(uniform_vector(rng, 2.0), random_rotation(rng, 1.0));
        let step = Vector6::new(
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.15..0.15),
            rng.gen_range(-0.15..0.15),
            rng.gen_range(-0.15..0.15),
        );
        let pose_j = pose_i.plus(&step);
        let extrinsic = PoseBlock::new(uniform_vector(rng, 0.1), random_rotation(rng, 0.2));

        let depth = rng.gen_range(2.0..6.0);
        let point_camera_i = Vector3::new(
            rng.gen_range(-0.4..0.4) * depth,
            rng.gen_range(-0.4..0.4) * depth,
            depth,
        );

        let params = ProjectionParameters {
            pose_i,
            pose_j,
            extrinsic,
            inverse_depth: 1.0 / depth,
        };
        let point_camera_j = project(&calibration, motion, &params, &point_camera_i);

        Ok(Self {
            calibration,
            motion,
            params,
            pts_i: point_camera_i / depth,
            pts_j: point_camera_j / point_camera_j.z,
        })
    }

    /// Shift the observation in frame j by `offset` on the normalized plane.
    pub fn with_observation_offset(mut self, offset_x: f64, offset_y: f64) -> Self {
        self.pts_j.x += offset_x;
        self.pts_j.y += offset_y;
        self
    }

    /// Copy of `base` using this scene's mount calibration.
    pub fn config(&self, base: &ProjectionConfig) -> ProjectionConfig {
        base.clone().with_calibration(self.calibration)
    }

    /// Projection factor for this scene's observations.
    pub fn factor(&self, config: &ProjectionConfig) -> ApexVioResult<ProjectionFactor> {
        ProjectionFactor::with_motion(self.pts_i, self.pts_j, self.motion, config)
    }
}

/// Camera extrinsic at one encoder angle.
fn camera_extrinsic(calibration: &MountCalibration, extrinsic: &PoseBlock, angle: f64) -> PoseBlock {
    let mount = UnitQuaternion::from_axis_angle(calibration.axis(), angle);
    PoseBlock::new(
        extrinsic.translation + mount * calibration.lever_arm(),
        mount * extrinsic.rotation,
    )
}

/// Map a point from camera i into camera j.
pub fn project(
    calibration: &MountCalibration,
    motion: MountMotion,
    params: &ProjectionParameters,
    point_camera_i: &Vector3<f64>,
) -> Vector3<f64> {
    let (angle_i, angle_j) = motion.angles();
    let camera_i = camera_extrinsic(calibration, &params.extrinsic, angle_i);
    let camera_j = camera_extrinsic(calibration, &params.extrinsic, angle_j);

    let point_world = params
        .pose_i
        .transform_point(&camera_i.transform_point(point_camera_i));
    camera_j.inverse_transform_point(&params.pose_j.inverse_transform_point(&point_world))
}
