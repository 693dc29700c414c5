//! # Apex VIO
//!
//! Reprojection factors for visual-inertial bundle adjustment with a camera that
//! may sit on a rotating, encoder-driven mount.
//!
//! The central type is [`ProjectionFactor`]: given two body poses, the camera
//! extrinsic and a landmark inverse depth, it returns a whitened 2-D residual and
//! analytic Jacobians for each parameter block. The optimizer that schedules
//! evaluations, applies robust losses and updates parameters lives outside this
//! crate and talks to the factor through [`Factor`] or
//! [`ProjectionFactor::evaluate`].
//!
//! ## Features
//!
//! - **Two residual models**: normalized-plane pinhole and unit-sphere tangent plane
//! - **Rotating mounts**: per-frame encoder angles folded into the transform chain
//! - **Selective Jacobians**: each of the four blocks can be requested independently
//! - **Parallel linearization**: [`factors::linearize_batch`] fans out over rayon
//! - **Numeric checks**: [`factors::numerical`] and the `check_projection_jacobians` binary

pub mod calibration;
pub mod diagnostics;
pub mod error;
pub mod factors;
pub mod logger;
pub mod manifold;
pub mod synthetic;

pub use calibration::{DepthPolicy, MountCalibration, ProjectionConfig, ResidualModelType};
pub use diagnostics::EvaluationStats;
pub use error::{ApexVioError, ApexVioResult};
pub use factors::{
    Factor, JacobianRequest, MountMotion, ProjectionEvaluation, ProjectionFactor,
    ProjectionJacobians, ProjectionParameters,
};
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{PoseBlock, rodrigues_rotation, skew_symmetric};
