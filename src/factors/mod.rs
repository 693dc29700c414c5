//! Factor implementations for visual-inertial bundle adjustment.
//!
//! # Module Structure
//!
//! - `projection_factor`: two-frame reprojection factor with a rotating camera mount
//! - `residual_model`: pinhole and unit-sphere residual formulations
//! - `numerical`: central-difference Jacobians on the parameter tangent spaces

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::{ApexVioError, ApexVioResult};

pub mod numerical;
pub mod projection_factor;
pub mod residual_model;

pub use projection_factor::{
    MountMotion, PoseJacobian, ProjectionEvaluation, ProjectionFactor, ProjectionJacobians,
    ProjectionParameters,
};
pub use residual_model::ResidualModel;

/// Interface between factors and the optimizer.
///
/// `params` holds one vector per connected parameter block, in the order the
/// factor documents. The Jacobian, when requested, stacks the per-block
/// Jacobians horizontally in the same order.
pub trait Factor: Send + Sync {
    /// Compute the residual and, if `compute_jacobian` is set, the dense Jacobian.
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> (DVector<f64>, Option<DMatrix<f64>>);

    /// Residual dimension
    fn get_dimension(&self) -> usize;
}

/// Which Jacobian blocks an evaluation should produce.
///
/// Blocks are selected independently; unselected blocks are skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JacobianRequest {
    pub pose_i: bool,
    pub pose_j: bool,
    pub extrinsic: bool,
    pub inverse_depth: bool,
}

impl JacobianRequest {
    /// Residual only
    pub fn none() -> Self {
        Self::default()
    }

    /// Every block
    pub fn all() -> Self {
        Self {
            pose_i: true,
            pose_j: true,
            extrinsic: true,
            inverse_depth: true,
        }
    }

    pub fn with_pose_i(mut self) -> Self {
        self.pose_i = true;
        self
    }

    pub fn with_pose_j(mut self) -> Self {
        self.pose_j = true;
        self
    }

    pub fn with_extrinsic(mut self) -> Self {
        self.extrinsic = true;
        self
    }

    pub fn with_inverse_depth(mut self) -> Self {
        self.inverse_depth = true;
        self
    }

    /// True when at least one block is requested.
    pub fn any(&self) -> bool {
        self.pose_i || self.pose_j || self.extrinsic || self.inverse_depth
    }
}

/// Linearize many factors in parallel.
///
/// `params[k]` are the parameter blocks of `factors[k]`. Each factor is touched by
/// exactly one worker.
pub fn linearize_batch<F: Factor>(
    factors: &[F],
    params: &[Vec<DVector<f64>>],
    compute_jacobian: bool,
) -> ApexVioResult<Vec<(DVector<f64>, Option<DMatrix<f64>>)>> {
    if factors.len() != params.len() {
        return Err(ApexVioError::InvalidInput(format!(
            "{} factors but {} parameter sets",
            factors.len(),
            params.len()
        )));
    }
    Ok(factors
        .par_iter()
        .zip(params.par_iter())
        .map(|(factor, blocks)| factor.linearize(blocks, compute_jacobian))
        .collect())
}
