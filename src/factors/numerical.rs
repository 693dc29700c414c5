//! Central-difference Jacobians for the projection factor.
//!
//! Pose and extrinsic blocks are perturbed on their tangent space with the same
//! right perturbation the analytic Jacobians use (`p + δp`, `q ⊗ Exp(δθ)`), so
//! numeric and analytic blocks are directly comparable column by column.
//! The inverse depth is perturbed additively.

use nalgebra::{Vector2, Vector6};

use crate::error::ApexVioResult;
use crate::factors::JacobianRequest;
use crate::factors::projection_factor::{
    PoseJacobian, ProjectionFactor, ProjectionJacobians, ProjectionParameters,
};
use crate::manifold::PoseBlock;

/// Default finite-difference step
pub const DEFAULT_STEP: f64 = 1e-6;

/// Which pose-like block to perturb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoseSlot {
    PoseI,
    PoseJ,
    Extrinsic,
}

impl PoseSlot {
    fn block_mut(self, params: &mut ProjectionParameters) -> &mut PoseBlock {
        match self {
            PoseSlot::PoseI => &mut params.pose_i,
            PoseSlot::PoseJ => &mut params.pose_j,
            PoseSlot::Extrinsic => &mut params.extrinsic,
        }
    }
}

fn residual(factor: &ProjectionFactor, params: &ProjectionParameters) -> ApexVioResult<Vector2<f64>> {
    Ok(factor.evaluate(params, JacobianRequest::none())?.residual)
}

fn pose_jacobian(
    factor: &ProjectionFactor,
    params: &ProjectionParameters,
    slot: PoseSlot,
    step: f64,
) -> ApexVioResult<PoseJacobian> {
    let mut jacobian = PoseJacobian::zeros();
    for k in 0..PoseBlock::DOF {
        let mut delta = Vector6::zeros();
        delta[k] = step;

        let mut plus = *params;
        let block = slot.block_mut(&mut plus);
        *block = block.plus(&delta);

        let mut minus = *params;
        let block = slot.block_mut(&mut minus);
        *block = block.plus(&-delta);

        let column = (residual(factor, &plus)? - residual(factor, &minus)?) / (2.0 * step);
        jacobian.set_column(k, &column);
    }
    Ok(jacobian)
}

/// Numeric Jacobians for the blocks selected in `request`.
pub fn numeric_jacobians(
    factor: &ProjectionFactor,
    params: &ProjectionParameters,
    request: JacobianRequest,
    step: f64,
) -> ApexVioResult<ProjectionJacobians> {
    let mut jacobians = ProjectionJacobians::default();
    if request.pose_i {
        jacobians.pose_i = Some(pose_jacobian(factor, params, PoseSlot::PoseI, step)?);
    }
    if request.pose_j {
        jacobians.pose_j = Some(pose_jacobian(factor, params, PoseSlot::PoseJ, step)?);
    }
    if request.extrinsic {
        jacobians.extrinsic = Some(pose_jacobian(factor, params, PoseSlot::Extrinsic, step)?);
    }
    if request.inverse_depth {
        let mut plus = *params;
        plus.inverse_depth += step;
        let mut minus = *params;
        minus.inverse_depth -= step;
        jacobians.inverse_depth =
            Some((residual(factor, &plus)? - residual(factor, &minus)?) / (2.0 * step));
    }
    Ok(jacobians)
}

/// Discrepancy between an analytic and a numeric Jacobian block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockError {
    pub block: &'static str,
    /// Largest absolute entry difference
    pub max_abs: f64,
    /// `max_abs` divided by `max(1, largest numeric entry)`
    pub relative: f64,
}

fn block_error<const C: usize>(
    block: &'static str,
    analytic: &nalgebra::SMatrix<f64, 2, C>,
    numeric: &nalgebra::SMatrix<f64, 2, C>,
) -> BlockError {
    let max_abs = (analytic - numeric).amax();
    let scale = numeric.amax().max(1.0);
    BlockError {
        block,
        max_abs,
        relative: max_abs / scale,
    }
}

/// Compare every block present in both sets.
pub fn compare_jacobians(
    analytic: &ProjectionJacobians,
    numeric: &ProjectionJacobians,
) -> Vec<BlockError> {
    let mut errors = Vec::with_capacity(4);
    let pose_blocks = [
        ("pose_i", &analytic.pose_i, &numeric.pose_i),
        ("pose_j", &analytic.pose_j, &numeric.pose_j),
        ("extrinsic", &analytic.extrinsic, &numeric.extrinsic),
    ];
    for (name, a, n) in pose_blocks {
        if let (Some(a), Some(n)) = (a, n) {
            errors.push(block_error(name, a, n));
        }
    }
    if let (Some(a), Some(n)) = (&analytic.inverse_depth, &numeric.inverse_depth) {
        errors.push(block_error("inverse_depth", a, n));
    }
    errors
}
