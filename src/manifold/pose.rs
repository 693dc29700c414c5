//! Seven-wide pose parameter block.
//!
//! Layout: `[x, y, z, qx, qy, qz, qw]`. This is the layout the optimizer stores
//! body poses and the camera extrinsic in. The tangent space has 6 DOF,
//! `[δp, δθ]`, applied as
//!
//! ```text
//! p ← p + δp
//! q ← q ⊗ Exp(δθ)
//! ```
//!
//! Jacobians with respect to a pose block are 2×7 with the last column unused.

use std::fmt;

use nalgebra::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3, Vector6};

use crate::error::{ApexVioError, ApexVioResult};
use crate::manifold::so3;

/// Rigid transform stored as a 7-wide parameter block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseBlock {
    /// Translation `[x, y, z]`
    pub translation: Vector3<f64>,
    /// Orientation
    pub rotation: UnitQuaternion<f64>,
}

impl fmt::Display for PoseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.rotation.quaternion();
        write!(
            f,
            "PoseBlock(t: [{:.4}, {:.4}, {:.4}], q: [x: {:.4}, y: {:.4}, z: {:.4}, w: {:.4}])",
            self.translation.x, self.translation.y, self.translation.z, q.i, q.j, q.k, q.w
        )
    }
}

impl PoseBlock {
    /// Size of the stored representation
    pub const SIZE: usize = 7;

    /// Degrees of freedom of the tangent space
    pub const DOF: usize = 6;

    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Parse a block in `[x, y, z, qx, qy, qz, qw]` order.
    ///
    /// The quaternion is renormalized; it is not otherwise validated.
    pub fn from_slice(values: &[f64]) -> ApexVioResult<Self> {
        if values.len() != Self::SIZE {
            return Err(ApexVioError::InvalidInput(format!(
                "pose block must have {} values, got {}",
                Self::SIZE,
                values.len()
            )));
        }
        let translation = Vector3::new(values[0], values[1], values[2]);
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(
            values[6], values[3], values[4], values[5],
        ));
        Ok(Self::new(translation, rotation))
    }

    /// Block values in `[x, y, z, qx, qy, qz, qw]` order.
    pub fn to_array(&self) -> [f64; 7] {
        let q = self.rotation.quaternion();
        [
            self.translation.x,
            self.translation.y,
            self.translation.z,
            q.i,
            q.j,
            q.k,
            q.w,
        ]
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Apply a tangent-space increment `[δp, δθ]`.
    pub fn plus(&self, delta: &Vector6<f64>) -> Self {
        let dp = delta.fixed_rows::<3>(0).into_owned();
        let dtheta = delta.fixed_rows::<3>(3).into_owned();
        Self::new(
            self.translation + dp,
            so3::right_plus(&self.rotation, &dtheta),
        )
    }

    /// Map a point from this frame into the parent frame: `R p + t`.
    #[inline]
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Map a point from the parent frame into this frame: `Rᵀ (p - t)`.
    #[inline]
    pub fn inverse_transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (point - self.translation)
    }
}

impl Default for PoseBlock {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<PoseBlock> for DVector<f64> {
    fn from(pose: PoseBlock) -> Self {
        DVector::from_row_slice(&pose.to_array())
    }
}

impl TryFrom<&DVector<f64>> for PoseBlock {
    type Error = ApexVioError;

    fn try_from(values: &DVector<f64>) -> ApexVioResult<Self> {
        Self::from_slice(values.as_slice())
    }
}
