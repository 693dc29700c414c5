//! Manifold helpers for the parameter blocks touched by the projection factors.
//!
//! - `so3`: skew-symmetric matrices, Rodrigues rotations, the SO(3) exponential map
//! - `pose`: the 7-wide `[x, y, z, qx, qy, qz, qw]` pose/extrinsic block

pub mod pose;
pub mod so3;

pub use pose::PoseBlock;
pub use so3::{rodrigues_rotation, skew_symmetric};
