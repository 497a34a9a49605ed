#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Linear algebra utilities.
pub mod linalg;

/// Distance, centroid and angle operations on 3D points.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Rigid transforms and rotation helpers.
pub mod transforms;
