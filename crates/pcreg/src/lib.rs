//! Rigid registration of 3D point clouds.
//!
//! - [`k3d`]: point clouds, rigid transforms and the small linear algebra they need.
//! - [`icp`]: nearest neighbor indices, correspondence search, the closed-form rigid
//!   solver and the Iterative Closest Point loop built on top of them.
//!
//! ```no_run
//! use pcreg::icp::{register_clouds, Sampling};
//! use pcreg::k3d::pointcloud::PointCloud;
//!
//! # fn main() -> Result<(), pcreg::icp::IcpError> {
//! let source = PointCloud::from_points(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
//! let target = source.clone();
//! let result = register_clouds(&source, &target, 50, Sampling::All, 1e-6)?;
//! println!("rmse: {}", result.rmse);
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use pcreg_3d as k3d;

#[doc(inline)]
pub use pcreg_icp as icp;
