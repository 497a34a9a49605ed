#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::{CloudRole, IcpError};

/// Correspondence search and filtering.
pub mod correspondence;

/// Nearest neighbor indices over the target cloud.
pub mod index;

/// Closed-form rigid transform estimation from matched pairs.
pub mod solver;

mod icp;
pub use icp::*;

pub use solver::{compute_centroids, fit_transformation, RigidFit};
