/// Which of the two clouds of a registration an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudRole {
    /// The cloud being moved.
    Source,
    /// The fixed reference cloud.
    Target,
}

impl std::fmt::Display for CloudRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudRole::Source => write!(f, "source"),
            CloudRole::Target => write!(f, "target"),
        }
    }
}

/// An error type for the ICP registration.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum IcpError {
    /// One of the clouds has no points.
    #[error("the {0} point cloud is empty")]
    EmptyInput(CloudRole),

    /// No correspondence survived filtering.
    ///
    /// `consecutive` counts the iterations in a row that ended up without pairs.
    #[error("no correspondences survived filtering ({consecutive} consecutive iterations)")]
    DegenerateCorrespondence {
        /// Number of consecutive iterations without correspondences.
        consecutive: usize,
    },

    /// The cross-covariance matrix is rank deficient and does not define a rotation.
    #[error("cross-covariance matrix is singular, the rotation is undefined")]
    SingularTransform,

    /// Fewer correspondences than needed to estimate a rotation.
    #[error("need at least 3 correspondences for transformation estimation, got {0}")]
    InsufficientCorrespondences(usize),

    /// The matched point lists have different lengths.
    #[error("mismatched correspondence lists: {source_len} source vs {target_len} target points")]
    MismatchedLengths {
        /// Number of source points.
        source_len: usize,
        /// Number of target points.
        target_len: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
