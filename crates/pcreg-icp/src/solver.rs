use glam::{DMat3, DVec3};

use pcreg_3d::{linalg::dmat3_to_array33, transforms::RigidTransform};

use crate::IcpError;

/// Relative threshold on the middle singular value below which the
/// cross-covariance is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-9;

/// Output of [`fit_transformation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidFit {
    /// Transform mapping the source points onto the target points.
    pub transform: RigidTransform,
    /// Singular values of the cross-covariance matrix, largest first.
    pub singular_values: [f64; 3],
    /// Whether `V * U^T` was a reflection that had to be corrected.
    pub reflection_corrected: bool,
}

/// Compute the centroids of two sets of points.
///
/// PRECONDITION: both slices are non-empty.
///
/// # Arguments
///
/// * `points_src` - A set of points.
/// * `points_dst` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub fn compute_centroids(points_src: &[[f64; 3]], points_dst: &[[f64; 3]]) -> (DVec3, DVec3) {
    let mean = |points: &[[f64; 3]]| {
        points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p))
            / points.len() as f64
    };
    (mean(points_src), mean(points_dst))
}

/// Cross-covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T].
pub fn cross_covariance(
    points_src: &[[f64; 3]],
    points_dst: &[[f64; 3]],
    src_centroid: DVec3,
    dst_centroid: DVec3,
) -> DMat3 {
    let mut h = DMat3::ZERO;
    for (p_src, p_dst) in points_src.iter().zip(points_dst.iter()) {
        let src_centered = DVec3::from_array(*p_src) - src_centroid;
        let dst_centered = DVec3::from_array(*p_dst) - dst_centroid;
        h += DMat3::from_cols(
            src_centered * dst_centered.x,
            src_centered * dst_centered.y,
            src_centered * dst_centered.z,
        );
    }
    h
}

/// Singular value decomposition `H = U * diag(s) * V^T` of a 3x3 matrix.
fn svd3(h: &DMat3) -> (DMat3, [f64; 3], DMat3) {
    let h_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| h.col(j)[i]);
    let svd = h_mat.svd();

    let to_dmat3 = |m: faer::MatRef<'_, f64>| {
        DMat3::from_cols(
            DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
            DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
            DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
        )
    };

    let s = svd.s_diagonal();
    (
        to_dmat3(svd.u()),
        [s.read(0), s.read(1), s.read(2)],
        to_dmat3(svd.v()),
    )
}

/// Compute the optimal rigid transformation between two matched point sets.
///
/// Finds the rotation and translation minimizing the mean square error between
/// `R * points_src[i] + t` and `points_dst[i]`:
///
/// 1. Compute centroids of both point sets
/// 2. Center both point sets by subtracting their respective centroids
/// 3. Compute the cross-covariance matrix H = Σ[(p_src - p_src_mean) * (p_dst - p_dst_mean)^T]
/// 4. Compute the SVD of H = U * S * V^T
/// 5. Calculate rotation matrix R = V * U^T, correcting reflections
/// 6. Calculate translation vector t = p_dst_mean - R * p_src_mean
///
/// For more details, see: Arun, K., Huang, T. S., and Blostein, S. D.
/// "Least-squares fitting of two 3-D point sets." IEEE PAMI, 1987.
///
/// # Errors
///
/// * [`IcpError::MismatchedLengths`] if the slices differ in length.
/// * [`IcpError::InsufficientCorrespondences`] for fewer than 3 pairs.
/// * [`IcpError::SingularTransform`] if the geometry does not determine a rotation,
///   e.g. all points collinear or coincident.
pub fn fit_transformation(
    points_src: &[[f64; 3]],
    points_dst: &[[f64; 3]],
) -> Result<RigidFit, IcpError> {
    if points_src.len() != points_dst.len() {
        return Err(IcpError::MismatchedLengths {
            source_len: points_src.len(),
            target_len: points_dst.len(),
        });
    }
    if points_src.len() < 3 {
        return Err(IcpError::InsufficientCorrespondences(points_src.len()));
    }

    let (src_centroid, dst_centroid) = compute_centroids(points_src, points_dst);
    let h = cross_covariance(points_src, points_dst, src_centroid, dst_centroid);
    if !h.is_finite() {
        return Err(IcpError::SingularTransform);
    }
    let (u, singular_values, v) = svd3(&h);

    // Identity transformation is a special case
    if points_src == points_dst {
        return Ok(RigidFit {
            transform: RigidTransform::identity(),
            singular_values,
            reflection_corrected: false,
        });
    }

    let mut sorted = singular_values;
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted[0].is_nan() || sorted[0] <= 0.0 || sorted[1] <= RANK_TOLERANCE * sorted[0] {
        return Err(IcpError::SingularTransform);
    }

    let mut r = v * u.transpose();
    let mut reflection_corrected = false;

    if r.determinant() < 0.0 {
        // negate the column of V paired with the smallest singular value
        let smallest = (0..3)
            .min_by(|&a, &b| singular_values[a].total_cmp(&singular_values[b]))
            .unwrap_or(2);
        let mut cols = [v.x_axis, v.y_axis, v.z_axis];
        cols[smallest] = -cols[smallest];
        let v_corrected = DMat3::from_cols(cols[0], cols[1], cols[2]);
        r = v_corrected * u.transpose();
        reflection_corrected = true;
    }

    let t = dst_centroid - r * src_centroid;

    Ok(RigidFit {
        transform: RigidTransform::new(dmat3_to_array33(&r), t.to_array()),
        singular_values,
        reflection_corrected,
    })
}

/// Root mean square of `|R * src_i + t - dst_i|` over matched pairs.
///
/// Returns 0 for empty input.
pub fn rms_residual(
    points_src: &[[f64; 3]],
    points_dst: &[[f64; 3]],
    transform: &RigidTransform,
) -> f64 {
    if points_src.is_empty() {
        return 0.0;
    }
    let sum = points_src
        .iter()
        .zip(points_dst.iter())
        .map(|(s, d)| pcreg_3d::ops::squared_euclidean_distance(&transform.apply(s), d))
        .sum::<f64>();
    (sum / points_src.len() as f64).sqrt()
}
