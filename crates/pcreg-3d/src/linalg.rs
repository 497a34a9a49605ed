use glam::{DMat3, DVec3};

/// Convert a row-major 3x3 array into a glam matrix.
///
/// glam stores matrices column-major, so the array is transposed on the way in.
#[inline]
pub fn array33_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(m).transpose()
}

/// Convert a glam matrix into a row-major 3x3 array.
#[inline]
pub fn dmat3_to_array33(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Multiply two row-major 3x3 matrices, `a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    dmat3_to_array33(&(array33_to_dmat3(a) * array33_to_dmat3(b)))
}

/// Transpose a row-major 3x3 matrix.
pub fn transpose33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in m.iter().enumerate() {
        for (j, val) in row.iter().enumerate() {
            out[j][i] = *val;
        }
    }
    out
}

/// Determinant of a row-major 3x3 matrix.
pub fn det33(m: &[[f64; 3]; 3]) -> f64 {
    array33_to_dmat3(m).determinant()
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A row-major rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated slice to store the transformed points.
///
/// PRECONDITION: dst_points has the same length as src_points.
///
/// Example:
///
/// ```
/// use pcreg_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points);
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    let r = array33_to_dmat3(dst_r_src);
    let t = DVec3::from_array(*dst_t_src);

    for (p_dst, p_src) in dst_points.iter_mut().zip(src_points.iter()) {
        *p_dst = (r * DVec3::from_array(*p_src) + t).to_array();
    }
}

/// Rotate a set of points (or directions) in place.
pub fn rotate_points_in_place(points: &mut [[f64; 3]], dst_r_src: &[[f64; 3]; 3]) {
    let r = array33_to_dmat3(dst_r_src);
    for p in points.iter_mut() {
        *p = (r * DVec3::from_array(*p)).to_array();
    }
}

/// Rotate and translate a set of points in place.
pub fn transform_points_in_place(
    points: &mut [[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
) {
    let r = array33_to_dmat3(dst_r_src);
    let t = DVec3::from_array(*dst_t_src);
    for p in points.iter_mut() {
        *p = (r * DVec3::from_array(*p) + t).to_array();
    }
}
