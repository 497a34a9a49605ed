use glam::DVec3;

/// Utility function to compute the Euclidean distance between two points.
///
/// # Arguments
///
/// * `a` - A point in 3D space.
/// * `b` - Another point in 3D space.
///
/// # Returns
///
/// The Euclidean distance between the two points.
///
/// Example:
/// ```
/// use pcreg_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 6.0, 3.0];
/// assert_eq!(euclidean_distance(&a, &b), 5.0);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    squared_euclidean_distance(a, b).sqrt()
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn squared_euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Arithmetic mean of a set of points.
///
/// Returns `None` for an empty slice.
pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    Some((sum / points.len() as f64).to_array())
}

/// Angle in radians between two direction vectors, in `[0, pi]`.
///
/// The vectors do not need to be normalized. Returns `None` if either has zero length.
pub fn angle_between(a: &[f64; 3], b: &[f64; 3]) -> Option<f64> {
    let a = DVec3::from_array(*a);
    let b = DVec3::from_array(*b);
    let denom = a.length() * b.length();
    if denom < f64::EPSILON {
        return None;
    }
    // clamp against rounding pushing |cos| past 1
    Some((a.dot(b) / denom).clamp(-1.0, 1.0).acos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_relative_eq!(euclidean_distance(&a, &b), 5.196152, epsilon = 1e-6);
        assert_relative_eq!(squared_euclidean_distance(&a, &b), 27.0);
    }

    #[test]
    fn test_centroid() {
        let points = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let c = centroid(&points);
        assert_eq!(c, Some([2.5, 3.5, 4.5]));
        assert_eq!(centroid(&[]), None);
    }

    #[test]
    fn test_angle_between() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 2.0, 0.0];
        assert_relative_eq!(
            angle_between(&x, &y).unwrap_or_default(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            angle_between(&x, &[-3.0, 0.0, 0.0]).unwrap_or_default(),
            std::f64::consts::PI,
            epsilon = 1e-12
        );
        assert_relative_eq!(angle_between(&x, &x).unwrap_or(1.0), 0.0);
        assert_eq!(angle_between(&x, &[0.0, 0.0, 0.0]), None);
    }
}
