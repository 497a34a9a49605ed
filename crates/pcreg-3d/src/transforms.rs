use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::linalg::{array33_to_dmat3, det33, dmat3_to_array33, transpose33};

/// Errors raised while building rotations.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TransformError {
    /// The rotation axis has (close to) zero length.
    #[error("cannot compute rotation matrix from a zero vector")]
    ZeroAxis,
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It is normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// Example:
///
/// ```
/// use pcreg_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    // normalize the vector
    let axis_norm = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err(TransformError::ZeroAxis),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let [x, y, z] = axis_norm;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;
    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;
    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;
    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// A rigid body transformation `p' = R * p + t`.
///
/// The rotation is stored row-major. Transforms estimated by the registration
/// solver always hold a proper rotation (orthonormal, determinant +1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Row-major 3x3 rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Create a transform from a rotation and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// A pure translation.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Build a transform from an axis-angle rotation and a translation.
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Ok(Self::new(
            axis_angle_to_rotation_matrix(axis, angle)?,
            translation,
        ))
    }

    /// Apply the transform to a point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let r = array33_to_dmat3(&self.rotation);
        (r * DVec3::from_array(*point) + DVec3::from_array(self.translation)).to_array()
    }

    /// Compose two transforms: the result applies `other` first, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        let r_self = array33_to_dmat3(&self.rotation);
        let r_other = array33_to_dmat3(&other.rotation);
        let t =
            r_self * DVec3::from_array(other.translation) + DVec3::from_array(self.translation);
        RigidTransform {
            rotation: dmat3_to_array33(&(r_self * r_other)),
            translation: t.to_array(),
        }
    }

    /// The inverse transform, `R' = R^T`, `t' = -R^T * t`.
    pub fn inverse(&self) -> RigidTransform {
        let rotation = transpose33(&self.rotation);
        let t_inv = -(array33_to_dmat3(&rotation) * DVec3::from_array(self.translation));
        RigidTransform {
            rotation,
            translation: t_inv.to_array(),
        }
    }

    /// Check that the rotation is orthonormal with determinant +1 within `tol`.
    pub fn is_proper_rotation(&self, tol: f64) -> bool {
        let r = array33_to_dmat3(&self.rotation);
        let should_be_identity = r.transpose() * r;
        let identity = glam::DMat3::IDENTITY;
        for col in 0..3 {
            let diff = should_be_identity.col(col) - identity.col(col);
            if diff.abs().max_element() > tol {
                return false;
            }
        }
        (det33(&self.rotation) - 1.0).abs() <= tol
    }

    /// The rotation angle in radians, in `[0, pi]`.
    pub fn rotation_angle(&self) -> f64 {
        let r = &self.rotation;
        let trace = r[0][0] + r[1][1] + r[2][2];
        ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
    }

    /// Angle in radians of the relative rotation between two transforms.
    pub fn angular_distance(&self, other: &RigidTransform) -> f64 {
        let r_a = array33_to_dmat3(&self.rotation);
        let r_b = array33_to_dmat3(&other.rotation);
        RigidTransform::new(dmat3_to_array33(&(r_a.transpose() * r_b)), [0.0; 3]).rotation_angle()
    }

    /// Euclidean distance between the two translation vectors.
    pub fn translation_distance(&self, other: &RigidTransform) -> f64 {
        crate::ops::euclidean_distance(&self.translation, &other.translation)
    }
}
