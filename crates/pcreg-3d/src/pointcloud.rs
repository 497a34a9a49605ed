use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::linalg::{rotate_points_in_place, transform_points_in_place};
use crate::transforms::RigidTransform;

/// Errors raised while building a point cloud.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PointCloudError {
    /// Normals were given but do not match the number of points.
    #[error("point cloud has {points} points but {normals} normals")]
    MismatchedNormals {
        /// Number of points.
        points: usize,
        /// Number of normals.
        normals: usize,
    },
}

/// A point cloud with points and optional per-point normals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The normals of the points, parallel to `points`.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points and normals (optional).
    ///
    /// Fails if normals are given and their count differs from the point count.
    pub fn new(
        points: Vec<[f64; 3]>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, PointCloudError> {
        if let Some(normals) = &normals {
            if normals.len() != points.len() {
                return Err(PointCloudError::MismatchedNormals {
                    points: points.len(),
                    normals: normals.len(),
                });
            }
        }
        Ok(Self { points, normals })
    }

    /// Create a point cloud without normals.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            normals: None,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Check whether the point cloud carries normals.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Consume the point cloud and return its points and normals.
    pub fn into_parts(self) -> (Vec<[f64; 3]>, Option<Vec<[f64; 3]>>) {
        (self.points, self.normals)
    }

    /// Mean position of the points, `None` if the cloud is empty.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        crate::ops::centroid(&self.points)
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        match self.points.first() {
            None => DVec3::ZERO,
            Some(first) => self
                .points
                .iter()
                .fold(DVec3::from_array(*first), |a, b| a.min(DVec3::from_array(*b))),
        }
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        match self.points.first() {
            None => DVec3::ZERO,
            Some(first) => self
                .points
                .iter()
                .fold(DVec3::from_array(*first), |a, b| a.max(DVec3::from_array(*b))),
        }
    }

    /// Apply a rigid transform to the points and rotate the normals, in place.
    pub fn transform_in_place(&mut self, transform: &RigidTransform) {
        transform_points_in_place(
            &mut self.points,
            &transform.rotation,
            &transform.translation,
        );
        if let Some(normals) = self.normals.as_mut() {
            rotate_points_in_place(normals, &transform.rotation);
        }
    }

    /// Return a transformed copy of the point cloud.
    pub fn transform(&self, transform: &RigidTransform) -> PointCloud {
        let mut out = self.clone();
        out.transform_in_place(transform);
        out
    }
}
