use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use pcreg_3d::{ops::angle_between, pointcloud::PointCloud};

use crate::{index::SpatialIndex, IcpError};

/// A matched pair between a source point and its nearest target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index of the point in the source cloud.
    pub source_index: usize,
    /// Index of the matched point in the target cloud.
    pub target_index: usize,
    /// The source point.
    pub source: [f64; 3],
    /// The matched target point.
    pub target: [f64; 3],
    /// Euclidean distance between the two points.
    pub distance: f64,
}

/// Acceptance rules applied to every candidate pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceFilter {
    /// Reject pairs farther apart than this distance. `None` accepts any distance.
    pub max_distance: Option<f64>,
    /// Reject pairs whose normals differ by more than this angle, in radians.
    ///
    /// Only applies when both clouds carry normals.
    pub max_normal_angle: Option<f64>,
    /// Drop pairs whose distance exceeds `median + 3 * 1.4826 * MAD` of the accepted pairs.
    pub reject_outliers: bool,
}

impl CorrespondenceFilter {
    fn accepts(
        &self,
        distance: f64,
        source_normal: Option<&[f64; 3]>,
        target_normal: Option<&[f64; 3]>,
    ) -> bool {
        if let Some(max_distance) = self.max_distance {
            if distance > max_distance {
                return false;
            }
        }
        if let (Some(max_angle), Some(ns), Some(nt)) =
            (self.max_normal_angle, source_normal, target_normal)
        {
            // a zero normal carries no orientation and is not used to reject
            if let Some(angle) = angle_between(ns, nt) {
                if angle > max_angle {
                    return false;
                }
            }
        }
        true
    }
}

/// Match the sampled source points to their nearest target points.
///
/// # Arguments
///
/// * `source` - The (current working copy of the) source cloud.
/// * `sample` - Indices into `source` to match.
/// * `target` - The target cloud.
/// * `index` - Nearest neighbor index built over `target`.
/// * `filter` - Acceptance rules.
/// * `parallel` - Run the queries on the rayon thread pool.
///
/// # Returns
///
/// The accepted pairs, in sample order. Fails with [`IcpError::DegenerateCorrespondence`]
/// when no pair survives filtering.
pub fn find_correspondences<I: SpatialIndex + ?Sized>(
    source: &PointCloud,
    sample: &[usize],
    target: &PointCloud,
    index: &I,
    filter: &CorrespondenceFilter,
    parallel: bool,
) -> Result<Vec<Correspondence>, IcpError> {
    if index.len() != target.len() {
        return Err(IcpError::InvalidParameter {
            name: "index",
            reason: format!(
                "index holds {} points but the target cloud has {}",
                index.len(),
                target.len()
            ),
        });
    }
    if let Some(&bad) = sample.iter().find(|&&i| i >= source.len()) {
        return Err(IcpError::InvalidParameter {
            name: "sample",
            reason: format!("index {bad} out of range for {} points", source.len()),
        });
    }

    let source_points = source.points();
    let target_points = target.points();
    let source_normals = source.normals();
    let target_normals = target.normals();

    let query = |&i: &usize| -> Option<Correspondence> {
        let p = source_points[i];
        let nn = index.nearest(&p)?;
        let accepted = filter.accepts(
            nn.distance,
            source_normals.map(|n| &n[i]),
            target_normals.map(|n| &n[nn.index]),
        );
        accepted.then_some(Correspondence {
            source_index: i,
            target_index: nn.index,
            source: p,
            target: target_points[nn.index],
            distance: nn.distance,
        })
    };

    let mut pairs: Vec<Correspondence> = if parallel {
        sample.par_iter().filter_map(query).collect()
    } else {
        sample.iter().filter_map(query).collect()
    };

    if filter.reject_outliers {
        reject_outliers(&mut pairs);
    }

    if pairs.is_empty() {
        return Err(IcpError::DegenerateCorrespondence { consecutive: 1 });
    }

    log::trace!(
        "correspondences: {} accepted out of {} sampled",
        pairs.len(),
        sample.len()
    );

    Ok(pairs)
}

// upper median, reorders `values`
fn median(values: &mut [f64]) -> f64 {
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median absolute deviation rule: keep pairs within `median + 3 * sigma`,
/// with `sigma = 1.4826 * MAD` the normal-consistent scale estimate.
fn reject_outliers(pairs: &mut Vec<Correspondence>) {
    if pairs.len() < 4 {
        return;
    }

    let mut distances = pairs.iter().map(|c| c.distance).collect::<Vec<_>>();
    let median_dist = median(&mut distances);

    let mut deviations = distances
        .iter()
        .map(|d| (d - median_dist).abs())
        .collect::<Vec<_>>();
    let mad = median(&mut deviations);
    let sigma_d = 1.4826 * mad;

    let threshold = median_dist + 3.0 * sigma_d;
    pairs.retain(|c| c.distance <= threshold);
}
