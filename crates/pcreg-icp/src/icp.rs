use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use pcreg_3d::{pointcloud::PointCloud, transforms::RigidTransform};

use crate::{
    correspondence::{find_correspondences, CorrespondenceFilter},
    index::{with_index, IndexBackend, SpatialIndex},
    solver::{compute_centroids, fit_transformation, rms_residual},
    CloudRole, IcpError,
};

/// Which source points take part in each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sampling {
    /// Use every source point (full ICP).
    #[default]
    All,
    /// Draw this many distinct source points, uniformly at random, every iteration.
    ///
    /// A count at or above the source size behaves like [`Sampling::All`].
    Random(usize),
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Source points used per iteration.
    pub sampling: Sampling,
    /// Convergence tolerance as the difference in RMSE between two consecutive iterations.
    pub tolerance: f64,
    /// Maximum distance of an accepted correspondence, unbounded if `None`.
    pub max_correspondence_distance: Option<f64>,
    /// Maximum angle in radians between the normals of an accepted correspondence.
    pub max_normal_angle: Option<f64>,
    /// Apply the median / MAD outlier rule to the correspondences.
    pub reject_outliers: bool,
    /// Nearest neighbor backend for the target cloud.
    pub index: IndexBackend,
    /// Run the nearest neighbor queries of an iteration in parallel.
    pub parallel: bool,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Initial guess, applied to the source before the first iteration.
    pub initial_transform: RigidTransform,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            sampling: Sampling::All,
            tolerance: 1e-6,
            max_correspondence_distance: None,
            max_normal_angle: None,
            reject_outliers: false,
            index: IndexBackend::KdTree,
            parallel: true,
            random_seed: None,
            initial_transform: RigidTransform::identity(),
        }
    }
}

impl IcpConfig {
    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<(), IcpError> {
        if self.max_iterations == 0 {
            return Err(IcpError::InvalidParameter {
                name: "max_iterations",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(IcpError::InvalidParameter {
                name: "tolerance",
                reason: format!("must be a positive finite number, got {}", self.tolerance),
            });
        }
        if self.sampling == Sampling::Random(0) {
            return Err(IcpError::InvalidParameter {
                name: "sampling",
                reason: "the random sample must hold at least one point".to_string(),
            });
        }
        if let Some(d) = self.max_correspondence_distance {
            if d.is_nan() || d < 0.0 {
                return Err(IcpError::InvalidParameter {
                    name: "max_correspondence_distance",
                    reason: format!("must be non-negative, got {d}"),
                });
            }
        }
        if let Some(a) = self.max_normal_angle {
            if a.is_nan() || a < 0.0 {
                return Err(IcpError::InvalidParameter {
                    name: "max_normal_angle",
                    reason: format!("must be non-negative, got {a}"),
                });
            }
        }
        Ok(())
    }

    fn correspondence_filter(&self) -> CorrespondenceFilter {
        CorrespondenceFilter {
            max_distance: self.max_correspondence_distance,
            max_normal_angle: self.max_normal_angle,
            reject_outliers: self.reject_outliers,
        }
    }
}

/// Why a successful registration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The RMSE changed by less than the tolerance between two iterations.
    Converged,
    /// The iteration budget ran out first.
    MaxIterationsReached,
}

/// Result of the ICP algorithm.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpResult {
    /// Estimated source to target transform, including the initial guess.
    pub transform: RigidTransform,
    /// RMSE of the last iteration that produced correspondences.
    pub rmse: f64,
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Number of correspondences used in the last successful iteration.
    pub num_correspondences: usize,
    /// RMSE of every iteration that produced correspondences, in order.
    pub rmse_history: Vec<f64>,
    /// The source cloud moved by `transform`.
    pub aligned_source: PointCloud,
}

/// Mutable state of one registration run.
#[derive(Debug)]
struct RegistrationState {
    iteration: usize,
    previous_error: f64,
    accumulated: RigidTransform,
    working: PointCloud,
    consecutive_empty: usize,
    fallback_iterations: usize,
    last_fallback: Option<IcpError>,
    num_correspondences: usize,
    history: Vec<f64>,
}

impl RegistrationState {
    fn new(source: &PointCloud, initial: &RigidTransform) -> Self {
        Self {
            iteration: 0,
            previous_error: f64::INFINITY,
            accumulated: *initial,
            working: source.transform(initial),
            consecutive_empty: 0,
            fallback_iterations: 0,
            last_fallback: None,
            num_correspondences: 0,
            history: Vec::new(),
        }
    }

    /// Record an iteration without correspondences; the second in a row is fatal.
    fn record_empty(&mut self) -> Result<(), IcpError> {
        self.consecutive_empty += 1;
        if self.consecutive_empty >= 2 {
            return Err(IcpError::DegenerateCorrespondence {
                consecutive: self.consecutive_empty,
            });
        }
        log::warn!(
            "iteration {}: no correspondences survived filtering, resampling",
            self.iteration
        );
        Ok(())
    }

    /// accumulated = increment ∘ accumulated, and move the working copy along.
    fn apply_increment(&mut self, increment: &RigidTransform) {
        self.accumulated = increment.compose(&self.accumulated);
        self.working.transform_in_place(increment);
    }
}

/// Iterative Closest Point registration with the basic parameter set.
///
/// # Arguments
///
/// * `source` - Source point cloud.
/// * `target` - Target point cloud.
/// * `max_iterations` - Iteration budget.
/// * `sampling` - Source points used per iteration.
/// * `eps` - Convergence threshold on the RMSE change between two iterations.
///
/// All other parameters take their [`IcpConfig::default`] values.
pub fn register_clouds(
    source: &PointCloud,
    target: &PointCloud,
    max_iterations: usize,
    sampling: Sampling,
    eps: f64,
) -> Result<IcpResult, IcpError> {
    let config = IcpConfig {
        max_iterations,
        sampling,
        tolerance: eps,
        ..Default::default()
    };
    icp_point_to_point(source, target, &config)
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// Every iteration samples the (moving) source, matches the sample to its nearest target
/// points, solves the least-squares rigid transform of the matches and applies it to the
/// whole working copy of the source.
///
/// # Arguments
///
/// * `source` - Source point cloud. Not modified.
/// * `target` - Target point cloud. Not modified.
/// * `config` - Registration parameters.
///
/// # Returns
///
/// The accumulated transform and the residual it reached. Fails with:
///
/// * [`IcpError::InvalidParameter`] if the configuration is out of range.
/// * [`IcpError::EmptyInput`] if either cloud is empty.
/// * [`IcpError::DegenerateCorrespondence`] if two consecutive iterations find no
///   correspondence, or the budget runs out before any iteration finds one.
/// * [`IcpError::SingularTransform`] or [`IcpError::InsufficientCorrespondences`] if no
///   iteration could estimate a rotation, carrying the cause of the last attempt.
pub fn icp_point_to_point(
    source: &PointCloud,
    target: &PointCloud,
    config: &IcpConfig,
) -> Result<IcpResult, IcpError> {
    config.validate()?;

    if source.is_empty() {
        return Err(IcpError::EmptyInput(CloudRole::Source));
    }
    if target.is_empty() {
        return Err(IcpError::EmptyInput(CloudRole::Target));
    }

    // the index over the target is built once per run
    with_index(config.index, target.points(), |index| {
        run_icp(source, target, index, config)
    })
}

fn run_icp(
    source: &PointCloud,
    target: &PointCloud,
    index: &dyn SpatialIndex,
    config: &IcpConfig,
) -> Result<IcpResult, IcpError> {
    let mut rng = match config.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let filter = config.correspondence_filter();
    let all_indices = (0..source.len()).collect::<Vec<_>>();
    let mut state = RegistrationState::new(source, &config.initial_transform);

    let termination = loop {
        log::debug!("Iteration: {}", state.iteration);
        let now = std::time::Instant::now();

        // sample the working copy of the source
        let drawn;
        let sample: &[usize] = match config.sampling {
            Sampling::Random(n) if n < source.len() => {
                drawn = rand::seq::index::sample(&mut rng, source.len(), n).into_vec();
                &drawn
            }
            _ => &all_indices,
        };

        // find closest points between current source and target
        let pairs = match find_correspondences(
            &state.working,
            sample,
            target,
            index,
            &filter,
            config.parallel,
        ) {
            Ok(pairs) => {
                state.consecutive_empty = 0;
                pairs
            }
            Err(IcpError::DegenerateCorrespondence { .. }) => {
                state.record_empty()?;
                state.iteration += 1;
                if state.iteration >= config.max_iterations {
                    break Termination::MaxIterationsReached;
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        log::debug!("Num correspondences: {}", pairs.len());

        // compute transformation between current source and closest points
        let (points_in_src, points_in_dst): (Vec<_>, Vec<_>) =
            pairs.iter().map(|c| (c.source, c.target)).unzip();

        let (increment, degenerate) = match fit_transformation(&points_in_src, &points_in_dst) {
            Ok(fit) => (fit.transform, false),
            Err(e @ (IcpError::SingularTransform | IcpError::InsufficientCorrespondences(_))) => {
                log::warn!(
                    "iteration {}: {}, falling back to a translation-only step",
                    state.iteration,
                    e
                );
                state.fallback_iterations += 1;
                state.last_fallback = Some(e);
                let (src_centroid, dst_centroid) =
                    compute_centroids(&points_in_src, &points_in_dst);
                let step = (dst_centroid - src_centroid).to_array();
                (RigidTransform::from_translation(step), true)
            }
            Err(e) => return Err(e),
        };

        // move the whole working copy, not only the sample
        state.apply_increment(&increment);

        // residual of the matched pairs after this iteration's step
        let rmse = rms_residual(&points_in_src, &points_in_dst, &increment);

        state.history.push(rmse);
        state.num_correspondences = pairs.len();
        state.iteration += 1;

        log::debug!("rmse: {} elapsed: {:?}", rmse, now.elapsed());

        // a fallback step says nothing about convergence, resample and go on
        if !degenerate {
            // check convergence and exit if below tolerance
            if (state.previous_error - rmse).abs() < config.tolerance {
                log::debug!(
                    "ICP converged in {} iterations with error {}",
                    state.iteration,
                    rmse
                );
                break Termination::Converged;
            }
            state.previous_error = rmse;
        }

        if state.iteration >= config.max_iterations {
            break Termination::MaxIterationsReached;
        }
    };

    let Some(&rmse) = state.history.last() else {
        return Err(IcpError::DegenerateCorrespondence {
            consecutive: state.consecutive_empty,
        });
    };
    if state.fallback_iterations == state.history.len() {
        return Err(state.last_fallback.unwrap_or(IcpError::SingularTransform));
    }

    Ok(IcpResult {
        transform: state.accumulated,
        rmse,
        num_iterations: state.iteration,
        termination,
        num_correspondences: state.num_correspondences,
        rmse_history: state.history,
        aligned_source: state.working,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn random_cloud(seed: u64, num_points: usize) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        PointCloud::from_points(
            (0..num_points)
                .map(|_| {
                    [
                        rng.random::<f64>(),
                        2.0 * rng.random::<f64>(),
                        0.5 * rng.random::<f64>(),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(IcpConfig::default().validate(), Ok(()));

        let bad = [
            IcpConfig {
                max_iterations: 0,
                ..Default::default()
            },
            IcpConfig {
                tolerance: 0.0,
                ..Default::default()
            },
            IcpConfig {
                tolerance: f64::NAN,
                ..Default::default()
            },
            IcpConfig {
                sampling: Sampling::Random(0),
                ..Default::default()
            },
            IcpConfig {
                max_correspondence_distance: Some(-1.0),
                ..Default::default()
            },
            IcpConfig {
                max_normal_angle: Some(f64::NAN),
                ..Default::default()
            },
        ];
        for config in bad.iter() {
            assert!(matches!(
                config.validate(),
                Err(IcpError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_config_json() -> Result<(), Box<dyn std::error::Error>> {
        let config: IcpConfig =
            serde_json::from_str(r#"{ "max_iterations": 10, "sampling": { "Random": 64 } }"#)?;
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.sampling, Sampling::Random(64));
        assert_eq!(config.tolerance, IcpConfig::default().tolerance);
        assert_eq!(config.initial_transform, RigidTransform::identity());

        let roundtrip: IcpConfig = serde_json::from_str(&serde_json::to_string(&config)?)?;
        assert_eq!(roundtrip, config);
        Ok(())
    }

    #[test]
    fn test_record_empty() {
        let source = random_cloud(0, 4);
        let mut state = RegistrationState::new(&source, &RigidTransform::identity());

        // one empty iteration is absorbed
        assert_eq!(state.record_empty(), Ok(()));
        state.consecutive_empty = 0;
        assert_eq!(state.record_empty(), Ok(()));
        // the next one in a row is not
        assert_eq!(
            state.record_empty(),
            Err(IcpError::DegenerateCorrespondence { consecutive: 2 })
        );
    }

    #[test]
    fn test_apply_increment_composes() -> Result<(), Box<dyn std::error::Error>> {
        let source = random_cloud(1, 10);
        let first = RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 0.2, [0.1, 0.0, 0.0])?;
        let second = RigidTransform::from_axis_angle(&[1.0, 0.0, 0.0], -0.1, [0.0, 0.3, 0.0])?;

        let mut state = RegistrationState::new(&source, &first);
        state.apply_increment(&second);

        let expected = source.transform(&state.accumulated);
        for (a, b) in state.working.points().iter().zip(expected.points().iter()) {
            for i in 0..3 {
                assert_relative_eq!(a[i], b[i], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_icp_identity() -> Result<(), IcpError> {
        let cloud = random_cloud(2, 100);
        let result = register_clouds(&cloud, &cloud, 20, Sampling::All, 1e-6)?;

        assert_eq!(result.termination, Termination::Converged);
        assert_eq!(result.num_iterations, 2);
        assert!(result.rmse < 1e-6);
        assert!(result.transform.rotation_angle() < 1e-9);
        assert_eq!(result.aligned_source, cloud);
        Ok(())
    }

    #[test]
    fn test_icp_initial_guess() -> Result<(), Box<dyn std::error::Error>> {
        let source = random_cloud(3, 200);
        let truth = RigidTransform::from_axis_angle(&[0.3, 0.2, 1.0], 0.8, [1.0, -2.0, 0.5])?;
        let target = source.transform(&truth);

        // the exact answer as initial guess leaves nothing to do
        let config = IcpConfig {
            initial_transform: truth,
            tolerance: 1e-9,
            ..Default::default()
        };
        let result = icp_point_to_point(&source, &target, &config)?;

        assert_eq!(result.termination, Termination::Converged);
        assert!(result.rmse < 1e-9);
        assert!(result.transform.angular_distance(&truth) < 1e-6);
        assert!(result.transform.translation_distance(&truth) < 1e-9);
        Ok(())
    }

    #[test]
    fn test_icp_max_iterations() -> Result<(), Box<dyn std::error::Error>> {
        let source = random_cloud(4, 200);
        let truth = RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 0.1, [0.05, 0.0, 0.0])?;
        let target = source.transform(&truth);

        let result = register_clouds(&source, &target, 1, Sampling::All, 1e-12)?;
        assert_eq!(result.termination, Termination::MaxIterationsReached);
        assert_eq!(result.num_iterations, 1);
        assert_eq!(result.rmse_history.len(), 1);
        Ok(())
    }

    #[test]
    fn test_icp_random_sampling_is_seeded() -> Result<(), Box<dyn std::error::Error>> {
        let source = random_cloud(5, 500);
        let truth = RigidTransform::from_axis_angle(&[1.0, 1.0, 0.0], 0.05, [0.02, 0.01, 0.0])?;
        let target = source.transform(&truth);

        let config = IcpConfig {
            sampling: Sampling::Random(100),
            random_seed: Some(17),
            max_iterations: 10,
            ..Default::default()
        };
        let a = icp_point_to_point(&source, &target, &config)?;
        let b = icp_point_to_point(&source, &target, &config)?;

        assert_eq!(a.rmse_history, b.rmse_history);
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.num_correspondences, 100);
        Ok(())
    }

    #[test]
    fn test_icp_empty_input() {
        let cloud = random_cloud(6, 10);
        let empty = PointCloud::from_points(vec![]);

        assert_eq!(
            register_clouds(&empty, &cloud, 10, Sampling::All, 1e-6).map(|r| r.rmse),
            Err(IcpError::EmptyInput(CloudRole::Source))
        );
        assert_eq!(
            register_clouds(&cloud, &empty, 10, Sampling::All, 1e-6).map(|r| r.rmse),
            Err(IcpError::EmptyInput(CloudRole::Target))
        );
    }

    #[test]
    fn test_icp_collinear_is_singular() {
        // different spacing keeps the two lines from ever matching exactly
        let line = PointCloud::from_points((0..20).map(|i| [i as f64 * 0.1, 0.0, 0.0]).collect());
        let other = PointCloud::from_points((0..20).map(|i| [i as f64 * 0.15, 0.5, 0.0]).collect());

        let res = register_clouds(&line, &other, 10, Sampling::All, 1e-6);
        assert_eq!(res.map(|r| r.rmse), Err(IcpError::SingularTransform));
    }

    #[test]
    fn test_icp_too_few_points_reports_cause() {
        for n in 1..3 {
            let cloud = random_cloud(7, n);
            let res = register_clouds(&cloud, &cloud, 6, Sampling::All, 1e-6);
            assert_eq!(
                res.map(|r| r.rmse),
                Err(IcpError::InsufficientCorrespondences(n))
            );
        }
    }

    #[test]
    fn test_fallback_steps_do_not_converge() -> Result<(), Box<dyn std::error::Error>> {
        // four matchable points and two that never match: a draw of four points
        // holds two to four pairs, so some iterations can only fall back
        let good = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.2, 0.0],
            [0.0, 0.0, 0.8],
        ];
        let target = PointCloud::from_points(good.clone());
        let mut points = good;
        points.push([100.0, 0.0, 0.0]);
        points.push([0.0, 100.0, 0.0]);
        let source = PointCloud::from_points(points);

        for seed in 0..20 {
            let config = IcpConfig {
                sampling: Sampling::Random(4),
                max_correspondence_distance: Some(1.0),
                max_iterations: 40,
                random_seed: Some(seed),
                ..Default::default()
            };
            let result = icp_point_to_point(&source, &target, &config)?;
            assert_eq!(result.termination, Termination::Converged);
            assert!(result.num_correspondences >= 3);
            assert!(result.transform.rotation_angle() < 1e-6);
        }
        Ok(())
    }
}
