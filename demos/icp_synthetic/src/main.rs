use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;

use pcreg::icp::{self as picp, IcpConfig, Sampling};
use pcreg::k3d::{pointcloud::PointCloud, transforms::RigidTransform};

#[derive(FromArgs)]
/// Register a synthetic surface against a rigidly moved copy of itself
struct Args {
    /// number of points in the source cloud
    #[argh(option, default = "5000")]
    num_points: usize,

    /// rotation angle in radians of the ground truth transform
    #[argh(option, default = "0.1")]
    angle: f64,

    /// standard deviation of the noise added to the target points
    #[argh(option, default = "0.0")]
    noise: f64,

    /// number of source points sampled per iteration, all points if not set
    #[argh(option)]
    sample_size: Option<usize>,

    /// seed for the data generation and the sampling
    #[argh(option, default = "42")]
    seed: u64,

    /// path to a JSON file with the registration parameters
    #[argh(option)]
    config: Option<PathBuf>,
}

/// A bumpy height field z = f(x, y) with its unit normals.
fn create_surface(
    rng: &mut StdRng,
    num_points: usize,
) -> Result<PointCloud, Box<dyn std::error::Error>> {
    let mut points = Vec::with_capacity(num_points);
    let mut normals = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let x: f64 = rng.random_range(-1.0..1.0);
        let y: f64 = rng.random_range(-1.5..1.5);
        let z = 0.2 * (3.0 * x).sin() * (2.0 * y).cos() + 0.1 * x * y;

        // gradient of z - f(x, y)
        let dzdx = 0.6 * (3.0 * x).cos() * (2.0 * y).cos() + 0.1 * y;
        let dzdy = -0.4 * (3.0 * x).sin() * (2.0 * y).sin() + 0.1 * x;
        let norm = (dzdx * dzdx + dzdy * dzdy + 1.0).sqrt();

        points.push([x, y, z]);
        normals.push([-dzdx / norm, -dzdy / norm, 1.0 / norm]);
    }
    Ok(PointCloud::new(points, Some(normals))?)
}

fn add_noise(
    rng: &mut StdRng,
    cloud: &PointCloud,
    sigma: f64,
) -> Result<PointCloud, Box<dyn std::error::Error>> {
    if sigma <= 0.0 {
        return Ok(cloud.clone());
    }
    let (mut points, normals) = cloud.clone().into_parts();
    for p in points.iter_mut() {
        for v in p.iter_mut() {
            // sum of uniforms, close enough to a gaussian for a demo
            let n: f64 = (0..12).map(|_| rng.random::<f64>()).sum::<f64>() - 6.0;
            *v += sigma * n;
        }
    }
    Ok(PointCloud::new(points, normals)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            serde_json::from_reader::<_, IcpConfig>(std::io::BufReader::new(file))?
        }
        None => IcpConfig::default(),
    };
    if let Some(n) = args.sample_size {
        config.sampling = Sampling::Random(n);
    }
    config.random_seed.get_or_insert(args.seed);

    let mut rng = StdRng::seed_from_u64(args.seed);

    let source_cloud = create_surface(&mut rng, args.num_points)?;
    println!("Source cloud: #{} points", source_cloud.len());

    let truth =
        RigidTransform::from_axis_angle(&[0.3, -0.2, 1.0], args.angle, [0.05, -0.03, 0.02])?;
    let target_cloud = add_noise(&mut rng, &source_cloud.transform(&truth), args.noise)?;
    println!("Target cloud: #{} points", target_cloud.len());

    let result = picp::icp_point_to_point(&source_cloud, &target_cloud, &config)?;

    println!(
        "ICP finished after {} iterations ({:?}), rmse: {:.3e}, correspondences: {}",
        result.num_iterations, result.termination, result.rmse, result.num_correspondences
    );
    println!("Estimated transform: {:?}", result.transform);
    println!(
        "Error to ground truth: rotation {:.3e} rad, translation {:.3e}",
        result.transform.angular_distance(&truth),
        result.transform.translation_distance(&truth)
    );

    Ok(())
}
