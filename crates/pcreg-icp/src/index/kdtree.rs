use pcreg_3d::ops::squared_euclidean_distance;

use super::{Neighbor, SpatialIndex};
use crate::{CloudRole, IcpError};

/// A node of the tree. Children are indices into the node arena.
#[derive(Debug, Clone)]
struct KdNode {
    // index of the splitting point in the point set
    point: u32,
    split_dimension: u8,
    left: Option<u32>,
    right: Option<u32>,
}

/// Exact k-d tree over a fixed set of 3D points.
///
/// Nodes live in a single arena and refer to each other by index. Each node splits on the
/// axis of largest extent of its subset, at the median point, so the tree is balanced.
///
/// Queries are deterministic: when several points are at the same distance from the query,
/// the one with the lowest index wins.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    nodes: Vec<KdNode>,
    root: Option<u32>,
}

impl KdTree {
    /// Build the tree over `points`.
    ///
    /// Fails with [`IcpError::EmptyInput`] if `points` is empty.
    pub fn build(points: &[[f64; 3]]) -> Result<Self, IcpError> {
        if points.is_empty() {
            return Err(IcpError::EmptyInput(CloudRole::Target));
        }
        if points.len() > u32::MAX as usize {
            return Err(IcpError::InvalidParameter {
                name: "points",
                reason: format!("at most {} points can be indexed", u32::MAX),
            });
        }

        let mut indices = (0..points.len() as u32).collect::<Vec<_>>();
        let mut nodes = Vec::with_capacity(points.len());
        let root = build_subtree(points, &mut indices, &mut nodes);

        Ok(Self {
            points: points.to_vec(),
            nodes,
            root,
        })
    }

    /// The indexed points, in their original order.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Depth of the tree, 1 for a single point.
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[KdNode], node: Option<u32>) -> usize {
            match node {
                None => 0,
                Some(id) => {
                    let n = &nodes[id as usize];
                    1 + depth_of(nodes, n.left).max(depth_of(nodes, n.right))
                }
            }
        }
        depth_of(&self.nodes, self.root)
    }

    fn search(&self, node_id: u32, query: &[f64; 3], best: &mut (u32, f64)) {
        let node = &self.nodes[node_id as usize];
        let point = &self.points[node.point as usize];

        let distance = squared_euclidean_distance(point, query);
        if distance < best.1 || (distance == best.1 && node.point < best.0) {
            *best = (node.point, distance);
        }

        let axis = node.split_dimension as usize;
        let split_distance = query[axis] - point[axis];

        // the left subtree holds coordinates <= split, the right one >= split
        let (nearer, further) = if split_distance <= 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near_node) = nearer {
            self.search(near_node, query, best);
        }

        // `<=` keeps equidistant candidates on the far side reachable for tie breaking
        if split_distance * split_distance <= best.1 {
            if let Some(further_node) = further {
                self.search(further_node, query, best);
            }
        }
    }
}

impl SpatialIndex for KdTree {
    /// Returns `None` if the query contains NaN.
    fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor> {
        let root = self.root?;
        let mut best = (u32::MAX, f64::INFINITY);
        self.search(root, query, &mut best);
        if best.0 == u32::MAX {
            return None;
        }
        Some(Neighbor {
            index: best.0 as usize,
            distance: best.1.sqrt(),
        })
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

fn widest_dimension(points: &[[f64; 3]], indices: &[u32]) -> usize {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for &i in indices {
        let p = &points[i as usize];
        for d in 0..3 {
            min[d] = min[d].min(p[d]);
            max[d] = max[d].max(p[d]);
        }
    }
    let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
    let mut widest = 0;
    for d in 1..3 {
        if extent[d] > extent[widest] {
            widest = d;
        }
    }
    widest
}

fn build_subtree(
    points: &[[f64; 3]],
    indices: &mut [u32],
    nodes: &mut Vec<KdNode>,
) -> Option<u32> {
    if indices.is_empty() {
        return None;
    }

    let split_dimension = widest_dimension(points, indices);

    // partition around the median along the split dimension
    let median_index = indices.len() / 2;
    indices.select_nth_unstable_by(median_index, |a, b| {
        points[*a as usize][split_dimension].total_cmp(&points[*b as usize][split_dimension])
    });

    let node_id = nodes.len() as u32;
    nodes.push(KdNode {
        point: indices[median_index],
        split_dimension: split_dimension as u8,
        left: None,
        right: None,
    });

    let (left_indices, rest) = indices.split_at_mut(median_index);
    let left = build_subtree(points, left_indices, nodes);
    let right = build_subtree(points, &mut rest[1..], nodes);

    let node = &mut nodes[node_id as usize];
    node.left = left;
    node.right = right;

    Some(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn brute_force(points: &[[f64; 3]], query: &[f64; 3]) -> (usize, f64) {
        let mut best = (usize::MAX, f64::INFINITY);
        for (i, p) in points.iter().enumerate() {
            let d = squared_euclidean_distance(p, query);
            if d < best.1 {
                best = (i, d);
            }
        }
        (best.0, best.1.sqrt())
    }

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<[f64; 3]> {
        (0..n)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect()
    }

    #[test]
    fn test_nearest_simple() -> Result<(), IcpError> {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let tree = KdTree::build(&points)?;
        assert_eq!(tree.len(), 4);

        let nn = tree.nearest(&[0.9, 0.1, 0.0]);
        assert_eq!(nn.map(|n| n.index), Some(1));

        let nn = tree.nearest(&[0.0, 0.0, 0.0]);
        assert_eq!(
            nn,
            Some(Neighbor {
                index: 0,
                distance: 0.0
            })
        );
        Ok(())
    }

    #[test]
    fn test_matches_brute_force() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_points(&mut rng, 1000);
        let tree = KdTree::build(&points)?;

        for query in random_points(&mut rng, 200) {
            let (index, distance) = brute_force(&points, &query);
            let nn = tree.nearest(&query).unwrap();
            assert_eq!(nn.index, index);
            assert!((nn.distance - distance).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() -> Result<(), IcpError> {
        // the same location appears several times
        let points = vec![
            [5.0, 5.0, 5.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        let tree = KdTree::build(&points)?;
        assert_eq!(tree.nearest(&[1.0, 1.0, 1.1]).map(|n| n.index), Some(1));

        // query exactly between two points
        let points = vec![[3.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let tree = KdTree::build(&points)?;
        assert_eq!(tree.nearest(&[0.0, 0.0, 0.0]).map(|n| n.index), Some(1));
        assert_eq!(tree.nearest(&[2.0, 0.0, 0.0]).map(|n| n.index), Some(0));
        Ok(())
    }

    #[test]
    fn test_grid_ties() -> Result<(), IcpError> {
        // a regular grid produces many equidistant candidates
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    points.push([x as f64, y as f64, z as f64]);
                }
            }
        }
        let tree = KdTree::build(&points)?;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            // half-integer queries sit at the same distance from up to eight points
            let query = [
                rng.random_range(0..8) as f64 * 0.5,
                rng.random_range(0..8) as f64 * 0.5,
                rng.random_range(0..8) as f64 * 0.5,
            ];
            let (index, _) = brute_force(&points, &query);
            assert_eq!(tree.nearest(&query).map(|n| n.index), Some(index));
        }
        Ok(())
    }

    #[test]
    fn test_balanced_depth() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(11);
        let tree = KdTree::build(&random_points(&mut rng, 1023))?;
        assert_eq!(tree.depth(), 10);
        Ok(())
    }

    #[test]
    fn test_empty_and_nan() -> Result<(), IcpError> {
        assert!(matches!(
            KdTree::build(&[]),
            Err(IcpError::EmptyInput(CloudRole::Target))
        ));

        let tree = KdTree::build(&[[0.0, 0.0, 0.0]])?;
        assert_eq!(tree.nearest(&[f64::NAN, 0.0, 0.0]), None);
        Ok(())
    }
}
