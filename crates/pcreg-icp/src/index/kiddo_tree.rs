use kiddo::immutable::float::kdtree::ImmutableKdTree;

use super::{Neighbor, SpatialIndex};
use crate::{CloudRole, IcpError};

/// Nearest neighbor index backed by kiddo's immutable k-d tree.
///
/// Exact like [`super::KdTree`], but the order among equidistant points is left to kiddo.
pub struct KiddoIndex {
    tree: ImmutableKdTree<f64, u32, 3, 32>,
    len: usize,
}

impl KiddoIndex {
    /// Build the index over `points`.
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
        Ok(Self {
            tree: ImmutableKdTree::new_from_slice(points),
            len: points.len(),
        })
    }
}

impl SpatialIndex for KiddoIndex {
    fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor> {
        let nn = self.tree.nearest_one::<kiddo::SquaredEuclidean>(query);
        if !nn.distance.is_finite() {
            return None;
        }
        Some(Neighbor {
            index: nn.item as usize,
            distance: nn.distance.sqrt(),
        })
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KdTree;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_agrees_with_arena_tree() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(42);
        let points = (0..500)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect::<Vec<_>>();

        let kiddo_index = KiddoIndex::build(&points)?;
        let kd_tree = KdTree::build(&points)?;
        assert_eq!(kiddo_index.len(), 500);

        for _ in 0..100 {
            let query = [
                rng.random_range(-0.5..1.5),
                rng.random_range(-0.5..1.5),
                rng.random_range(-0.5..1.5),
            ];
            let a = kiddo_index.nearest(&query).unwrap();
            let b = kd_tree.nearest(&query).unwrap();
            assert!((a.distance - b.distance).abs() < 1e-12);
            assert_eq!(a.index, b.index);
        }
        Ok(())
    }

    #[test]
    fn test_ties_return_one_of_the_tied_points() -> Result<(), IcpError> {
        let points = vec![
            [5.0, 5.0, 5.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
            [1.0, 1.0, 1.0],
        ];
        let kiddo_index = KiddoIndex::build(&points)?;
        let nn = kiddo_index.nearest(&[1.0, 1.0, 1.0]).unwrap();
        // no lowest-index guarantee, only one of the duplicates
        assert!(nn.index == 1 || nn.index == 3);
        assert_eq!(nn.distance, 0.0);
        Ok(())
    }

    #[test]
    fn test_empty() {
        assert!(matches!(
            KiddoIndex::build(&[]),
            Err(IcpError::EmptyInput(CloudRole::Target))
        ));
    }
}
