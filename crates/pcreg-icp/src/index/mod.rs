//! Nearest neighbor search over the target cloud.
//!
//! Two backends are provided: [`KdTree`], an exact k-d tree stored as a node arena with
//! deterministic tie breaking, and [`KiddoIndex`], a thin wrapper around
//! [`kiddo::immutable::float::kdtree::ImmutableKdTree`].

use serde::{Deserialize, Serialize};

use crate::IcpError;

mod kdtree;
pub use kdtree::KdTree;

mod kiddo_tree;
pub use kiddo_tree::KiddoIndex;

/// Result of a nearest neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the indexed point set.
    pub index: usize,
    /// Euclidean distance between the query and the neighbor.
    pub distance: f64,
}

/// A read-only nearest neighbor index built once over a point set.
///
/// Implementations must be safe to query from several threads at once.
pub trait SpatialIndex: Sync {
    /// Find the point closest to `query`, `None` only if the index is empty.
    fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor>;

    /// Number of indexed points.
    fn len(&self) -> usize;

    /// Check whether the index holds no points.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selects the nearest neighbor backend used by the registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexBackend {
    /// Arena k-d tree, exact, ties resolved to the lowest index.
    #[default]
    KdTree,
    /// kiddo immutable k-d tree, exact.
    ///
    /// Does not resolve ties to the lowest index: among equidistant target points any
    /// one may be returned, so results on data with exact ties can differ from
    /// [`IndexBackend::KdTree`].
    Kiddo,
}

/// Build the index selected by `backend` and hand it to `f`.
pub(crate) fn with_index<R>(
    backend: IndexBackend,
    points: &[[f64; 3]],
    f: impl FnOnce(&dyn SpatialIndex) -> Result<R, IcpError>,
) -> Result<R, IcpError> {
    match backend {
        IndexBackend::KdTree => f(&KdTree::build(points)?),
        IndexBackend::Kiddo => f(&KiddoIndex::build(points)?),
    }
}
