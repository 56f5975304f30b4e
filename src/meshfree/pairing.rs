//! Neighborhood lists for the spline operators.
//!
//! For each local query point, the pairing enumerates the gathered support
//! centers within the basis radius. Neighbor lists are sorted by the global
//! ordinal of the support center, so operator assembly visits nonzeros in the
//! same order on every run and the matrices are bit-identical for a fixed
//! partitioning.

use crate::geometry::{BoundingBox, KdItem, KdTree};
use rayon::prelude::*;

pub struct SplinePairing {
    children: Vec<Vec<usize>>,
}

impl SplinePairing {
    /// `support_centers` and `query_centers` are interleaved; `support_gids`
    /// aligns with `support_centers` and orders each neighbor list.
    pub fn new(
        dim: usize,
        support_centers: &[f64],
        support_gids: &[u64],
        query_centers: &[f64],
        radius: f64,
    ) -> Self {
        let num_support = support_centers.len() / dim.max(1);
        debug_assert_eq!(support_gids.len(), num_support);

        let items: Vec<KdItem> = support_centers
            .chunks(dim)
            .enumerate()
            .map(|(i, p)| {
                let mut centroid = [0.0f64; 3];
                centroid[..dim].copy_from_slice(p);
                KdItem {
                    index: i,
                    handle: support_gids[i],
                    centroid,
                    bbox: BoundingBox::around_point(dim, p),
                }
            })
            .collect();
        let tree = KdTree::build(items, dim);

        let children: Vec<Vec<usize>> = query_centers
            .par_chunks(dim)
            .map(|point| {
                if tree.is_empty() {
                    return Vec::new();
                }
                let mut neighbors = tree.within_radius(point, radius);
                neighbors.sort_by_key(|&i| support_gids[i]);
                neighbors
            })
            .collect();

        Self { children }
    }

    pub fn num_queries(&self) -> usize {
        self.children.len()
    }

    /// Indices (into the gathered support list) of the neighbors of query
    /// point `i`, sorted by global support ordinal.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.children[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_within_radius_only() {
        let support = [0.0, 1.0, 2.0, 3.0];
        let gids = [10, 11, 12, 13];
        let queries = [0.1, 2.9];
        let pairing = SplinePairing::new(1, &support, &gids, &queries, 1.0);

        assert_eq!(pairing.num_queries(), 2);
        assert_eq!(pairing.neighbors(0), &[0, 1]);
        assert_eq!(pairing.neighbors(1), &[2, 3]);
    }

    #[test]
    fn neighbor_lists_sort_by_gid_not_position() {
        // gids deliberately out of order relative to positions
        let support = [0.0, 0.5, 1.0];
        let gids = [30, 10, 20];
        let queries = [0.5];
        let pairing = SplinePairing::new(1, &support, &gids, &queries, 2.0);
        assert_eq!(pairing.neighbors(0), &[1, 2, 0]);
    }

    #[test]
    fn empty_support_gives_empty_lists() {
        let pairing = SplinePairing::new(2, &[], &[], &[0.0, 0.0], 1.0);
        assert_eq!(pairing.num_queries(), 1);
        assert!(pairing.neighbors(0).is_empty());
    }
}
