//! Balanced kD-tree over element centroids.
//!
//! The rendezvous decomposition answers "which element contains this point"
//! against its local element set. The tree is median-split on the centroid
//! coordinate (axis rotating with depth, flat `Vec` of nodes); every node
//! additionally carries the bounding box of all elements in its subtree, so a
//! containment query only descends branches whose box covers the query point.
//! The exact point-in-element test is supplied by the caller as a closure:
//! the tree knows geometry, not topology.

use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;

/// One indexed element: local index, handle (for deterministic tie-breaks),
/// centroid, and the element's own bounding box.
#[derive(Debug, Clone)]
pub struct KdItem {
    pub index: usize,
    pub handle: u64,
    pub centroid: [f64; 3],
    pub bbox: BoundingBox,
}

#[derive(Debug)]
struct KdNode {
    item: KdItem,
    /// Bounding box of every element in this subtree.
    subtree_bbox: BoundingBox,
    left: Option<usize>,
    right: Option<usize>,
}

/// Spatial index over a fixed element set.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    dim: usize,
    root: Option<usize>,
}

impl KdTree {
    /// Build over `items`; `dim` is the number of active coordinates.
    pub fn build(mut items: Vec<KdItem>, dim: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(items.len()),
            dim,
            root: None,
        };
        tree.root = tree.build_rec(&mut items, 0);
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn build_rec(&mut self, items: &mut [KdItem], depth: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let axis = depth % self.dim;
        items.sort_by(|a, b| {
            a.centroid[axis]
                .partial_cmp(&b.centroid[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = items.len() / 2;

        let node_index = self.nodes.len();
        let item = items[mid].clone();
        let bbox = item.bbox;
        self.nodes.push(KdNode {
            item,
            subtree_bbox: bbox,
            left: None,
            right: None,
        });

        let (lo, rest) = items.split_at_mut(mid);
        let hi = &mut rest[1..];
        let left = self.build_rec(lo, depth + 1);
        let right = self.build_rec(hi, depth + 1);

        let mut subtree_bbox = self.nodes[node_index].subtree_bbox;
        if let Some(l) = left {
            let child = self.nodes[l].subtree_bbox;
            subtree_bbox.merge(&child);
        }
        if let Some(r) = right {
            let child = self.nodes[r].subtree_bbox;
            subtree_bbox.merge(&child);
        }
        let node = &mut self.nodes[node_index];
        node.subtree_bbox = subtree_bbox;
        node.left = left;
        node.right = right;
        Some(node_index)
    }

    /// Find the element containing `point`, testing candidates with `test`
    /// (called with the item's `index`). Elements sharing a boundary point
    /// are disambiguated deterministically: the smallest handle wins.
    pub fn containing_element<F>(&self, point: &[f64], mut test: F) -> Result<Option<usize>>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        if self.nodes.is_empty() {
            return Err(TransferError::EmptyTree {
                context: "kd-tree containment query",
            });
        }
        let mut best: Option<(u64, usize)> = None;
        self.containing_rec(self.root, point, &mut test, &mut best)?;
        Ok(best.map(|(_, index)| index))
    }

    fn containing_rec<F>(
        &self,
        node: Option<usize>,
        point: &[f64],
        test: &mut F,
        best: &mut Option<(u64, usize)>,
    ) -> Result<()>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        let Some(ni) = node else { return Ok(()) };
        let n = &self.nodes[ni];
        if !n.subtree_bbox.contains(point) {
            return Ok(());
        }
        if n.item.bbox.contains(point) && test(n.item.index)? {
            let candidate = (n.item.handle, n.item.index);
            if best.map_or(true, |(h, _)| candidate.0 < h) {
                *best = Some(candidate);
            }
        }
        self.containing_rec(n.left, point, test, best)?;
        self.containing_rec(n.right, point, test, best)
    }

    /// Indices of all items whose centroid lies within `radius` of `point`
    /// (Euclidean), in tree order.
    pub fn within_radius(&self, point: &[f64], radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        self.radius_rec(self.root, point, radius, 0, &mut out);
        out
    }

    fn radius_rec(
        &self,
        node: Option<usize>,
        point: &[f64],
        radius: f64,
        depth: usize,
        out: &mut Vec<usize>,
    ) {
        let Some(ni) = node else { return };
        let n = &self.nodes[ni];
        let dist2: f64 = (0..self.dim)
            .map(|d| (point[d] - n.item.centroid[d]).powi(2))
            .sum();
        if dist2 <= radius * radius {
            out.push(n.item.index);
        }
        let axis = depth % self.dim;
        let diff = point[axis] - n.item.centroid[axis];
        if diff <= radius {
            self.radius_rec(n.left, point, radius, depth + 1, out);
        }
        if -diff <= radius {
            self.radius_rec(n.right, point, radius, depth + 1, out);
        }
    }

    /// Element whose centroid is nearest to `point` (diagnostics).
    pub fn nearest_element(&self, point: &[f64]) -> Option<usize> {
        let root = self.root?;
        let mut best = (f64::INFINITY, 0usize);
        self.nearest_rec(Some(root), point, 0, &mut best);
        Some(best.1)
    }

    fn nearest_rec(
        &self,
        node: Option<usize>,
        point: &[f64],
        depth: usize,
        best: &mut (f64, usize),
    ) {
        let Some(ni) = node else { return };
        let n = &self.nodes[ni];
        let dist2: f64 = (0..self.dim)
            .map(|d| (point[d] - n.item.centroid[d]).powi(2))
            .sum();
        if dist2 < best.0 {
            *best = (dist2, n.item.index);
        }
        let axis = depth % self.dim;
        let diff = point[axis] - n.item.centroid[axis];
        let (near, far) = if diff < 0.0 {
            (n.left, n.right)
        } else {
            (n.right, n.left)
        };
        self.nearest_rec(near, point, depth + 1, best);
        if diff * diff < best.0 {
            self.nearest_rec(far, point, depth + 1, best);
        }
    }
}
