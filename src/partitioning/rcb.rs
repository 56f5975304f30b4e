//! Recursive coordinate bisection over distributed point sets.
//!
//! The partitioner splits a weighted point cloud into `parts` cells by
//! bisecting along coordinate axes that rotate with recursion depth. Cuts are
//! found by a bisection search on the cut coordinate; each probe combines
//! per-rank partial weights with an all-reduce, so the same cut is computed
//! on every rank and the resulting [`RcbTree`] is replicated, so any rank can
//! answer `rank_of` for any query point without further communication.
//!
//! Determinism: the algorithm has no random state. Ties (a coordinate equal
//! to a cut) always go to the left cell, both during assignment and in
//! `rank_of`, so assignment and lookup agree exactly.

use crate::algs::collective::{sum_f64, sum_u64};
use crate::algs::communicator::Communicator;
use crate::error::Result;
use crate::geometry::BoundingBox;
use rayon::prelude::*;

/// Tuning knobs; the defaults implement the documented behavior.
#[derive(Debug, Clone)]
pub struct RcbConfig {
    /// Per-cell weight imbalance goal, as a fraction of the ideal weight.
    /// A soft target: the bisection search stops refining once it is met.
    pub balance_tolerance: f64,
    /// Hard cap on bisection probes per cut.
    pub max_bisection_iters: usize,
}

impl Default for RcbConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: 0.10,
            max_bisection_iters: 64,
        }
    }
}

#[derive(Debug, Clone)]
enum RcbNode {
    Split {
        axis: usize,
        cut: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        part: usize,
    },
}

/// Replicated bisection tree: maps any point to its cell's part id.
#[derive(Debug, Clone)]
pub struct RcbTree {
    nodes: Vec<RcbNode>,
    root: usize,
    boxes: Vec<BoundingBox>,
    parts: usize,
}

impl RcbTree {
    /// Part owning `point`. Total: every point maps to exactly one part.
    pub fn rank_of(&self, point: &[f64]) -> usize {
        let mut node = self.root;
        loop {
            match &self.nodes[node] {
                RcbNode::Leaf { part } => return *part,
                RcbNode::Split {
                    axis, cut, left, right,
                } => {
                    node = if point[*axis] <= *cut { *left } else { *right };
                }
            }
        }
    }

    /// The cell box of `part`, clipped to the domain the tree was built over.
    pub fn part_box(&self, part: usize) -> &BoundingBox {
        &self.boxes[part]
    }

    pub fn num_parts(&self) -> usize {
        self.parts
    }

    /// All parts whose cell intersects `bbox`, ascending.
    pub fn parts_intersecting(&self, bbox: &BoundingBox) -> Vec<usize> {
        let mut out = Vec::new();
        self.intersect_rec(self.root, bbox, &mut out);
        out.sort_unstable();
        out
    }

    fn intersect_rec(&self, node: usize, bbox: &BoundingBox, out: &mut Vec<usize>) {
        match &self.nodes[node] {
            RcbNode::Leaf { part } => out.push(*part),
            RcbNode::Split {
                axis, cut, left, right,
            } => {
                if bbox.min[*axis] <= *cut {
                    self.intersect_rec(*left, bbox, out);
                }
                if bbox.max[*axis] >= *cut {
                    self.intersect_rec(*right, bbox, out);
                }
            }
        }
    }
}

struct RcbBuilder<'a, C: Communicator> {
    comm: &'a C,
    dim: usize,
    /// Block-strided local coordinates: all x, then all y, then all z.
    coords: &'a [f64],
    npoints: usize,
    weights: &'a [f64],
    cfg: &'a RcbConfig,
    nodes: Vec<RcbNode>,
    boxes: Vec<BoundingBox>,
    dest: Vec<usize>,
}

impl<'a, C: Communicator> RcbBuilder<'a, C> {
    fn coord(&self, point: usize, axis: usize) -> f64 {
        self.coords[axis * self.npoints + point]
    }

    /// Recursively split `members` over parts `[part_lo, part_hi)`.
    fn split(
        &mut self,
        part_lo: usize,
        part_hi: usize,
        cell: BoundingBox,
        members: Vec<usize>,
        depth: usize,
    ) -> Result<usize> {
        if part_hi - part_lo == 1 {
            for &m in &members {
                self.dest[m] = part_lo;
            }
            self.boxes[part_lo] = cell;
            let node = self.nodes.len();
            self.nodes.push(RcbNode::Leaf { part: part_lo });
            return Ok(node);
        }

        let nparts = part_hi - part_lo;
        let left_parts = nparts.div_ceil(2);
        let axis = depth % self.dim;

        let local_weight: f64 = members.iter().map(|&m| self.weights[m]).sum();
        let total = sum_f64(self.comm, local_weight)?;
        let target = total * left_parts as f64 / nparts as f64;
        let slack = 0.5 * self.cfg.balance_tolerance * total / nparts as f64;

        let mut cut = if total == 0.0 {
            0.5 * (cell.min[axis] + cell.max[axis])
        } else {
            self.find_cut(axis, &members, &cell, target, slack)?
        };
        // degenerate (empty or unbounded) cells still need a usable cut
        if !cut.is_finite() {
            cut = 0.0;
        }

        let (left_members, right_members): (Vec<usize>, Vec<usize>) = members
            .into_iter()
            .partition(|&m| self.coord(m, axis) <= cut);

        let mut left_cell = cell;
        left_cell.max[axis] = cut;
        let mut right_cell = cell;
        right_cell.min[axis] = cut;

        let node = self.nodes.len();
        self.nodes.push(RcbNode::Leaf { part: usize::MAX }); // placeholder
        let left = self.split(part_lo, part_lo + left_parts, left_cell, left_members, depth + 1)?;
        let right = self.split(part_lo + left_parts, part_hi, right_cell, right_members, depth + 1)?;
        self.nodes[node] = RcbNode::Split {
            axis,
            cut,
            left,
            right,
        };
        Ok(node)
    }

    /// Bisection search for the cut that puts `target` weight on the left.
    /// Every probe is collective, so the loop exit must depend only on
    /// globally reduced values.
    fn find_cut(
        &self,
        axis: usize,
        members: &[usize],
        cell: &BoundingBox,
        target: f64,
        slack: f64,
    ) -> Result<f64> {
        let mut lo = cell.min[axis];
        let mut hi = cell.max[axis];
        let mut cut = 0.5 * (lo + hi);
        for _ in 0..self.cfg.max_bisection_iters {
            cut = 0.5 * (lo + hi);
            let local: f64 = members
                .par_iter()
                .map(|&m| {
                    if self.coord(m, axis) <= cut {
                        self.weights[m]
                    } else {
                        0.0
                    }
                })
                .sum();
            let left_weight = sum_f64(self.comm, local)?;
            if (left_weight - target).abs() <= slack {
                break;
            }
            if left_weight < target {
                lo = cut;
            } else {
                hi = cut;
            }
        }
        Ok(cut)
    }
}

/// Partition the local point set (block-strided `coords`, `dim` axes) into
/// `parts` cells over `domain`. Returns the destination part of every local
/// point and the replicated lookup tree. Collective; ranks with no local
/// points pass an empty slice and still participate.
pub fn rcb_partition<C: Communicator>(
    comm: &C,
    dim: usize,
    coords: &[f64],
    weights: Option<&[f64]>,
    domain: &BoundingBox,
    parts: usize,
    cfg: &RcbConfig,
) -> Result<(Vec<usize>, RcbTree)> {
    debug_assert!((1..=3).contains(&dim));
    let npoints = coords.len() / dim;
    let unit;
    let weights = match weights {
        Some(w) => w,
        None => {
            unit = vec![1.0; npoints];
            &unit
        }
    };

    let mut builder = RcbBuilder {
        comm,
        dim,
        coords,
        npoints,
        weights,
        cfg,
        nodes: Vec::new(),
        boxes: vec![BoundingBox::empty(); parts],
        dest: vec![usize::MAX; npoints],
    };
    let members: Vec<usize> = (0..npoints).collect();
    let root = builder.split(0, parts, *domain, members, 0)?;

    let global_points = sum_u64(comm, npoints as u64)?;
    log::debug!(
        "rcb: {} global points into {} parts (local {})",
        global_points,
        parts,
        npoints
    );

    let tree = RcbTree {
        nodes: builder.nodes,
        root,
        boxes: builder.boxes,
        parts,
    };
    Ok((builder.dest, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn block_strided(points: &[[f64; 2]]) -> Vec<f64> {
        let n = points.len();
        let mut out = vec![0.0; 2 * n];
        for (i, p) in points.iter().enumerate() {
            out[i] = p[0];
            out[n + i] = p[1];
        }
        out
    }

    #[test]
    fn every_point_lands_in_its_looked_up_part() {
        let comm = NoComm;
        let pts: Vec<[f64; 2]> = (0..32)
            .map(|i| [(i % 8) as f64, (i / 8) as f64])
            .collect();
        let coords = block_strided(&pts);
        let domain = BoundingBox::from_bounds(2, &[0.0, 0.0], &[7.0, 3.0]);
        let (dest, tree) =
            rcb_partition(&comm, 2, &coords, None, &domain, 4, &RcbConfig::default()).unwrap();

        assert_eq!(dest.len(), 32);
        for (i, p) in pts.iter().enumerate() {
            assert_eq!(tree.rank_of(p), dest[i], "point {p:?}");
            assert!(tree.part_box(dest[i]).contains(p));
        }
    }

    #[test]
    fn parts_are_roughly_balanced() {
        let comm = NoComm;
        let pts: Vec<[f64; 2]> = (0..64)
            .map(|i| [(i % 16) as f64 * 0.25, (i / 16) as f64 * 0.25])
            .collect();
        let coords = block_strided(&pts);
        let domain = BoundingBox::from_bounds(2, &[0.0, 0.0], &[3.75, 0.75]);
        let (dest, _) =
            rcb_partition(&comm, 2, &coords, None, &domain, 4, &RcbConfig::default()).unwrap();

        let mut counts = [0usize; 4];
        for &d in &dest {
            counts[d] += 1;
        }
        for &c in &counts {
            // 64 points over 4 parts, 10% goal
            assert!((c as i64 - 16).unsigned_abs() <= 2, "counts {counts:?}");
        }
    }

    #[test]
    fn ties_on_the_cut_go_left() {
        let comm = NoComm;
        // the first probe at 0.5 balances exactly, so the cut is exactly 0.5
        // and the point sitting on it must go left
        let coords = vec![0.25, 0.5, 0.75, 1.0];
        let domain = BoundingBox::from_bounds(1, &[0.0], &[1.0]);
        let (dest, tree) =
            rcb_partition(&comm, 1, &coords, None, &domain, 2, &RcbConfig::default()).unwrap();
        assert_eq!(dest, vec![0, 0, 1, 1]);
        assert_eq!(tree.rank_of(&[0.5]), 0);
    }

    #[test]
    fn intersecting_parts_cover_a_straddling_box() {
        let comm = NoComm;
        let coords = vec![0.0, 1.0, 2.0, 3.0];
        let domain = BoundingBox::from_bounds(1, &[0.0], &[3.0]);
        let (_, tree) =
            rcb_partition(&comm, 1, &coords, None, &domain, 2, &RcbConfig::default()).unwrap();

        let straddle = BoundingBox::from_bounds(1, &[1.2], &[1.9]);
        let parts = tree.parts_intersecting(&straddle);
        assert!(parts.contains(&tree.rank_of(&[1.2])));
        assert!(parts.contains(&tree.rank_of(&[1.9])));
    }

    #[test]
    fn empty_input_still_partitions_the_domain() {
        let comm = NoComm;
        let domain = BoundingBox::from_bounds(2, &[0.0, 0.0], &[1.0, 1.0]);
        let (dest, tree) =
            rcb_partition(&comm, 2, &[], None, &domain, 4, &RcbConfig::default()).unwrap();
        assert!(dest.is_empty());
        assert_eq!(tree.num_parts(), 4);
        // lookup still total
        let _ = tree.rank_of(&[0.5, 0.5]);
    }
}
