//! Axis-aligned bounding boxes.
//!
//! Boxes always carry three slots; dimensions a mesh does not use hold
//! `(-inf, +inf)` so 1-D and 2-D geometry composes with 3-D queries. The
//! neutral element for reductions is [`BoundingBox::empty`] (`+inf, -inf`),
//! which an empty local mesh contributes without disturbing the global
//! result. The box is a Pod record so rank 0 pairs can exchange it directly.

use crate::algs::collective::{all_reduce_f64, ReduceOp};
use crate::algs::communicator::Communicator;
use crate::error::Result;
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Neutral element: contains nothing, merges as identity.
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// Box over the first `dim` coordinates; the rest stay unbounded.
    pub fn from_bounds(dim: usize, min: &[f64], max: &[f64]) -> Self {
        let mut b = Self {
            min: [f64::NEG_INFINITY; 3],
            max: [f64::INFINITY; 3],
        };
        for d in 0..dim {
            b.min[d] = min[d];
            b.max[d] = max[d];
        }
        b
    }

    /// Smallest box around one point (unused dimensions unbounded).
    pub fn around_point(dim: usize, point: &[f64]) -> Self {
        Self::from_bounds(dim, point, point)
    }

    /// True iff every supplied coordinate lies inside (closed interval).
    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &x)| self.min[d] <= x && x <= self.max[d])
    }

    /// Componentwise intersection, `None` when any slot has negative extent.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let mut out = Self::empty();
        for d in 0..3 {
            out.min[d] = self.min[d].max(other.min[d]);
            out.max[d] = self.max[d].min(other.max[d]);
            if out.min[d] > out.max[d] {
                return None;
            }
        }
        Some(out)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Grow this box to cover `other`.
    pub fn merge(&mut self, other: &Self) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    /// Grow this box to cover `point`.
    pub fn merge_point(&mut self, point: &[f64]) {
        for (d, &x) in point.iter().enumerate() {
            self.min[d] = self.min[d].min(x);
            self.max[d] = self.max[d].max(x);
        }
    }

    /// Open up the slots past `dim` so a box accumulated from `dim`-sized
    /// points composes with 3-D intersection tests (unused dimensions carry
    /// `(-inf, +inf)` by convention, but accumulation starts from the empty
    /// box, which leaves them inverted).
    pub fn with_unused_unbounded(mut self, dim: usize) -> Self {
        for d in dim..3 {
            self.min[d] = f64::NEG_INFINITY;
            self.max[d] = f64::INFINITY;
        }
        self
    }

    /// Pad every finite face outward by `eps`.
    pub fn expand(&self, eps: f64) -> Self {
        let mut out = *self;
        for d in 0..3 {
            if out.min[d].is_finite() {
                out.min[d] -= eps;
            }
            if out.max[d].is_finite() {
                out.max[d] += eps;
            }
        }
        out
    }

    /// Longest finite edge, 0 for a degenerate or empty box.
    pub fn max_extent(&self) -> f64 {
        let mut ext: f64 = 0.0;
        for d in 0..3 {
            let e = self.max[d] - self.min[d];
            if e.is_finite() {
                ext = ext.max(e);
            }
        }
        ext
    }

    /// Componentwise reduction of per-rank boxes into the communicator-wide
    /// tightest enclosing box. Collective.
    pub fn global_bounds<C: Communicator>(comm: &C, local: &Self) -> Result<Self> {
        let mut min = local.min;
        let mut max = local.max;
        all_reduce_f64(comm, ReduceOp::Min, &mut min)?;
        all_reduce_f64(comm, ReduceOp::Max, &mut max)?;
        Ok(Self { min, max })
    }
}
