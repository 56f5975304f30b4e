//! The user-mesh adapter contract and its concrete in-memory form.
//!
//! A mesh block is a contiguous run of same-topology elements on one rank.
//! Adapters expose raw block-strided arrays (all x-coordinates, then all y,
//! then all z; connectivity likewise: all first vertices, then all second
//! vertices, ...). The core is compiled once against the [`MeshBlockView`]
//! vtable; a virtual call per element iteration is noise next to the
//! communication the pipeline does.

use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;
use crate::topology::ElementTopology;

/// Read-only view of one mesh block. Handles are 64-bit and globally unique
/// within their category; connectivity may reference vertices owned by other
/// ranks (ghosting is resolved at rendezvous time).
pub trait MeshBlockView: Send + Sync {
    /// Spatial dimension of the vertex coordinates, 1..=3.
    fn vertex_dim(&self) -> usize;
    /// Topology shared by every element in the block.
    fn topology(&self) -> ElementTopology;
    /// Vertex handles, length `Nv`.
    fn vertex_handles(&self) -> &[u64];
    /// Block-strided coordinates, length `vertex_dim * Nv`.
    fn coordinates(&self) -> &[f64];
    /// Element handles, length `Ne`.
    fn element_handles(&self) -> &[u64];
    /// Block-strided connectivity, length `vpE * Ne`; entries are vertex
    /// handles.
    fn connectivity(&self) -> &[u64];
    /// Length `vpE`; entry `k` is the canonical slot of the caller's `k`-th
    /// connectivity vertex (see [`crate::topology::cell_type`]).
    fn permutation(&self) -> &[usize];

    fn vertices_per_element(&self) -> usize {
        self.topology().num_vertices()
    }

    fn num_vertices(&self) -> usize {
        self.vertex_handles().len()
    }

    fn num_elements(&self) -> usize {
        self.element_handles().len()
    }

    /// Canonical-ordered vertex handles of element `e`.
    fn element_vertices(&self, e: usize) -> Vec<u64> {
        let vpe = self.vertices_per_element();
        let ne = self.num_elements();
        let conn = self.connectivity();
        let perm = self.permutation();
        let mut out = vec![0u64; vpe];
        for k in 0..vpe {
            out[perm[k]] = conn[k * ne + e];
        }
        out
    }

    /// Tightest box around the block's local vertices; slots past the vertex
    /// dimension stay unbounded so the box composes with 3-D queries.
    fn local_bounds(&self) -> BoundingBox {
        let dim = self.vertex_dim();
        let nv = self.num_vertices();
        let coords = self.coordinates();
        let mut bounds = BoundingBox::empty();
        let mut point = [0.0f64; 3];
        for v in 0..nv {
            for d in 0..dim {
                point[d] = coords[d * nv + v];
            }
            bounds.merge_point(&point[..dim]);
        }
        bounds.with_unused_unbounded(dim)
    }
}

/// Owned mesh block; the crate's reference implementation of the adapter.
#[derive(Debug, Clone)]
pub struct MeshBlock {
    dim: usize,
    topology: ElementTopology,
    vertex_handles: Vec<u64>,
    coordinates: Vec<f64>,
    element_handles: Vec<u64>,
    connectivity: Vec<u64>,
    permutation: Vec<usize>,
}

impl MeshBlock {
    /// Validates array shapes up front so later stages can index freely.
    pub fn new(
        dim: usize,
        topology: ElementTopology,
        vertex_handles: Vec<u64>,
        coordinates: Vec<f64>,
        element_handles: Vec<u64>,
        connectivity: Vec<u64>,
        permutation: Vec<usize>,
    ) -> Result<Self> {
        if dim == 0 || dim > 3 {
            return Err(TransferError::DimensionMismatch {
                expected: 3,
                got: dim,
            });
        }
        let nv = vertex_handles.len();
        if coordinates.len() != dim * nv {
            return Err(TransferError::RaggedBlock {
                context: "vertex coordinates",
                expected: dim * nv,
                got: coordinates.len(),
            });
        }
        let vpe = topology.num_vertices();
        let ne = element_handles.len();
        if connectivity.len() != vpe * ne {
            return Err(TransferError::RaggedBlock {
                context: "connectivity",
                expected: vpe * ne,
                got: connectivity.len(),
            });
        }
        if permutation.len() != vpe {
            return Err(TransferError::RaggedBlock {
                context: "permutation",
                expected: vpe,
                got: permutation.len(),
            });
        }
        let mut seen = vec![false; vpe];
        for &p in &permutation {
            if p >= vpe || seen[p] {
                return Err(TransferError::InvalidPermutation { vpe });
            }
            seen[p] = true;
        }
        Ok(Self {
            dim,
            topology,
            vertex_handles,
            coordinates,
            element_handles,
            connectivity,
            permutation,
        })
    }

    /// Identity permutation helper for adapters already in canonical order.
    pub fn identity_permutation(topology: ElementTopology) -> Vec<usize> {
        (0..topology.num_vertices()).collect()
    }
}

impl MeshBlockView for MeshBlock {
    fn vertex_dim(&self) -> usize {
        self.dim
    }
    fn topology(&self) -> ElementTopology {
        self.topology
    }
    fn vertex_handles(&self) -> &[u64] {
        &self.vertex_handles
    }
    fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }
    fn element_handles(&self) -> &[u64] {
        &self.element_handles
    }
    fn connectivity(&self) -> &[u64] {
        &self.connectivity
    }
    fn permutation(&self) -> &[usize] {
        &self.permutation
    }
}
