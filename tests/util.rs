//! Shared builders for the transfer scenario tests.
#![allow(dead_code)]

use mesh_transfer::data::FieldEvaluator;
use mesh_transfer::error::Result;
use mesh_transfer::mesh::{MeshBlock, MeshManager};
use mesh_transfer::topology::ElementTopology;

/// A unit-footprint hexahedron spanning `[0,1]^2 x [zmin, zmax]`, with
/// vertex handles shared across stacked hexes (layer `L`, corner `c` gets
/// handle `1 + 4L + c`, corners in the canonical bottom cycle).
pub fn stacked_hex_block(layer: u64, element_handle: u64) -> MeshBlock {
    let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
    let mut handles = Vec::with_capacity(8);
    let mut xs = Vec::with_capacity(8);
    let mut ys = Vec::with_capacity(8);
    let mut zs = Vec::with_capacity(8);
    for (level, z) in [(layer, layer as f64), (layer + 1, layer as f64 + 1.0)] {
        for (c, &(x, y)) in corners.iter().enumerate() {
            handles.push(1 + 4 * level + c as u64);
            xs.push(x);
            ys.push(y);
            zs.push(z);
        }
    }
    let mut coords = xs;
    coords.extend(ys);
    coords.extend(zs);

    // one element: block-strided connectivity is just the canonical order
    let connectivity = handles.clone();
    MeshBlock::new(
        3,
        ElementTopology::Hex,
        handles,
        coords,
        vec![element_handle],
        connectivity,
        MeshBlock::identity_permutation(ElementTopology::Hex),
    )
    .expect("valid hex block")
}

pub fn hex_manager(layer: u64, element_handle: u64) -> MeshManager {
    MeshManager::new(vec![Box::new(stacked_hex_block(layer, element_handle))], 3)
        .expect("valid manager")
}

/// One 1-D segment `[x0, x1]`.
pub fn segment_manager(x0: f64, x1: f64, element_handle: u64) -> MeshManager {
    let block = MeshBlock::new(
        1,
        ElementTopology::Line,
        vec![1, 2],
        vec![x0, x1],
        vec![element_handle],
        vec![1, 2],
        MeshBlock::identity_permutation(ElementTopology::Line),
    )
    .expect("valid segment block");
    MeshManager::new(vec![Box::new(block)], 1).expect("valid manager")
}

/// Evaluates the affine field `offset + coeff . x`, exactly representable by
/// every linear/multilinear reference basis.
pub struct AffineEvaluator {
    pub coeff: [f64; 3],
    pub offset: f64,
}

impl FieldEvaluator for AffineEvaluator {
    fn field_dim(&self) -> usize {
        1
    }

    fn evaluate(&self, elements: &[u64], coords: &[f64], space_dim: usize) -> Result<Vec<f64>> {
        let n = elements.len();
        let mut out = vec![self.offset; n];
        for i in 0..n {
            for d in 0..space_dim {
                out[i] += self.coeff[d] * coords[d * n + i];
            }
        }
        Ok(out)
    }
}

/// Block-stride a list of points (3 slots each; slots past `dim` ignored).
pub fn block_strided(points: &[[f64; 3]], dim: usize) -> Vec<f64> {
    let n = points.len();
    let mut out = vec![0.0; dim * n];
    for (i, p) in points.iter().enumerate() {
        for d in 0..dim {
            out[d * n + i] = p[d];
        }
    }
    out
}
