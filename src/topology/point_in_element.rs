//! Point-in-element queries.
//!
//! The test runs in two stages: invert the element's geometric map to obtain
//! reference coordinates, then check inclusion against the reference cell
//! with the caller's tolerance. A failed inversion (singular or divergent
//! map) reports "outside" rather than an error, since a badly shaped element must
//! not abort a whole search sweep.
//!
//! Pyramids cannot be inverted through the multilinear machinery, so they are
//! resolved as two linear tetrahedra sharing the apex and the `v0–v2` base
//! diagonal. The decomposition is fixed so results are deterministic:
//! tetrahedron 1 is `{v0, v1, v2, v4}`, tetrahedron 2 is `{v0, v2, v3, v4}`,
//! with `v4` the apex.

use crate::error::{Result, TransferError};
use crate::topology::reference_map::map_to_reference;
use crate::topology::ElementTopology;

const TET_1: [usize; 4] = [0, 1, 2, 4];
const TET_2: [usize; 4] = [0, 2, 3, 4];

/// Is `point` inside the element with the given canonical-ordered,
/// interleaved vertex coordinates? `tol` is absolute, interpreted in the
/// reference frame.
pub fn point_in_element(
    topology: ElementTopology,
    verts: &[f64],
    dim: usize,
    point: &[f64],
    tol: f64,
) -> Result<bool> {
    if dim != topology.reference_dim() {
        return Err(TransferError::DimensionMismatch {
            expected: topology.reference_dim(),
            got: dim,
        });
    }
    if verts.len() != dim * topology.num_vertices() {
        return Err(TransferError::RaggedBlock {
            context: "element vertex coordinates",
            expected: dim * topology.num_vertices(),
            got: verts.len(),
        });
    }
    if point.len() != dim {
        return Err(TransferError::DimensionMismatch {
            expected: dim,
            got: point.len(),
        });
    }

    if topology == ElementTopology::Pyramid {
        // Either tetrahedron claims the point; exit after the first hit.
        if tet_contains(verts, &TET_1, point, tol) {
            return Ok(true);
        }
        return Ok(tet_contains(verts, &TET_2, point, tol));
    }

    match map_to_reference(topology, verts, dim, point) {
        Some(xi) => Ok(topology.reference_inclusion(&xi, tol)),
        None => Ok(false),
    }
}

fn tet_contains(pyramid_verts: &[f64], pick: &[usize; 4], point: &[f64], tol: f64) -> bool {
    let mut tet = [0.0f64; 12];
    for (slot, &v) in pick.iter().enumerate() {
        tet[3 * slot..3 * slot + 3].copy_from_slice(&pyramid_verts[3 * v..3 * v + 3]);
    }
    match map_to_reference(ElementTopology::Tet, &tet, 3, point) {
        Some(xi) => ElementTopology::Tet.reference_inclusion(&xi, tol),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn unit_pyramid() -> [f64; 15] {
        [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.5, 0.5, 1.0,
        ]
    }

    #[test]
    fn line_segment_midpoint() {
        let verts = [0.0, 1.0];
        assert!(point_in_element(ElementTopology::Line, &verts, 1, &[0.5], TOL).unwrap());
        assert!(!point_in_element(ElementTopology::Line, &verts, 1, &[1.5], TOL).unwrap());
    }

    #[test]
    fn pyramid_interior_point() {
        let verts = unit_pyramid();
        assert!(
            point_in_element(ElementTopology::Pyramid, &verts, 3, &[0.5, 0.5, 0.5], TOL).unwrap()
        );
    }

    #[test]
    fn pyramid_exterior_point() {
        let verts = unit_pyramid();
        assert!(
            !point_in_element(ElementTopology::Pyramid, &verts, 3, &[0.9, 0.9, 0.9], TOL).unwrap()
        );
    }

    #[test]
    fn pyramid_base_boundary_point() {
        let verts = unit_pyramid();
        assert!(
            point_in_element(ElementTopology::Pyramid, &verts, 3, &[0.5, 0.5, 0.0], TOL).unwrap()
        );
    }

    #[test]
    fn pyramid_point_on_second_tetrahedron() {
        let verts = unit_pyramid();
        // near the v3 = (0,1,0) corner: only the second tetrahedron holds it
        assert!(
            point_in_element(ElementTopology::Pyramid, &verts, 3, &[0.1, 0.85, 0.05], TOL)
                .unwrap()
        );
    }

    #[test]
    fn hex_containment() {
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0, //
            0.0, 1.0, 1.0,
        ];
        assert!(point_in_element(ElementTopology::Hex, &verts, 3, &[0.5, 0.5, 0.5], TOL).unwrap());
        assert!(
            !point_in_element(ElementTopology::Hex, &verts, 3, &[0.5, 0.5, 1.5], TOL).unwrap()
        );
    }

    #[test]
    fn dimension_mismatch_is_a_precondition_error() {
        let verts = [0.0, 1.0];
        let err = point_in_element(ElementTopology::Line, &verts, 2, &[0.5, 0.5], TOL);
        assert!(matches!(err, Err(TransferError::DimensionMismatch { .. })));
    }
}
