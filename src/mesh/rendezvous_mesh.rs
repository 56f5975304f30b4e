//! The local mesh a rank rebuilds from redistributed element fragments.
//!
//! After the RCB shuffle every rendezvous rank holds an arbitrary mix of
//! elements from many source ranks and topologies. Vertices are deduplicated
//! by handle on receipt; connectivity is stored ragged (canonical vertex
//! order, as packed by the sender) with per-element offsets. The structure is
//! read-only once built.

use crate::algs::wire::WireElement;
use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;
use crate::topology::ElementTopology;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct RendezvousElement {
    pub handle: u64,
    pub topology: ElementTopology,
    /// Rank that owns this element in the *source* decomposition.
    pub source_rank: usize,
    /// True on exactly one rendezvous rank per element (the dedup owner).
    pub owned: bool,
    conn_start: usize,
}

#[derive(Debug, Default)]
pub struct RendezvousMesh {
    dim: usize,
    vertex_handles: Vec<u64>,
    /// Interleaved coordinates, `dim` per vertex.
    coords: Vec<f64>,
    vertex_index: HashMap<u64, usize>,
    elements: Vec<RendezvousElement>,
    connectivity: Vec<u64>,
}

impl RendezvousMesh {
    /// Assemble from received wire fragments. Fragments carry their own
    /// vertex coordinates, so no second lookup round is needed; duplicate
    /// element arrivals (same handle) are dropped, keeping the first.
    pub fn from_fragments(dim: usize, fragments: &[WireElement]) -> Result<Self> {
        let mut mesh = Self {
            dim,
            ..Self::default()
        };
        let mut seen = HashSet::with_capacity(fragments.len());
        for frag in fragments {
            if !seen.insert(frag.handle) {
                continue;
            }
            let topology = ElementTopology::from_tag(frag.topology).ok_or(
                TransferError::SentinelLeak {
                    context: "element topology tag on the wire",
                },
            )?;
            let nv = frag.num_vertices as usize;
            if nv != topology.num_vertices() {
                return Err(TransferError::RaggedBlock {
                    context: "wire element vertex count",
                    expected: topology.num_vertices(),
                    got: nv,
                });
            }
            let conn_start = mesh.connectivity.len();
            for k in 0..nv {
                let handle = frag.vertices[k];
                let next = mesh.vertex_handles.len();
                let slot = *mesh.vertex_index.entry(handle).or_insert(next);
                if slot == next {
                    mesh.vertex_handles.push(handle);
                    mesh.coords
                        .extend_from_slice(&frag.coords[3 * k..3 * k + dim]);
                }
                mesh.connectivity.push(handle);
            }
            mesh.elements.push(RendezvousElement {
                handle: frag.handle,
                topology,
                source_rank: frag.source_rank as usize,
                owned: frag.owned != 0,
                conn_start,
            });
        }
        Ok(mesh)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, e: usize) -> &RendezvousElement {
        &self.elements[e]
    }

    pub fn elements(&self) -> &[RendezvousElement] {
        &self.elements
    }

    /// Interleaved canonical-order vertex coordinates of element `e`.
    pub fn element_vertex_coords(&self, e: usize) -> Result<Vec<f64>> {
        let elem = &self.elements[e];
        let nv = elem.topology.num_vertices();
        let mut out = Vec::with_capacity(self.dim * nv);
        for k in 0..nv {
            let handle = self.connectivity[elem.conn_start + k];
            let &slot = self
                .vertex_index
                .get(&handle)
                .ok_or(TransferError::UnknownVertex { handle })?;
            out.extend_from_slice(&self.coords[self.dim * slot..self.dim * (slot + 1)]);
        }
        Ok(out)
    }

    pub fn element_bbox(&self, e: usize) -> Result<BoundingBox> {
        let verts = self.element_vertex_coords(e)?;
        let mut bbox = BoundingBox::empty();
        for chunk in verts.chunks(self.dim) {
            bbox.merge_point(chunk);
        }
        Ok(bbox.with_unused_unbounded(self.dim))
    }

    pub fn element_centroid(&self, e: usize) -> Result<[f64; 3]> {
        let verts = self.element_vertex_coords(e)?;
        let nv = verts.len() / self.dim;
        let mut c = [0.0f64; 3];
        for chunk in verts.chunks(self.dim) {
            for d in 0..self.dim {
                c[d] += chunk[d];
            }
        }
        for x in c.iter_mut() {
            *x /= nv as f64;
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn line_fragment(handle: u64, v0: (u64, f64), v1: (u64, f64), source_rank: u32) -> WireElement {
        let mut frag = WireElement::zeroed();
        frag.handle = handle;
        frag.source_rank = source_rank;
        frag.topology = ElementTopology::Line.tag();
        frag.num_vertices = 2;
        frag.owned = 1;
        frag.vertices[0] = v0.0;
        frag.vertices[1] = v1.0;
        frag.coords[0] = v0.1;
        frag.coords[3] = v1.1;
        frag
    }

    #[test]
    fn vertices_deduplicate_by_handle() {
        let frags = vec![
            line_fragment(10, (1, 0.0), (2, 1.0), 0),
            line_fragment(11, (2, 1.0), (3, 2.0), 1),
        ];
        let mesh = RendezvousMesh::from_fragments(1, &frags).unwrap();
        assert_eq!(mesh.num_elements(), 2);
        assert_eq!(mesh.vertex_handles.len(), 3);
        assert_eq!(mesh.element(1).source_rank, 1);
        assert_eq!(mesh.element_vertex_coords(1).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn duplicate_elements_keep_first_arrival() {
        let frags = vec![
            line_fragment(10, (1, 0.0), (2, 1.0), 0),
            line_fragment(10, (1, 0.0), (2, 1.0), 0),
        ];
        let mesh = RendezvousMesh::from_fragments(1, &frags).unwrap();
        assert_eq!(mesh.num_elements(), 1);
    }

    #[test]
    fn centroid_and_bbox() {
        let frags = vec![line_fragment(10, (1, 1.0), (2, 3.0), 0)];
        let mesh = RendezvousMesh::from_fragments(1, &frags).unwrap();
        assert_eq!(mesh.element_centroid(0).unwrap()[0], 2.0);
        let bbox = mesh.element_bbox(0).unwrap();
        assert_eq!(bbox.min[0], 1.0);
        assert_eq!(bbox.max[0], 3.0);
    }

    #[test]
    fn bad_topology_tag_is_rejected() {
        let mut frag = WireElement::zeroed();
        frag.topology = 42;
        frag.num_vertices = 2;
        let err = RendezvousMesh::from_fragments(1, &[frag]);
        assert!(matches!(err, Err(TransferError::SentinelLeak { .. })));
    }
}
