//! Rendezvous decomposition: a transient geometric repartitioning of the
//! source mesh used purely as a search substrate.
//!
//! Build: RCB over the in-box source vertices fixes a cell per rank; every
//! element whose bounding box intersects the search box is shipped to *all*
//! ranks whose RCB cell its box intersects, so any query point routed by
//! `rank_of` finds every candidate element locally. Exactly one destination,
//! the cell holding the element's first canonical vertex, is flagged as the
//! element's rendezvous owner; search replies carry the element's source rank
//! so duplicated copies answer identically.
//!
//! Query: `procs_containing_points` routes points to cells through the
//! replicated RCB tree; `elements_containing_points` runs the kD-tree plus
//! the exact point-in-element test on the local rendezvous mesh.

use crate::algs::communicator::Communicator;
use crate::algs::distributor::ImportPlan;
use crate::algs::wire::WireElement;
use crate::error::Result;
use crate::geometry::{BoundingBox, KdItem, KdTree};
use crate::mesh::{MeshManager, RendezvousMesh};
use crate::partitioning::{rcb_partition, RcbConfig, RcbTree};
use crate::topology::point_in_element;
use bytemuck::Zeroable;
use hashbrown::HashMap;

const TAG_RENDEZVOUS: u16 = 0x0400;

/// A hit from [`Rendezvous::elements_containing_points`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ElementHit {
    /// Source-mesh element handle.
    pub element: u64,
    /// Rank owning the element in the source decomposition.
    pub source_rank: usize,
}

pub struct Rendezvous {
    dim: usize,
    search_box: BoundingBox,
    rcb: RcbTree,
    mesh: RendezvousMesh,
    tree: KdTree,
}

impl Rendezvous {
    /// Build the decomposition over `global_box` (the source/target
    /// intersection). Collective; ranks without a local source pass `None`
    /// and still participate in the partitioning collectives.
    pub fn build<C: Communicator>(
        comm: &C,
        dim: usize,
        global_box: BoundingBox,
        manager: Option<&MeshManager>,
        cfg: &RcbConfig,
    ) -> Result<Self> {
        // Grow the box a little so boundary vertices are not lost to
        // floating-point roundoff.
        let search_box = global_box.expand(1.0e-9 * global_box.max_extent().max(1.0));

        // Local source vertices restricted to the box, block-strided for RCB.
        let mut in_box: Vec<[f64; 3]> = Vec::new();
        let mut vertex_coords: HashMap<u64, [f64; 3]> = HashMap::new();
        if let Some(manager) = manager {
            for block in manager.blocks() {
                let nv = block.num_vertices();
                let coords = block.coordinates();
                let handles = block.vertex_handles();
                for v in 0..nv {
                    let mut p = [0.0f64; 3];
                    for d in 0..dim {
                        p[d] = coords[d * nv + v];
                    }
                    vertex_coords.insert(handles[v], p);
                    if search_box.contains(&p[..dim]) {
                        in_box.push(p);
                    }
                }
            }
        }
        let npts = in_box.len();
        let mut rcb_coords = vec![0.0f64; dim * npts];
        for (i, p) in in_box.iter().enumerate() {
            for d in 0..dim {
                rcb_coords[d * npts + i] = p[d];
            }
        }
        let (_, rcb) = rcb_partition(
            comm,
            dim,
            &rcb_coords,
            None,
            &search_box,
            comm.size(),
            cfg,
        )?;

        // Ship each relevant element to every intersecting cell.
        let mut destinations: Vec<usize> = Vec::new();
        let mut fragments: Vec<WireElement> = Vec::new();
        if let Some(manager) = manager {
            for block in manager.blocks() {
                let topology = block.topology();
                let handles = block.element_handles();
                for e in 0..block.num_elements() {
                    let verts = block.element_vertices(e);
                    let mut bbox = BoundingBox::empty().with_unused_unbounded(dim);
                    let mut frag = WireElement::zeroed();
                    frag.handle = handles[e];
                    frag.source_rank = comm.rank() as u32;
                    frag.topology = topology.tag();
                    frag.num_vertices = verts.len() as u8;
                    let mut first_vertex = [0.0f64; 3];
                    for (k, &vh) in verts.iter().enumerate() {
                        let p = vertex_coords
                            .get(&vh)
                            .ok_or(crate::error::TransferError::UnknownVertex { handle: vh })?;
                        bbox.merge_point(&p[..dim]);
                        frag.vertices[k] = vh;
                        frag.coords[3 * k..3 * k + 3].copy_from_slice(p);
                        if k == 0 {
                            first_vertex = *p;
                        }
                    }
                    if !bbox.intersects(&search_box) {
                        continue;
                    }
                    let owner = rcb.rank_of(&first_vertex[..dim]);
                    for dest in rcb.parts_intersecting(&bbox) {
                        let mut copy = frag;
                        copy.owned = u8::from(dest == owner);
                        destinations.push(dest);
                        fragments.push(copy);
                    }
                }
            }
        }

        let plan = ImportPlan::from_destinations(comm, &destinations, TAG_RENDEZVOUS)?;
        let mut received = vec![WireElement::zeroed(); plan.num_imports()];
        plan.do_posts_and_waits(comm, &fragments, 1, &mut received)?;
        let mesh = RendezvousMesh::from_fragments(dim, &received)?;

        let mut items = Vec::with_capacity(mesh.num_elements());
        for e in 0..mesh.num_elements() {
            items.push(KdItem {
                index: e,
                handle: mesh.element(e).handle,
                centroid: mesh.element_centroid(e)?,
                bbox: mesh.element_bbox(e)?,
            });
        }
        let tree = KdTree::build(items, dim);

        log::debug!(
            "rendezvous: rank {} holds {} elements ({} sent)",
            comm.rank(),
            mesh.num_elements(),
            fragments.len()
        );

        Ok(Self {
            dim,
            search_box,
            rcb,
            mesh,
            tree,
        })
    }

    /// The (slightly expanded) box the decomposition covers.
    pub fn search_box(&self) -> &BoundingBox {
        &self.search_box
    }

    pub fn mesh(&self) -> &RendezvousMesh {
        &self.mesh
    }

    /// Rendezvous rank responsible for each point (block-strided coords).
    pub fn procs_containing_points(&self, coords: &[f64]) -> Vec<usize> {
        let n = coords.len() / self.dim;
        let mut point = [0.0f64; 3];
        (0..n)
            .map(|i| {
                for d in 0..self.dim {
                    point[d] = coords[d * n + i];
                }
                self.rcb.rank_of(&point[..self.dim])
            })
            .collect()
    }

    /// Locate each point (block-strided coords) in a local rendezvous
    /// element. `None` marks a miss; ties on shared boundaries resolve to the
    /// smallest element handle.
    pub fn elements_containing_points(
        &self,
        coords: &[f64],
        tol: f64,
    ) -> Result<Vec<Option<ElementHit>>> {
        let n = coords.len() / self.dim;
        let mut out = Vec::with_capacity(n);
        let mut point = [0.0f64; 3];
        for i in 0..n {
            for d in 0..self.dim {
                point[d] = coords[d * n + i];
            }
            if self.tree.is_empty() {
                out.push(None);
                continue;
            }
            let hit = self.tree.containing_element(&point[..self.dim], |e| {
                let verts = self.mesh.element_vertex_coords(e)?;
                point_in_element(
                    self.mesh.element(e).topology,
                    &verts,
                    self.dim,
                    &point[..self.dim],
                    tol,
                )
            })?;
            out.push(hit.map(|e| {
                let elem = self.mesh.element(e);
                ElementHit {
                    element: elem.handle,
                    source_rank: elem.source_rank,
                }
            }));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::mesh::MeshBlock;
    use crate::topology::ElementTopology;

    fn line_manager() -> MeshManager {
        // three segments over [0, 3]
        let block = MeshBlock::new(
            1,
            ElementTopology::Line,
            vec![1, 2, 3, 4],
            vec![0.0, 1.0, 2.0, 3.0],
            vec![10, 11, 12],
            vec![1, 2, 3, 2, 3, 4],
            MeshBlock::identity_permutation(ElementTopology::Line),
        )
        .unwrap();
        MeshManager::new(vec![Box::new(block)], 1).unwrap()
    }

    #[test]
    fn serial_rendezvous_locates_points() {
        let comm = NoComm;
        let manager = line_manager();
        let global_box = BoundingBox::global_bounds(&comm, &manager.local_bounds()).unwrap();
        let rdv = Rendezvous::build(&comm, 1, global_box, Some(&manager), &RcbConfig::default())
            .unwrap();

        assert_eq!(rdv.mesh().num_elements(), 3);
        assert_eq!(rdv.procs_containing_points(&[0.5, 2.5]), vec![0, 0]);

        let hits = rdv
            .elements_containing_points(&[0.5, 1.5, 2.5, 7.0], 1e-9)
            .unwrap();
        assert_eq!(
            hits[0],
            Some(ElementHit {
                element: 10,
                source_rank: 0
            })
        );
        assert_eq!(hits[1].unwrap().element, 11);
        assert_eq!(hits[2].unwrap().element, 12);
        assert_eq!(hits[3], None);
    }

    #[test]
    fn shared_vertex_resolves_to_smallest_handle() {
        let comm = NoComm;
        let manager = line_manager();
        let global_box = BoundingBox::global_bounds(&comm, &manager.local_bounds()).unwrap();
        let rdv = Rendezvous::build(&comm, 1, global_box, Some(&manager), &RcbConfig::default())
            .unwrap();

        // x = 1 lies on the face between elements 10 and 11
        let hits = rdv.elements_containing_points(&[1.0], 1e-9).unwrap();
        assert_eq!(hits[0].unwrap().element, 10);
    }

    #[test]
    fn every_element_has_exactly_one_owner_serially() {
        let comm = NoComm;
        let manager = line_manager();
        let global_box = BoundingBox::global_bounds(&comm, &manager.local_bounds()).unwrap();
        let rdv = Rendezvous::build(&comm, 1, global_box, Some(&manager), &RcbConfig::default())
            .unwrap();
        assert!(rdv.mesh().elements().iter().all(|e| e.owned));
    }

    #[test]
    fn absent_source_rank_participates() {
        let comm = NoComm;
        let global_box = BoundingBox::from_bounds(1, &[0.0], &[1.0]);
        let rdv =
            Rendezvous::build(&comm, 1, global_box, None, &RcbConfig::default()).unwrap();
        assert!(rdv.mesh().is_empty());
        let hits = rdv.elements_containing_points(&[0.5], 1e-9).unwrap();
        assert_eq!(hits[0], None);
    }
}
