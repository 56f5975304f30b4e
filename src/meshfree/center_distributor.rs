//! Ghost-layer gather for meshless interpolation.
//!
//! Every rank needs, next to its own source centers, the remote source
//! centers that can interact with its local query points: those within the
//! basis radius. Ranks advertise their query bounds (expanded by the radius)
//! with an all-gather; each source center is then shipped to every rank whose
//! expanded bounds contain it. The box test gathers a superset of the true
//! within-radius set; the pairing applies the exact radius filter, so the
//! operators never see spurious neighbors.
//!
//! Meshless center arrays are interleaved (`dim` coordinates per point),
//! unlike the block-strided mesh adapters.

use crate::algs::communicator::Communicator;
use crate::algs::distributor::ImportPlan;
use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;
use bytemuck::Pod;

/// A reusable gather of within-range source centers.
pub struct CenterDistributor {
    plan: ImportPlan,
    /// For each planned item, the local source center it replicates.
    send_map: Vec<usize>,
    num_local: usize,
    num_imports: usize,
}

impl CenterDistributor {
    /// Collective. Gathers the source centers within `radius` of any of this
    /// rank's `query_centers`; returns the distributor (reusable for
    /// per-center payloads) and the gathered centers, interleaved.
    pub fn new<C: Communicator>(
        comm: &C,
        dim: usize,
        source_centers: &[f64],
        query_centers: &[f64],
        radius: f64,
        tag: u16,
    ) -> Result<(Self, Vec<f64>)> {
        if source_centers.len() % dim != 0 || query_centers.len() % dim != 0 {
            return Err(TransferError::RaggedBlock {
                context: "center coordinates",
                expected: dim,
                got: source_centers.len() % dim + query_centers.len() % dim,
            });
        }
        let num_local = source_centers.len() / dim;

        // Advertise expanded query bounds.
        let mut local_bounds = BoundingBox::empty();
        for point in query_centers.chunks(dim) {
            local_bounds.merge_point(point);
        }
        let reach = crate::algs::collective::all_gather(comm, local_bounds.expand(radius))?;

        let mut destinations = Vec::new();
        let mut send_map = Vec::new();
        for (i, center) in source_centers.chunks(dim).enumerate() {
            for (rank, bounds) in reach.iter().enumerate() {
                if bounds.contains(center) {
                    destinations.push(rank);
                    send_map.push(i);
                }
            }
        }

        let plan = ImportPlan::from_destinations(comm, &destinations, tag)?;
        let num_imports = plan.num_imports();

        let distributor = Self {
            plan,
            send_map,
            num_local,
            num_imports,
        };
        let mut gathered = vec![0.0f64; num_imports * dim];
        distributor.distribute(comm, source_centers, dim, &mut gathered)?;
        Ok((distributor, gathered))
    }

    /// Gathered center count on this rank.
    pub fn num_imports(&self) -> usize {
        self.num_imports
    }

    /// Replicate a per-local-center payload along the gather topology.
    pub fn distribute<C: Communicator, T: Pod>(
        &self,
        comm: &C,
        per_center: &[T],
        items_per_center: usize,
        out: &mut [T],
    ) -> Result<()> {
        if per_center.len() != self.num_local * items_per_center {
            return Err(TransferError::InvalidPlan {
                context: "center payload size",
                expected: self.num_local * items_per_center,
                got: per_center.len(),
            });
        }
        let mut expanded = Vec::with_capacity(self.send_map.len() * items_per_center);
        for &i in &self.send_map {
            expanded
                .extend_from_slice(&per_center[i * items_per_center..(i + 1) * items_per_center]);
        }
        self.plan
            .do_posts_and_waits(comm, &expanded, items_per_center, out)
    }
}
