//! The shared-domain map: locate every target point in a source element,
//! cache the resulting communication plan, then stream field evaluations
//! through it.
//!
//! Setup is a single collective phase that runs the three-legged pipeline
//! target → rendezvous → source, leaving behind per-source-rank evaluation
//! requests (`source_elements`, `target_coords`), the two ordinal maps, and
//! the exporter between them. Apply is a second collective phase that calls
//! the user's field evaluator on the cached requests and exports the values
//! into target-owned slots. The two phases must not be interleaved on the
//! same map.
//!
//! Local failures in the local-only stages are combined across ranks before
//! the pipeline enters its next communication stage, so one rank's bad
//! argument cannot strand its peers at a barrier.

use crate::algs::collective::{broadcast, check_peers, max_u64};
use crate::algs::comm_indexer::CommIndexer;
use crate::algs::communicator::Communicator;
use crate::algs::distributor::ImportPlan;
use crate::data::{DistMap, Exporter, FieldEvaluator, FieldView, FieldViewMut, MultiVector};
use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;
use crate::mesh::MeshManager;
use crate::partitioning::RcbConfig;
use crate::rendezvous::Rendezvous;
use hashbrown::HashMap;

const TAG_BOX_EXCHANGE: u16 = 0x0600;
const TAG_TARGET_TO_RDV: u16 = 0x0610;
const TAG_MISSED_RETURN: u16 = 0x0620;
const TAG_RDV_TO_SOURCE: u16 = 0x0630;

/// Sentinel kept on the wire and in compacted scratch arrays only; it never
/// survives into cached state.
const INVALID_ORDINAL: u64 = u64::MAX;

/// A reusable map from a distributed source mesh to a distributed target
/// point set over the same geometric domain.
pub struct SharedDomainMap {
    dim: usize,
    store_missed_points: bool,
    source_indexer: CommIndexer,
    target_indexer: CommIndexer,
    /// Per mapped point: the containing source element, on the source rank.
    source_elements: Vec<u64>,
    /// Block-strided coordinates of the mapped points, source-rank frame.
    target_coords: Vec<f64>,
    source_map: DistMap,
    target_map: DistMap,
    exporter: Option<Exporter>,
    missed_points: Vec<usize>,
    target_g2l: HashMap<u64, usize>,
}

impl SharedDomainMap {
    /// `dim` is the spatial dimension every participating object must share.
    /// `store_missed_points` opts into tracking local target points that the
    /// map could not place; pass the same value on every rank.
    pub fn new(dim: usize, store_missed_points: bool) -> Self {
        Self {
            dim,
            store_missed_points,
            source_indexer: CommIndexer::default(),
            target_indexer: CommIndexer::default(),
            source_elements: Vec::new(),
            target_coords: Vec::new(),
            source_map: DistMap::default(),
            target_map: DistMap::default(),
            exporter: None,
            missed_points: Vec::new(),
            target_g2l: HashMap::new(),
        }
    }

    /// Generate the map. Collective over `comm`; ranks without a local source
    /// mesh or target points pass `None` for that side and still participate.
    /// `tolerance` is the absolute reference-frame tolerance for the
    /// point-in-element search.
    pub fn setup<C: Communicator>(
        &mut self,
        comm: &C,
        source: Option<&MeshManager>,
        target: Option<&dyn FieldView>,
        tolerance: f64,
    ) -> Result<()> {
        // -- Stage 0: participants and local argument validation. ----------
        self.source_indexer = CommIndexer::new(comm, source.is_some())?;
        self.target_indexer = CommIndexer::new(comm, target.is_some())?;

        let local_check = self.validate_participants(source, target);
        check_peers(comm, "setup arguments", local_check.is_ok())?;
        local_check?;

        if self.source_indexer.is_empty() {
            return Err(TransferError::MissingParticipant {
                role: "source mesh",
            });
        }
        if self.target_indexer.is_empty() {
            return Err(TransferError::MissingParticipant {
                role: "target point set",
            });
        }
        let source_root = self.source_indexer.l2g(0).expect("non-empty indexer");
        let target_root = self.target_indexer.l2g(0).expect("non-empty indexer");

        // -- Stage 1: box exchange. ----------------------------------------
        // Global source and target boxes (absent sides contribute the
        // neutral box), exchanged between the two root ranks, intersected on
        // the source root and broadcast.
        let source_box = BoundingBox::global_bounds(
            comm,
            &source.map_or_else(BoundingBox::empty, |m| m.local_bounds()),
        )?;
        let target_box = BoundingBox::global_bounds(
            comm,
            &target.map_or_else(BoundingBox::empty, |t| coord_bounds(t, self.dim)),
        )?;
        let shared_box =
            exchange_and_intersect(comm, source_root, target_root, source_box, target_box)?;

        // -- Stage 2: rendezvous build over the intersection. --------------
        let rendezvous =
            Rendezvous::build(comm, self.dim, shared_box, source, &RcbConfig::default())?;

        // -- Stage 3: globally unique target ordinals. ---------------------
        let num_local_targets = target.map_or(0, |t| t.num_points());
        let max_targets = max_u64(comm, num_local_targets as u64)?;
        let ordinal_base = comm.rank() as u64 * max_targets;
        let target_ordinals: Vec<u64> =
            (0..num_local_targets as u64).map(|i| ordinal_base + i).collect();
        self.target_g2l.clear();
        if self.store_missed_points {
            for (i, &ord) in target_ordinals.iter().enumerate() {
                self.target_g2l.insert(ord, i);
            }
        }
        // The target map covers every local target point; points the search
        // misses simply receive no contribution at apply time.
        self.target_map = DistMap::new(target_ordinals.clone())?;

        // -- Stage 4: prune targets outside the rendezvous box. ------------
        self.missed_points.clear();
        let mut kept_ordinals = Vec::new();
        let mut kept_coords_points: Vec<[f64; 3]> = Vec::new();
        if let Some(target) = target {
            let values = target.values();
            let n = num_local_targets;
            let mut point = [0.0f64; 3];
            for i in 0..n {
                for d in 0..self.dim {
                    point[d] = values[d * n + i];
                }
                if rendezvous.search_box().contains(&point[..self.dim]) {
                    kept_ordinals.push(target_ordinals[i]);
                    kept_coords_points.push(point);
                } else if self.store_missed_points {
                    self.missed_points.push(i);
                }
            }
        }
        let kept = kept_ordinals.len();
        let mut kept_coords = vec![0.0f64; self.dim * kept];
        for (i, p) in kept_coords_points.iter().enumerate() {
            for d in 0..self.dim {
                kept_coords[d * kept + i] = p[d];
            }
        }

        // -- Stage 5: forward distribute targets to rendezvous ranks. ------
        let rendezvous_procs = rendezvous.procs_containing_points(&kept_coords);
        let forward = ImportPlan::from_destinations(comm, &rendezvous_procs, TAG_TARGET_TO_RDV)?;
        let num_rdv_points = forward.num_imports();
        let mut rdv_ordinals = vec![0u64; num_rdv_points];
        forward.do_posts_and_waits(comm, &kept_ordinals, 1, &mut rdv_ordinals)?;
        let mut rdv_coords = vec![0.0f64; self.dim * num_rdv_points];
        for d in 0..self.dim {
            forward.do_posts_and_waits(
                comm,
                &kept_coords[d * kept..(d + 1) * kept],
                1,
                &mut rdv_coords[d * num_rdv_points..(d + 1) * num_rdv_points],
            )?;
        }

        // -- Stage 6: point-in-element on the rendezvous decomposition. ----
        let hits = rendezvous.elements_containing_points(&rdv_coords, tolerance)?;

        // -- Stage 7: report misses back to their target ranks. ------------
        // Collective when enabled (the flag must agree across ranks).
        if self.store_missed_points {
            let point_sources = forward.import_sources();
            let mut missed_ordinals = Vec::new();
            let mut missed_dests = Vec::new();
            for (j, hit) in hits.iter().enumerate() {
                if hit.is_none() {
                    missed_ordinals.push(rdv_ordinals[j]);
                    missed_dests.push(point_sources[j]);
                }
            }
            let back = ImportPlan::from_destinations(comm, &missed_dests, TAG_MISSED_RETURN)?;
            let mut returned = vec![0u64; back.num_imports()];
            back.do_posts_and_waits(comm, &missed_ordinals, 1, &mut returned)?;
            for ord in returned {
                let &local = self
                    .target_g2l
                    .get(&ord)
                    .ok_or(TransferError::SentinelLeak {
                        context: "missed-point ordinal not local to its target rank",
                    })?;
                self.missed_points.push(local);
            }
        }

        // -- Stage 8: reverse distribute survivors to source ranks. --------
        let mut survivor_dests = Vec::new();
        let mut survivor_elements = Vec::new();
        let mut survivor_ordinals = Vec::new();
        let mut survivor_rows = Vec::new();
        for (j, hit) in hits.iter().enumerate() {
            if let Some(hit) = hit {
                survivor_dests.push(hit.source_rank);
                survivor_elements.push(hit.element);
                survivor_ordinals.push(rdv_ordinals[j]);
                survivor_rows.push(j);
            }
        }
        let reverse = ImportPlan::from_destinations(comm, &survivor_dests, TAG_RDV_TO_SOURCE)?;
        let num_source_points = reverse.num_imports();

        self.source_elements = vec![0u64; num_source_points];
        reverse.do_posts_and_waits(comm, &survivor_elements, 1, &mut self.source_elements)?;

        let mut source_ordinals = vec![0u64; num_source_points];
        reverse.do_posts_and_waits(comm, &survivor_ordinals, 1, &mut source_ordinals)?;

        self.target_coords = vec![0.0f64; self.dim * num_source_points];
        let nsurv = survivor_rows.len();
        for d in 0..self.dim {
            let send_dim: Vec<f64> = survivor_rows
                .iter()
                .map(|&j| rdv_coords[d * num_rdv_points + j])
                .collect();
            debug_assert_eq!(send_dim.len(), nsurv);
            reverse.do_posts_and_waits(
                comm,
                &send_dim,
                1,
                &mut self.target_coords[d * num_source_points..(d + 1) * num_source_points],
            )?;
        }

        // The sentinel must not survive into cached state.
        if self.source_elements.contains(&INVALID_ORDINAL)
            || source_ordinals.contains(&INVALID_ORDINAL)
        {
            return Err(TransferError::SentinelLeak {
                context: "shared-domain map cache",
            });
        }

        // -- Stage 9: maps, exporter, barrier. -----------------------------
        self.source_map = DistMap::new(source_ordinals)?;
        self.exporter = Some(Exporter::new(comm, &self.source_map, &self.target_map)?);
        comm.barrier();
        Ok(())
    }

    fn validate_participants(
        &self,
        source: Option<&MeshManager>,
        target: Option<&dyn FieldView>,
    ) -> Result<()> {
        if let Some(manager) = source {
            if manager.dim() != self.dim {
                return Err(TransferError::DimensionMismatch {
                    expected: self.dim,
                    got: manager.dim(),
                });
            }
        }
        if let Some(target) = target {
            if target.dim() != self.dim {
                return Err(TransferError::DimensionMismatch {
                    expected: self.dim,
                    got: target.dim(),
                });
            }
        }
        Ok(())
    }

    /// Evaluate the source field at the mapped points and deliver the values
    /// into the target space. Collective; `evaluator` must be present exactly
    /// on ranks that presented a source mesh at setup, `target` exactly on
    /// ranks that presented target points.
    pub fn apply<C: Communicator>(
        &self,
        comm: &C,
        evaluator: Option<&dyn FieldEvaluator>,
        target: Option<&mut dyn FieldViewMut>,
    ) -> Result<()> {
        let exporter = self.exporter.as_ref().ok_or(TransferError::NotEnabled(
            "apply before setup: the exporter",
        ))?;

        // Field dimension from the source root, so target-only ranks size
        // their buffers identically.
        let mut field_dim = [evaluator.map_or(0u64, |e| e.field_dim() as u64)];
        let source_root = self.source_indexer.l2g(0).expect("setup succeeded");
        broadcast(comm, source_root, &mut field_dim)?;
        let field_dim = field_dim[0] as usize;

        // Local evaluation on source ranks.
        let num_source_points = self.source_map.num_local();
        let local_eval = (|| -> Result<Vec<f64>> {
            match evaluator {
                Some(evaluator) => {
                    let values =
                        evaluator.evaluate(&self.source_elements, &self.target_coords, self.dim)?;
                    if values.len() != field_dim * num_source_points {
                        return Err(TransferError::EvaluatorSizeMismatch {
                            expected: field_dim * num_source_points,
                            got: values.len(),
                        });
                    }
                    Ok(values)
                }
                None if num_source_points == 0 => Ok(Vec::new()),
                None => Err(TransferError::EvaluatorSizeMismatch {
                    expected: field_dim * num_source_points,
                    got: 0,
                }),
            }
        })();
        check_peers(comm, "field evaluation", local_eval.is_ok())?;
        let source_values = local_eval?;

        let source_vector = MultiVector::from_values(field_dim.max(1), {
            if field_dim == 0 {
                Vec::new()
            } else {
                source_values
            }
        })?;

        // Zero-fill the target so missed points observe a defined value.
        let mut target_vector = MultiVector::zeros(field_dim.max(1), self.target_map.num_local());
        if let Some(target) = &target {
            if target.values().len() != field_dim * self.target_map.num_local() {
                let err = TransferError::EvaluatorSizeMismatch {
                    expected: field_dim * self.target_map.num_local(),
                    got: target.values().len(),
                };
                check_peers(comm, "target space shape", false)?;
                return Err(err);
            }
        }
        check_peers(comm, "target space shape", true)?;

        exporter.export_insert(comm, &source_vector, &mut target_vector)?;

        if let Some(target) = target {
            target.values_mut().copy_from_slice(target_vector.values());
        }
        comm.barrier();
        Ok(())
    }

    /// Local indices of target points the map could not place. Only
    /// available when `store_missed_points` was requested.
    pub fn missed_target_points(&self) -> Result<&[usize]> {
        if !self.store_missed_points {
            return Err(TransferError::NotEnabled("missed-point storage"));
        }
        Ok(&self.missed_points)
    }

    /// Containing source element per mapped point (this rank's evaluations).
    pub fn source_elements(&self) -> &[u64] {
        &self.source_elements
    }

    /// Block-strided coordinates paired with [`SharedDomainMap::source_elements`].
    pub fn cached_target_coords(&self) -> &[f64] {
        &self.target_coords
    }

    /// Exporter topology, exposed for determinism checks.
    pub fn exporter_images(&self) -> Option<(&[usize], &[usize])> {
        self.exporter.as_ref().map(|e| e.import_images())
    }
}

/// Tightest local box around a block-strided coordinate field, unbounded in
/// the slots past `dim`.
fn coord_bounds(field: &dyn FieldView, dim: usize) -> BoundingBox {
    let n = field.num_points();
    let values = field.values();
    let mut bounds = BoundingBox::empty();
    let mut point = [0.0f64; 3];
    for i in 0..n {
        for d in 0..dim {
            point[d] = values[d * n + i];
        }
        bounds.merge_point(&point[..dim]);
    }
    bounds.with_unused_unbounded(dim)
}

/// Stage 1 of setup: the target root sends its box to the source root, the
/// source root intersects and everyone receives the result. Disjoint domains
/// produce the empty box; every target point then misses, which is the
/// documented non-error outcome, not a failure.
fn exchange_and_intersect<C: Communicator>(
    comm: &C,
    source_root: usize,
    target_root: usize,
    source_box: BoundingBox,
    target_box: BoundingBox,
) -> Result<BoundingBox> {
    use crate::algs::communicator::Wait;

    let me = comm.rank();
    let mut incoming_target_box = target_box;
    let mut box_send = None;
    if source_root != target_root {
        if me == target_root {
            box_send = Some(comm.isend(
                source_root,
                TAG_BOX_EXCHANGE,
                bytemuck::bytes_of(&target_box),
            ));
        }
        if me == source_root {
            let handle = comm.irecv(
                target_root,
                TAG_BOX_EXCHANGE,
                std::mem::size_of::<BoundingBox>(),
            );
            let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
                neighbor: target_root,
                message: "bounding box exchange returned no data".into(),
            })?;
            incoming_target_box = *bytemuck::from_bytes(&bytes);
        }
    }

    let mut shared = [BoundingBox::empty()];
    if me == source_root {
        if let Some(intersection) = source_box.intersection(&incoming_target_box) {
            shared[0] = intersection;
        }
    }
    broadcast(comm, source_root, &mut shared)?;
    if let Some(send) = box_send {
        let _ = send.wait();
    }
    Ok(shared[0])
}
