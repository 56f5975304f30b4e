//! Ordinal-keyed distributed maps and the exporter between them.
//!
//! A [`DistMap`] is one rank's slice of a non-contiguous distributed map:
//! the global ordinals this rank owns, in local order. The [`Exporter`]
//! connects two maps over the same communicator (each source-map entry is
//! routed to the target rank owning the same ordinal) and is built once,
//! then reused for every field moved along it.
//!
//! Ownership discovery runs through a hashed ordinal directory (directory
//! rank = `ordinal % P`): target ranks register their ordinals, source ranks
//! ask, the directory answers. All three rounds ride [`ImportPlan`]s, so
//! arbitrary ordinal distributions work without any global table.

use crate::algs::communicator::Communicator;
use crate::algs::distributor::ImportPlan;
use crate::algs::wire::WireOwnerRecord;
use crate::data::MultiVector;
use crate::error::{Result, TransferError};
use hashbrown::HashMap;

const TAG_DIRECTORY_REGISTER: u16 = 0x0500;
const TAG_DIRECTORY_QUERY: u16 = 0x0510;
const TAG_DIRECTORY_REPLY: u16 = 0x0520;
const TAG_EXPORT: u16 = 0x0530;

/// This rank's owned ordinals of a distributed map, in local order.
#[derive(Debug, Clone, Default)]
pub struct DistMap {
    ordinals: Vec<u64>,
    index: HashMap<u64, usize>,
}

impl DistMap {
    /// Ordinals must be unique on this rank; globally, each ordinal must be
    /// owned by exactly one rank (the setup pipeline guarantees both).
    pub fn new(ordinals: Vec<u64>) -> Result<Self> {
        let mut index = HashMap::with_capacity(ordinals.len());
        for (i, &ord) in ordinals.iter().enumerate() {
            if ord == u64::MAX {
                return Err(TransferError::SentinelLeak {
                    context: "distributed map ordinals",
                });
            }
            if index.insert(ord, i).is_some() {
                return Err(TransferError::InvalidPlan {
                    context: "duplicate ordinal in distributed map",
                    expected: 1,
                    got: 2,
                });
            }
        }
        Ok(Self { ordinals, index })
    }

    pub fn num_local(&self) -> usize {
        self.ordinals.len()
    }

    pub fn ordinals(&self) -> &[u64] {
        &self.ordinals
    }

    pub fn local_index(&self, ordinal: u64) -> Option<usize> {
        self.index.get(&ordinal).copied()
    }
}

/// A built communication route from a source map to a target map.
#[derive(Debug)]
pub struct Exporter {
    plan: ImportPlan,
    /// For each received item, the local index in the target map.
    recv_slots: Vec<usize>,
    num_source: usize,
    num_target: usize,
}

impl Exporter {
    /// Collective. Both maps must cover the same ordinal set globally
    /// (every source ordinal owned by exactly one target rank).
    pub fn new<C: Communicator>(
        comm: &C,
        source_map: &DistMap,
        target_map: &DistMap,
    ) -> Result<Self> {
        let size = comm.size() as u64;
        let dir_rank = |ordinal: u64| (ordinal % size) as usize;

        // Round 1: targets register ownership with the directory.
        let reg_dests: Vec<usize> = target_map.ordinals().iter().map(|&o| dir_rank(o)).collect();
        let reg_plan = ImportPlan::from_destinations(comm, &reg_dests, TAG_DIRECTORY_REGISTER)?;
        let reg_send: Vec<WireOwnerRecord> = target_map
            .ordinals()
            .iter()
            .map(|&ordinal| WireOwnerRecord {
                ordinal,
                owner: comm.rank() as u64,
            })
            .collect();
        let mut registered = vec![WireOwnerRecord { ordinal: 0, owner: 0 }; reg_plan.num_imports()];
        reg_plan.do_posts_and_waits(comm, &reg_send, 1, &mut registered)?;
        let mut directory: HashMap<u64, u64> = HashMap::with_capacity(registered.len());
        for rec in &registered {
            directory.insert(rec.ordinal, rec.owner);
        }

        // Round 2: sources ask the directory who owns their ordinals.
        let query_dests: Vec<usize> = source_map.ordinals().iter().map(|&o| dir_rank(o)).collect();
        let query_plan = ImportPlan::from_destinations(comm, &query_dests, TAG_DIRECTORY_QUERY)?;
        let mut queries = vec![0u64; query_plan.num_imports()];
        query_plan.do_posts_and_waits(comm, source_map.ordinals(), 1, &mut queries)?;

        // Round 3: the directory replies along the reversed query plan.
        let reply_dests = query_plan.import_sources();
        let reply_plan = ImportPlan::from_destinations(comm, &reply_dests, TAG_DIRECTORY_REPLY)?;
        let replies: Vec<u64> = queries
            .iter()
            .map(|&ordinal| {
                directory
                    .get(&ordinal)
                    .copied()
                    .ok_or(TransferError::SentinelLeak {
                        context: "ordinal missing from the target map directory",
                    })
            })
            .collect::<Result<_>>()?;
        let mut owners_wire = vec![0u64; reply_plan.num_imports()];
        reply_plan.do_posts_and_waits(comm, &replies, 1, &mut owners_wire)?;

        // Replies arrive in the order our queries went on the wire.
        let mut owners = vec![usize::MAX; source_map.num_local()];
        for (wire_pos, &local) in query_plan.send_order().iter().enumerate() {
            owners[local] = owners_wire[wire_pos] as usize;
        }

        // The export plan itself, plus one build-time ordinal exchange so the
        // receive side can pre-resolve target slots.
        let plan = ImportPlan::from_destinations(comm, &owners, TAG_EXPORT)?;
        let mut arriving = vec![0u64; plan.num_imports()];
        plan.do_posts_and_waits(comm, source_map.ordinals(), 1, &mut arriving)?;
        let recv_slots = arriving
            .iter()
            .map(|&ordinal| {
                target_map
                    .local_index(ordinal)
                    .ok_or(TransferError::SentinelLeak {
                        context: "exported ordinal missing from the target map",
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            plan,
            recv_slots,
            num_source: source_map.num_local(),
            num_target: target_map.num_local(),
        })
    }

    /// Move `source` values into target-owned slots, overwriting (INSERT
    /// combine: each target ordinal has exactly one source contributor).
    pub fn export_insert<C: Communicator>(
        &self,
        comm: &C,
        source: &MultiVector,
        target: &mut MultiVector,
    ) -> Result<()> {
        let dims = target.num_dims();
        if source.num_points() != self.num_source || source.num_dims() != dims {
            return Err(TransferError::InvalidPlan {
                context: "export source shape",
                expected: self.num_source * dims,
                got: source.values().len(),
            });
        }
        if target.num_points() != self.num_target {
            return Err(TransferError::InvalidPlan {
                context: "export target shape",
                expected: self.num_target * dims,
                got: target.values().len(),
            });
        }

        // Entry-major packing: `dims` contiguous values per planned item.
        let n = source.num_points();
        let mut send = vec![0.0f64; n * dims];
        for i in 0..n {
            for d in 0..dims {
                send[i * dims + d] = source.get(d, i);
            }
        }
        let mut recv = vec![0.0f64; self.plan.num_imports() * dims];
        self.plan.do_posts_and_waits(comm, &send, dims, &mut recv)?;

        for (j, &slot) in self.recv_slots.iter().enumerate() {
            for d in 0..dims {
                target.set(d, slot, recv[j * dims + d]);
            }
        }
        Ok(())
    }

    /// Source ranks feeding this rank, with per-rank item counts (used by
    /// determinism checks).
    pub fn import_images(&self) -> (&[usize], &[usize]) {
        (self.plan.images_from(), self.plan.lengths_from())
    }
}
