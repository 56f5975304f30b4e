//! Rank indexing between a parent communicator and a subset of its ranks.
//!
//! Source meshes and target point sets may live on only some of the ranks the
//! transfer runs over. The indexer records which parent ranks carry the
//! subset and numbers them densely (ascending parent rank), so stages like
//! "send the box to source rank 0" can locate the parent rank behind a subset
//! rank.

use crate::algs::collective::all_gather;
use crate::algs::communicator::Communicator;
use crate::error::Result;
use hashbrown::HashMap;

/// Bidirectional map between subset ("local") ranks and parent ranks.
#[derive(Debug, Clone, Default)]
pub struct CommIndexer {
    l2g: Vec<usize>,
    g2l: HashMap<usize, usize>,
}

impl CommIndexer {
    /// Collective over the parent communicator; `is_member` says whether this
    /// rank belongs to the subset.
    pub fn new<C: Communicator>(comm: &C, is_member: bool) -> Result<Self> {
        let flags = all_gather(comm, if is_member { 1u64 } else { 0 })?;
        let mut l2g = Vec::new();
        let mut g2l = HashMap::new();
        for (parent_rank, &flag) in flags.iter().enumerate() {
            if flag != 0 {
                g2l.insert(parent_rank, l2g.len());
                l2g.push(parent_rank);
            }
        }
        Ok(Self { l2g, g2l })
    }

    /// Parent rank of subset rank `local`.
    pub fn l2g(&self, local: usize) -> Option<usize> {
        self.l2g.get(local).copied()
    }

    /// Subset rank of parent rank `global`, if it is a member.
    pub fn g2l(&self, global: usize) -> Option<usize> {
        self.g2l.get(&global).copied()
    }

    /// Number of subset ranks.
    pub fn len(&self) -> usize {
        self.l2g.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l2g.is_empty()
    }
}
