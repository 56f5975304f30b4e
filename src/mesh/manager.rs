//! Per-rank collection of mesh blocks.

use crate::error::{Result, TransferError};
use crate::geometry::BoundingBox;
use crate::mesh::MeshBlockView;

/// One rank's share of the source mesh: a sequence of same-dimension blocks
/// (one per element topology present locally).
pub struct MeshManager {
    blocks: Vec<Box<dyn MeshBlockView>>,
    dim: usize,
}

impl MeshManager {
    pub fn new(blocks: Vec<Box<dyn MeshBlockView>>, dim: usize) -> Result<Self> {
        for block in &blocks {
            if block.vertex_dim() != dim {
                return Err(TransferError::DimensionMismatch {
                    expected: dim,
                    got: block.vertex_dim(),
                });
            }
        }
        Ok(Self { blocks, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn blocks(&self) -> &[Box<dyn MeshBlockView>] {
        &self.blocks
    }

    /// Tightest box around this rank's vertices; the neutral box when the
    /// rank holds no mesh, so global reductions stay correct.
    pub fn local_bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for block in &self.blocks {
            bounds.merge(&block.local_bounds());
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBlock;
    use crate::topology::ElementTopology;

    #[test]
    fn dimension_mismatch_is_rejected() {
        let block = MeshBlock::new(
            1,
            ElementTopology::Line,
            vec![1, 2],
            vec![0.0, 1.0],
            vec![10],
            vec![1, 2],
            MeshBlock::identity_permutation(ElementTopology::Line),
        )
        .unwrap();
        let err = MeshManager::new(vec![Box::new(block)], 3);
        assert!(matches!(err, Err(TransferError::DimensionMismatch { .. })));
    }

    #[test]
    fn empty_manager_has_neutral_bounds() {
        let manager = MeshManager::new(Vec::new(), 3).unwrap();
        assert_eq!(manager.local_bounds(), BoundingBox::empty());
    }
}
