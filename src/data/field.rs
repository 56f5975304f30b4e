//! Field adapter contracts.
//!
//! Fields are flat 64-bit float arrays, block-strided by field dimension
//! (all first components, then all second components, ...). The transfer core
//! reads source fields through evaluators and writes target fields through
//! [`FieldViewMut`]; it never owns user data.

use crate::error::{Result, TransferError};

/// Read-only view of a field.
pub trait FieldView: Send + Sync {
    /// Number of components per point.
    fn dim(&self) -> usize;
    /// Block-strided values, length `dim * num_points`.
    fn values(&self) -> &[f64];

    /// Total value count.
    fn len(&self) -> usize {
        self.values().len()
    }

    fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Number of points carried by the field.
    fn num_points(&self) -> usize {
        if self.dim() == 0 {
            0
        } else {
            self.values().len() / self.dim()
        }
    }
}

/// A field the transfer is allowed to overwrite.
pub trait FieldViewMut: FieldView {
    fn values_mut(&mut self) -> &mut [f64];
}

/// Owned field buffer; the crate's reference adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct VecField {
    dim: usize,
    values: Vec<f64>,
}

impl VecField {
    pub fn new(dim: usize, values: Vec<f64>) -> Result<Self> {
        if dim == 0 || values.len() % dim != 0 {
            return Err(TransferError::RaggedBlock {
                context: "field values",
                expected: dim,
                got: values.len(),
            });
        }
        Ok(Self { dim, values })
    }

    pub fn zeros(dim: usize, num_points: usize) -> Self {
        Self {
            dim,
            values: vec![0.0; dim * num_points],
        }
    }
}

impl FieldView for VecField {
    fn dim(&self) -> usize {
        self.dim
    }
    fn values(&self) -> &[f64] {
        &self.values
    }
}

impl FieldViewMut for VecField {
    fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}

/// Evaluates a source field inside mesh elements.
///
/// `elements` and `coords` pair up: evaluation `i` happens inside element
/// `elements[i]` at the block-strided point `i` of `coords`. The returned
/// array is block-strided by field dimension and must hold exactly
/// `field_dim * elements.len()` values. The call must be pure on its inputs.
pub trait FieldEvaluator: Send + Sync {
    fn field_dim(&self) -> usize;
    fn evaluate(&self, elements: &[u64], coords: &[f64], space_dim: usize) -> Result<Vec<f64>>;
}
