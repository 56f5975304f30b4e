//! Block-strided multivector: `num_dims` components per local point, stored
//! all-first-components-first, matching the field adapter layout.

use crate::error::{Result, TransferError};

#[derive(Debug, Clone, PartialEq)]
pub struct MultiVector {
    num_dims: usize,
    num_points: usize,
    values: Vec<f64>,
}

impl MultiVector {
    pub fn zeros(num_dims: usize, num_points: usize) -> Self {
        Self {
            num_dims,
            num_points,
            values: vec![0.0; num_dims * num_points],
        }
    }

    /// Wrap an existing block-strided buffer.
    pub fn from_values(num_dims: usize, values: Vec<f64>) -> Result<Self> {
        if num_dims == 0 || values.len() % num_dims != 0 {
            return Err(TransferError::RaggedBlock {
                context: "multivector values",
                expected: num_dims,
                got: values.len(),
            });
        }
        let num_points = values.len() / num_dims;
        Ok(Self {
            num_dims,
            num_points,
            values,
        })
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, dim: usize, point: usize) -> f64 {
        self.values[dim * self.num_points + point]
    }

    pub fn set(&mut self, dim: usize, point: usize, value: f64) {
        self.values[dim * self.num_points + point] = value;
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}
