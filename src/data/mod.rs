//! Distributed data carriers: field adapter contracts, ordinal-keyed
//! distributed maps with their exporter, and the block-strided multivector.

pub mod dist_map;
pub mod field;
pub mod multivector;

pub use dist_map::{DistMap, Exporter};
pub use field::{FieldEvaluator, FieldView, FieldViewMut, VecField};
pub use multivector::MultiVector;
