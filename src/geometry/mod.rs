//! Geometric primitives: axis-aligned bounding boxes and the local spatial
//! index used by the rendezvous decomposition.

pub mod bounding_box;
pub mod kdtree;

pub use bounding_box::BoundingBox;
pub use kdtree::{KdItem, KdTree};
