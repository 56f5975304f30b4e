//! Geometric partitioning used as the rendezvous search substrate.

pub mod rcb;

pub use rcb::{rcb_partition, RcbConfig, RcbTree};
