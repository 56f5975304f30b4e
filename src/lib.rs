//! # mesh-transfer
//!
//! mesh-transfer moves field data between distributed meshes and point
//! clouds in SPMD parallel codes. Two complementary strategies are provided:
//! a mesh-based *shared-domain map* that locates every target point in a
//! source element through a rendezvous decomposition, and a meshless
//! *spline interpolator* built on compactly supported radial basis
//! functions.
//!
//! ## Features
//! - Rendezvous decomposition (recursive coordinate bisection + kD-tree)
//!   as a reusable geometric search substrate
//! - Point location for linear and multilinear element topologies,
//!   including the pyramid split into tetrahedra
//! - Inverse-communication plans reusable across payloads, with ordinal
//!   maps and an exporter for field delivery
//! - Compactly supported RBF interpolation with a distributed GMRES solve
//! - Pluggable communication backends: serial, threaded (for tests), and
//!   MPI behind the `mpi-support` feature
//!
//! ## Usage
//! Build a [`transfer::SharedDomainMap`] once per source/target pairing,
//! then stream fields through it:
//!
//! ```no_run
//! # use mesh_transfer::prelude::*;
//! # fn demo(comm: &NoComm, source: &mesh_transfer::mesh::MeshManager,
//! #         coords: &dyn FieldView, evaluator: &dyn FieldEvaluator,
//! #         target: &mut mesh_transfer::data::VecField) -> mesh_transfer::error::Result<()> {
//! let mut map = SharedDomainMap::new(3, false);
//! map.setup(comm, Some(source), Some(coords), 1.0e-9)?;
//! map.apply(comm, Some(evaluator), Some(target))?;
//! # Ok(())
//! # }
//! ```

pub mod algs;
pub mod data;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod meshfree;
pub mod partitioning;
pub mod rendezvous;
pub mod topology;
pub mod transfer;

/// The most-used traits and types in one import.
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::distributor::ImportPlan;
    pub use crate::data::{FieldEvaluator, FieldView, FieldViewMut, VecField};
    pub use crate::error::{Result, TransferError};
    pub use crate::geometry::BoundingBox;
    pub use crate::mesh::{MeshBlock, MeshBlockView, MeshManager};
    pub use crate::meshfree::{RadialBasis, SplineInterpolator, SplineParams, WendlandC2};
    pub use crate::topology::ElementTopology;
    pub use crate::transfer::SharedDomainMap;
}
