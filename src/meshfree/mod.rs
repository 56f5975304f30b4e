//! Meshless solution transfer: compactly supported radial-basis spline
//! interpolation between distributed center sets.

pub mod basis;
pub mod center_distributor;
pub mod gmres;
pub mod interpolator;
pub mod operators;
pub mod pairing;

pub use basis::{RadialBasis, WendlandC2};
pub use gmres::{gmres, GmresConfig, GmresOutcome};
pub use interpolator::{SplineInterpolator, SplineParams};
