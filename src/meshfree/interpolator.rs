//! The spline interpolator: build the coupled operators, solve, evaluate.
//!
//! Construction gathers ghost centers on both the source/source and
//! source/target sides, pairs neighbors, and assembles `C` and `A`.
//! Interpolation solves `C x = b` with restarted GMRES for each data
//! dimension (the polynomial rows of `b` are zero; source values land below
//! them) and then evaluates `y = A x` at the targets. A solve that does not
//! reach the tolerance is fatal; the caller must supply better parameters.

use crate::algs::collective::all_gather;
use crate::algs::communicator::Communicator;
use crate::error::{Result, TransferError};
use crate::meshfree::basis::RadialBasis;
use crate::meshfree::center_distributor::CenterDistributor;
use crate::meshfree::gmres::{gmres, GmresConfig};
use crate::meshfree::operators::{SplineOperatorA, SplineOperatorC};
use crate::meshfree::pairing::SplinePairing;

const TAG_SOURCE_GATHER: u16 = 0x0900;
const TAG_TARGET_GATHER: u16 = 0x0910;
const TAG_C_GHOSTS: u16 = 0x0920;
const TAG_A_GHOSTS: u16 = 0x0930;

/// Named-parameter bag for the interpolator.
#[derive(Debug, Clone)]
pub struct SplineParams {
    /// Nonzero enables solver progress logging.
    pub verbosity: u32,
    pub maximum_iterations: usize,
    pub convergence_tolerance: f64,
    /// GMRES restart length.
    pub num_blocks: usize,
    /// Right-hand sides per solve; kept for interface compatibility, the
    /// solver currently processes one at a time.
    pub block_size: usize,
}

impl Default for SplineParams {
    fn default() -> Self {
        Self {
            verbosity: 0,
            maximum_iterations: 1000,
            convergence_tolerance: 1.0e-8,
            num_blocks: 100,
            block_size: 1,
        }
    }
}

/// A built interpolation operator pair over fixed center sets.
pub struct SplineInterpolator {
    dim: usize,
    num_sources: usize,
    num_targets: usize,
    /// Polynomial offset into the local coefficient slice (rank 0 only).
    offset: usize,
    c: SplineOperatorC,
    a: SplineOperatorA,
    solver: GmresConfig,
}

impl SplineInterpolator {
    /// Collective. `source_centers` / `target_centers` are this rank's
    /// centers, interleaved (`dim` coordinates per point); `basis` fixes the
    /// interaction radius; `alpha >= 0` regularizes the kernel diagonal.
    pub fn new<C: Communicator>(
        comm: &C,
        dim: usize,
        source_centers: &[f64],
        target_centers: &[f64],
        basis: &dyn RadialBasis,
        alpha: f64,
        params: SplineParams,
    ) -> Result<Self> {
        if source_centers.len() % dim != 0 || target_centers.len() % dim != 0 {
            return Err(TransferError::RaggedBlock {
                context: "interpolator centers",
                expected: dim,
                got: source_centers.len() % dim + target_centers.len() % dim,
            });
        }
        let radius = basis.radius();
        let num_sources = source_centers.len() / dim;
        let num_targets = target_centers.len() / dim;
        let num_poly = dim + 1;
        let offset = if comm.rank() == 0 { num_poly } else { 0 };

        // Contiguous coefficient layout: rank 0 leads with the polynomial
        // block, then each rank's centers.
        let local_len = (offset + num_sources) as u64;
        let lens = all_gather(comm, local_len)?;
        let mut starts = vec![0u64; comm.size() + 1];
        for (r, &len) in lens.iter().enumerate() {
            starts[r + 1] = starts[r] + len;
        }
        let my_start = starts[comm.rank()];
        let own_gids: Vec<u64> = (0..num_sources as u64)
            .map(|j| my_start + offset as u64 + j)
            .collect();

        // Interpolation operator: source centers against themselves.
        let (source_gather, dist_sources) = CenterDistributor::new(
            comm,
            dim,
            source_centers,
            source_centers,
            radius,
            TAG_SOURCE_GATHER,
        )?;
        let mut dist_source_gids = vec![0u64; source_gather.num_imports()];
        source_gather.distribute(comm, &own_gids, 1, &mut dist_source_gids)?;
        let source_pairing = SplinePairing::new(
            dim,
            &dist_sources,
            &dist_source_gids,
            source_centers,
            radius,
        );
        let c = SplineOperatorC::new(
            comm,
            dim,
            source_centers,
            &own_gids,
            &dist_sources,
            &dist_source_gids,
            &source_pairing,
            basis,
            alpha,
            &starts,
            TAG_C_GHOSTS,
        )?;

        // Transformation operator: source centers around the targets.
        let (target_gather, dist_around_targets) = CenterDistributor::new(
            comm,
            dim,
            source_centers,
            target_centers,
            radius,
            TAG_TARGET_GATHER,
        )?;
        let mut dist_target_gids = vec![0u64; target_gather.num_imports()];
        target_gather.distribute(comm, &own_gids, 1, &mut dist_target_gids)?;
        let target_pairing = SplinePairing::new(
            dim,
            &dist_around_targets,
            &dist_target_gids,
            target_centers,
            radius,
        );
        let a = SplineOperatorA::new(
            comm,
            dim,
            target_centers,
            &dist_around_targets,
            &dist_target_gids,
            &target_pairing,
            basis,
            &starts,
            TAG_A_GHOSTS,
        )?;

        let solver = GmresConfig {
            maximum_iterations: params.maximum_iterations,
            convergence_tolerance: params.convergence_tolerance,
            num_blocks: params.num_blocks,
            verbosity: params.verbosity,
        };
        Ok(Self {
            dim,
            num_sources,
            num_targets,
            offset,
            c,
            a,
            solver,
        })
    }

    /// Interpolate `num_dims` independent components from the source centers
    /// onto the target centers. Data is block-strided per component.
    /// Collective; fails with [`TransferError::SolverDidNotConverge`] if any
    /// component's solve stalls.
    pub fn interpolate<C: Communicator>(
        &self,
        comm: &C,
        source_data: &[f64],
        num_dims: usize,
        target_data: &mut [f64],
    ) -> Result<()> {
        if source_data.len() != num_dims * self.num_sources {
            return Err(TransferError::EvaluatorSizeMismatch {
                expected: num_dims * self.num_sources,
                got: source_data.len(),
            });
        }
        if target_data.len() != num_dims * self.num_targets {
            return Err(TransferError::EvaluatorSizeMismatch {
                expected: num_dims * self.num_targets,
                got: target_data.len(),
            });
        }

        let local_len = self.c.local_len();
        for k in 0..num_dims {
            // Polynomial rows of the RHS stay zero; data sits below them.
            let mut rhs = vec![0.0f64; local_len];
            rhs[self.offset..].copy_from_slice(
                &source_data[k * self.num_sources..(k + 1) * self.num_sources],
            );

            let mut coeffs = vec![0.0f64; local_len];
            let outcome = gmres(
                comm,
                |v: &[f64]| {
                    let mut out = vec![0.0f64; v.len()];
                    self.c.apply(comm, v, &mut out)?;
                    Ok(out)
                },
                &rhs,
                &mut coeffs,
                &self.solver,
            )?;
            if !outcome.converged {
                return Err(TransferError::SolverDidNotConverge {
                    iterations: outcome.iterations,
                    residual: outcome.residual,
                });
            }
            if self.solver.verbosity != 0 {
                log::debug!(
                    "spline solve (component {}): {} iterations, residual {:.3e}",
                    k,
                    outcome.iterations,
                    outcome.residual
                );
            }

            self.a.apply(
                comm,
                &coeffs,
                &mut target_data[k * self.num_targets..(k + 1) * self.num_targets],
            )?;
        }
        Ok(())
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
