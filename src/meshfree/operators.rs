//! The spline interpolation operators.
//!
//! The coefficient vector is laid out contiguously across ranks: rank 0 owns
//! the `d + 1` polynomial coefficients followed by its source-center
//! coefficients, every other rank owns just its centers. `C` is the coupled
//! symmetric block system
//!
//! ```text
//! [ 0      Pᵀ ]
//! [ P   Φ + αI ]
//! ```
//!
//! with `Φ` the compactly supported kernel matrix (sparse: only within-radius
//! pairs) and `P` the `[1, x, y, z]` polynomial tail. `A` maps a coefficient
//! vector to evaluations at the target centers. Both operators keep local CSR
//! rows over the gathered (ghosted) center list; a matvec imports the ghost
//! coefficients along a cached plan, broadcasts the polynomial block from
//! rank 0, and reduces the polynomial rows with an all-reduce.

use crate::algs::collective::{all_reduce_f64, broadcast, ReduceOp};
use crate::algs::communicator::Communicator;
use crate::algs::distributor::ImportPlan;
use crate::error::{Result, TransferError};
use crate::meshfree::basis::RadialBasis;
use crate::meshfree::pairing::SplinePairing;

/// Cached plan for fetching off-rank coefficient values by global id.
pub struct GhostImport {
    request: ImportPlan,
    reply: ImportPlan,
    /// Local slots the owner side serves, in request arrival order.
    serve_slots: Vec<usize>,
    num_ghosts: usize,
}

impl GhostImport {
    /// `starts` are the P+1 prefix bounds of the contiguous coefficient
    /// layout; `ghost_gids` are the global ids this rank needs each matvec.
    pub fn new<C: Communicator>(
        comm: &C,
        starts: &[u64],
        ghost_gids: &[u64],
        tag: u16,
    ) -> Result<Self> {
        let owners: Vec<usize> = ghost_gids
            .iter()
            .map(|&gid| starts.partition_point(|&s| s <= gid) - 1)
            .collect();
        let request = ImportPlan::from_destinations(comm, &owners, tag)?;
        let mut asked = vec![0u64; request.num_imports()];
        request.do_posts_and_waits(comm, ghost_gids, 1, &mut asked)?;

        let my_start = starts[comm.rank()];
        let my_end = starts[comm.rank() + 1];
        let serve_slots = asked
            .iter()
            .map(|&gid| {
                if gid < my_start || gid >= my_end {
                    return Err(TransferError::InvalidPlan {
                        context: "ghost request for a coefficient this rank does not own",
                        expected: my_start as usize,
                        got: gid as usize,
                    });
                }
                Ok((gid - my_start) as usize)
            })
            .collect::<Result<Vec<_>>>()?;

        let reply = ImportPlan::from_destinations(comm, &request.import_sources(), tag + 1)?;
        Ok(Self {
            request,
            reply,
            serve_slots,
            num_ghosts: ghost_gids.len(),
        })
    }

    /// Gather the ghost values of `local` (this rank's coefficient slice),
    /// aligned with the `ghost_gids` the import was built over.
    pub fn fetch<C: Communicator>(&self, comm: &C, local: &[f64]) -> Result<Vec<f64>> {
        let served: Vec<f64> = self.serve_slots.iter().map(|&s| local[s]).collect();
        let mut wire = vec![0.0f64; self.reply.num_imports()];
        self.reply.do_posts_and_waits(comm, &served, 1, &mut wire)?;

        // Replies retrace the request plan's wire order.
        let mut out = vec![0.0f64; self.num_ghosts];
        for (wire_pos, &ghost_idx) in self.request.send_order().iter().enumerate() {
            out[ghost_idx] = wire[wire_pos];
        }
        Ok(out)
    }
}

/// Broadcast the polynomial block of the coefficient vector from rank 0.
fn poly_coeffs<C: Communicator>(comm: &C, x: &[f64], num_poly: usize) -> Result<Vec<f64>> {
    let mut p = vec![0.0f64; num_poly];
    if comm.rank() == 0 {
        p.copy_from_slice(&x[..num_poly]);
    }
    broadcast(comm, 0, &mut p)?;
    Ok(p)
}

fn distance(dim: usize, a: &[f64], b: &[f64]) -> f64 {
    (0..dim).map(|d| (a[d] - b[d]).powi(2)).sum::<f64>().sqrt()
}

/// The interpolation operator `C`.
pub struct SplineOperatorC {
    dim: usize,
    num_poly: usize,
    /// `num_poly` on rank 0, 0 elsewhere.
    offset: usize,
    /// Local source centers, interleaved.
    centers: Vec<f64>,
    indptr: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    ghosts: GhostImport,
}

impl SplineOperatorC {
    #[allow(clippy::too_many_arguments)]
    pub fn new<C: Communicator>(
        comm: &C,
        dim: usize,
        centers: &[f64],
        own_gids: &[u64],
        dist_centers: &[f64],
        dist_gids: &[u64],
        pairing: &SplinePairing,
        basis: &dyn RadialBasis,
        alpha: f64,
        starts: &[u64],
        tag: u16,
    ) -> Result<Self> {
        let num_poly = dim + 1;
        let offset = if comm.rank() == 0 { num_poly } else { 0 };
        let num_centers = centers.len() / dim;
        debug_assert_eq!(pairing.num_queries(), num_centers);

        let mut indptr = Vec::with_capacity(num_centers + 1);
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        indptr.push(0);
        for i in 0..num_centers {
            let si = &centers[i * dim..(i + 1) * dim];
            for &k in pairing.neighbors(i) {
                let sk = &dist_centers[k * dim..(k + 1) * dim];
                let mut value = basis.evaluate(distance(dim, si, sk));
                if dist_gids[k] == own_gids[i] {
                    value += alpha;
                }
                cols.push(k);
                vals.push(value);
            }
            indptr.push(cols.len());
        }

        let ghosts = GhostImport::new(comm, starts, dist_gids, tag)?;
        Ok(Self {
            dim,
            num_poly,
            offset,
            centers: centers.to_vec(),
            indptr,
            cols,
            vals,
            ghosts,
        })
    }

    /// Local length of the coefficient vector on this rank.
    pub fn local_len(&self) -> usize {
        self.offset + self.centers.len() / self.dim
    }

    /// `y = C x`. Collective; every rank must call with its local slice.
    pub fn apply<C: Communicator>(&self, comm: &C, x: &[f64], y: &mut [f64]) -> Result<()> {
        if x.len() != self.local_len() || y.len() != self.local_len() {
            return Err(TransferError::InvalidPlan {
                context: "operator C vector length",
                expected: self.local_len(),
                got: x.len().max(y.len()),
            });
        }
        let ghost_x = self.ghosts.fetch(comm, x)?;
        let p = poly_coeffs(comm, x, self.num_poly)?;

        y.fill(0.0);
        let num_centers = self.centers.len() / self.dim;
        for i in 0..num_centers {
            let si = &self.centers[i * self.dim..(i + 1) * self.dim];
            let mut acc = p[0];
            for d in 0..self.dim {
                acc += p[1 + d] * si[d];
            }
            for nz in self.indptr[i]..self.indptr[i + 1] {
                acc += self.vals[nz] * ghost_x[self.cols[nz]];
            }
            y[self.offset + i] = acc;
        }

        // Polynomial rows: Pᵀ over every center, reduced globally.
        let mut moments = vec![0.0f64; self.num_poly];
        for i in 0..num_centers {
            let xi = x[self.offset + i];
            moments[0] += xi;
            for d in 0..self.dim {
                moments[1 + d] += self.centers[i * self.dim + d] * xi;
            }
        }
        all_reduce_f64(comm, ReduceOp::Sum, &mut moments)?;
        if comm.rank() == 0 {
            y[..self.num_poly].copy_from_slice(&moments);
        }
        Ok(())
    }
}

/// The transformation operator `A`: coefficients to target evaluations.
pub struct SplineOperatorA {
    dim: usize,
    num_poly: usize,
    /// Local target centers, interleaved.
    targets: Vec<f64>,
    indptr: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    ghosts: GhostImport,
}

impl SplineOperatorA {
    #[allow(clippy::too_many_arguments)]
    pub fn new<C: Communicator>(
        comm: &C,
        dim: usize,
        targets: &[f64],
        dist_centers: &[f64],
        dist_gids: &[u64],
        pairing: &SplinePairing,
        basis: &dyn RadialBasis,
        starts: &[u64],
        tag: u16,
    ) -> Result<Self> {
        let num_targets = targets.len() / dim;
        debug_assert_eq!(pairing.num_queries(), num_targets);

        let mut indptr = Vec::with_capacity(num_targets + 1);
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        indptr.push(0);
        for j in 0..num_targets {
            let tj = &targets[j * dim..(j + 1) * dim];
            for &k in pairing.neighbors(j) {
                let sk = &dist_centers[k * dim..(k + 1) * dim];
                cols.push(k);
                vals.push(basis.evaluate(distance(dim, tj, sk)));
            }
            indptr.push(cols.len());
        }

        let ghosts = GhostImport::new(comm, starts, dist_gids, tag)?;
        Ok(Self {
            dim,
            num_poly: dim + 1,
            targets: targets.to_vec(),
            indptr,
            cols,
            vals,
            ghosts,
        })
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len() / self.dim
    }

    /// `y = A x` with `x` this rank's coefficient slice and `y` the local
    /// target evaluations. Collective.
    pub fn apply<C: Communicator>(&self, comm: &C, x: &[f64], y: &mut [f64]) -> Result<()> {
        if y.len() != self.num_targets() {
            return Err(TransferError::InvalidPlan {
                context: "operator A output length",
                expected: self.num_targets(),
                got: y.len(),
            });
        }
        let ghost_x = self.ghosts.fetch(comm, x)?;
        let p = poly_coeffs(comm, x, self.num_poly)?;

        for j in 0..self.num_targets() {
            let tj = &self.targets[j * self.dim..(j + 1) * self.dim];
            let mut acc = p[0];
            for d in 0..self.dim {
                acc += p[1 + d] * tj[d];
            }
            for nz in self.indptr[j]..self.indptr[j + 1] {
                acc += self.vals[nz] * ghost_x[self.cols[nz]];
            }
            y[j] = acc;
        }
        Ok(())
    }
}
