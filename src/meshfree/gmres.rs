//! Restarted GMRES over distributed vectors.
//!
//! The operator is a caller-supplied collective matvec; vectors are this
//! rank's slice of the distributed unknown, and every inner product funnels
//! through an all-reduce, so the iteration makes identical decisions on every
//! rank. Arnoldi uses modified Gram-Schmidt; the least-squares problem is
//! carried by Givens rotations, so the residual norm is available at no extra
//! cost each inner step.

use crate::algs::collective::sum_f64;
use crate::algs::communicator::Communicator;
use crate::error::Result;

/// Solver configuration, defaults matching the interpolator contract.
#[derive(Debug, Clone)]
pub struct GmresConfig {
    /// Total inner-iteration budget across restarts.
    pub maximum_iterations: usize,
    /// Relative residual target.
    pub convergence_tolerance: f64,
    /// Krylov basis size per restart cycle.
    pub num_blocks: usize,
    /// Nonzero enables per-cycle residual logging.
    pub verbosity: u32,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: 1000,
            convergence_tolerance: 1.0e-8,
            num_blocks: 100,
            verbosity: 0,
        }
    }
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmresOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub residual: f64,
}

fn dot<C: Communicator>(comm: &C, a: &[f64], b: &[f64]) -> Result<f64> {
    let local: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    sum_f64(comm, local)
}

fn norm<C: Communicator>(comm: &C, v: &[f64]) -> Result<f64> {
    Ok(dot(comm, v, v)?.sqrt())
}

/// Givens rotation `(c, s, r)` with `c*f + s*g = r`, `-s*f + c*g = 0`.
fn givens(f: f64, g: f64) -> (f64, f64, f64) {
    if g == 0.0 {
        return (1.0, 0.0, f);
    }
    if f == 0.0 {
        return (0.0, g.signum(), g.abs());
    }
    let scale = f.abs().max(g.abs());
    let fs = f / scale;
    let gs = g / scale;
    let mag = (fs * fs + gs * gs).sqrt();
    let r = mag * scale * f.signum();
    (f.abs() / (mag * scale), g / r, r)
}

/// Solve `op(x) = b` for the distributed unknown `x` (updated in place,
/// initial content used as the starting guess). Collective.
pub fn gmres<C, F>(comm: &C, op: F, b: &[f64], x: &mut [f64], cfg: &GmresConfig) -> Result<GmresOutcome>
where
    C: Communicator,
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    let m = cfg.num_blocks.max(1);

    let b_norm = norm(comm, b)?;
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(GmresOutcome {
            converged: true,
            iterations: 0,
            residual: 0.0,
        });
    }

    let mut total_iters = 0usize;
    let mut residual = f64::INFINITY;

    'outer: loop {
        let ax = op(x)?;
        let mut r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
        let r_norm = norm(comm, &r)?;
        residual = r_norm / b_norm;
        if residual <= cfg.convergence_tolerance {
            break;
        }
        if total_iters >= cfg.maximum_iterations {
            break;
        }

        // Krylov basis for this cycle.
        let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        for value in r.iter_mut() {
            *value /= r_norm;
        }
        v.push(r);

        let mut h = vec![vec![0.0f64; m]; m + 1];
        let mut cs = vec![0.0f64; m];
        let mut sn = vec![0.0f64; m];
        let mut g = vec![0.0f64; m + 1];
        g[0] = r_norm;

        let mut steps = 0usize;
        for j in 0..m {
            if total_iters >= cfg.maximum_iterations {
                break;
            }
            let mut w = op(&v[j])?;

            // modified Gram-Schmidt
            for i in 0..=j {
                let hij = dot(comm, &v[i], &w)?;
                h[i][j] = hij;
                for (wk, vk) in w.iter_mut().zip(&v[i]) {
                    *wk -= hij * vk;
                }
            }
            let wnorm = norm(comm, &w)?;
            h[j + 1][j] = wnorm;

            for i in 0..j {
                let t = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
                h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
                h[i][j] = t;
            }
            let (c, s, rr) = givens(h[j][j], h[j + 1][j]);
            h[j][j] = rr;
            h[j + 1][j] = 0.0;
            cs[j] = c;
            sn[j] = s;
            let t = c * g[j];
            g[j + 1] = -s * g[j];
            g[j] = t;

            total_iters += 1;
            steps = j + 1;
            residual = g[j + 1].abs() / b_norm;

            if wnorm != 0.0 {
                let next: Vec<f64> = w.iter().map(|&wk| wk / wnorm).collect();
                v.push(next);
            } else {
                // exact breakdown: the Krylov space is invariant
                update_solution(x, &h, &g, &v, steps);
                if residual <= cfg.convergence_tolerance {
                    break 'outer;
                }
                continue 'outer;
            }

            if residual <= cfg.convergence_tolerance {
                update_solution(x, &h, &g, &v, steps);
                break 'outer;
            }
        }

        update_solution(x, &h, &g, &v, steps);
        if cfg.verbosity != 0 {
            log::debug!(
                "gmres: {} iterations, relative residual {:.3e}",
                total_iters,
                residual
            );
        }
        if total_iters >= cfg.maximum_iterations {
            let ax = op(x)?;
            let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
            residual = norm(comm, &r)? / b_norm;
            break;
        }
    }

    Ok(GmresOutcome {
        converged: residual <= cfg.convergence_tolerance,
        iterations: total_iters,
        residual,
    })
}

/// Back-substitute the Givens-triangularized system and accumulate into `x`.
fn update_solution(x: &mut [f64], h: &[Vec<f64>], g: &[f64], v: &[Vec<f64>], steps: usize) {
    if steps == 0 {
        return;
    }
    let mut y = vec![0.0f64; steps];
    for i in (0..steps).rev() {
        let mut acc = g[i];
        for k in i + 1..steps {
            acc -= h[i][k] * y[k];
        }
        y[i] = acc / h[i][i];
    }
    for (j, yj) in y.iter().enumerate() {
        for (xi, vij) in x.iter_mut().zip(&v[j]) {
            *xi += yj * vij;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn dense_matvec(a: &[Vec<f64>]) -> impl Fn(&[f64]) -> Result<Vec<f64>> + '_ {
        move |x: &[f64]| {
            Ok(a.iter()
                .map(|row| row.iter().zip(x).map(|(aij, xj)| aij * xj).sum())
                .collect())
        }
    }

    #[test]
    fn identity_converges_immediately() {
        let comm = NoComm;
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let b = [3.0, -4.0];
        let mut x = [0.0; 2];
        let out = gmres(&comm, dense_matvec(&a), &b, &mut x, &GmresConfig::default()).unwrap();
        assert!(out.converged);
        assert!((x[0] - 3.0).abs() < 1e-10);
        assert!((x[1] + 4.0).abs() < 1e-10);
    }

    #[test]
    fn nonsymmetric_system_converges() {
        let comm = NoComm;
        let a = vec![
            vec![4.0, 1.0, 0.0],
            vec![-1.0, 3.0, 0.5],
            vec![0.0, 2.0, 5.0],
        ];
        let b = [1.0, 2.0, 3.0];
        let mut x = [0.0; 3];
        let out = gmres(&comm, dense_matvec(&a), &b, &mut x, &GmresConfig::default()).unwrap();
        assert!(out.converged);
        let ax = dense_matvec(&a)(&x).unwrap();
        for (axi, bi) in ax.iter().zip(&b) {
            assert!((axi - bi).abs() < 1e-7);
        }
    }

    #[test]
    fn restart_cycles_still_converge() {
        let comm = NoComm;
        // restart length 2 forces several cycles on a 4x4 system
        let a = vec![
            vec![5.0, 1.0, 0.0, 0.0],
            vec![1.0, 4.0, 1.0, 0.0],
            vec![0.0, 1.0, 3.0, 1.0],
            vec![0.0, 0.0, 1.0, 2.0],
        ];
        let b = [1.0, 0.0, 0.0, 1.0];
        let mut x = [0.0; 4];
        let cfg = GmresConfig {
            num_blocks: 2,
            ..GmresConfig::default()
        };
        let out = gmres(&comm, dense_matvec(&a), &b, &mut x, &cfg).unwrap();
        assert!(out.converged, "residual {}", out.residual);
        let ax = dense_matvec(&a)(&x).unwrap();
        for (axi, bi) in ax.iter().zip(&b) {
            assert!((axi - bi).abs() < 1e-7);
        }
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let comm = NoComm;
        let a = vec![
            vec![1.0, 2.0, 0.0],
            vec![0.0, 1.0, 4.0],
            vec![3.0, 0.0, 1.0],
        ];
        let b = [1.0, 1.0, 1.0];
        let mut x = [0.0; 3];
        let cfg = GmresConfig {
            maximum_iterations: 1,
            num_blocks: 1,
            ..GmresConfig::default()
        };
        let out = gmres(&comm, dense_matvec(&a), &b, &mut x, &cfg).unwrap();
        assert!(!out.converged);
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn zero_rhs_returns_zero() {
        let comm = NoComm;
        let a = vec![vec![2.0]];
        let b = [0.0];
        let mut x = [5.0];
        let out = gmres(&comm, dense_matvec(&a), &b, &mut x, &GmresConfig::default()).unwrap();
        assert!(out.converged);
        assert_eq!(x[0], 0.0);
    }
}
