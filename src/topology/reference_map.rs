//! Inversion of the element geometric map.
//!
//! Given the world-space vertex coordinates of a linear element and a query
//! point, produce the reference coordinates `xi` with `x(xi) = p`. Simplices
//! invert in closed form; the multilinear maps of quadrilaterals, wedges and
//! hexahedra go through a Newton iteration on the shape functions. Newton is
//! capped: failure to converge means "not in this element" to the caller,
//! never an error.
//!
//! Vertex coordinates arrive interleaved (`x0 y0 z0 x1 y1 z1 ...`) in the
//! canonical order of [`crate::topology::ElementTopology`].

use crate::topology::ElementTopology;

const NEWTON_MAX_ITERS: usize = 15;
const NEWTON_TOL: f64 = 1e-13;

/// Map `point` into the reference frame of the element, or `None` when the
/// map is singular or Newton does not converge. Pyramids are not invertible
/// here; callers split them into tetrahedra first.
pub fn map_to_reference(
    topology: ElementTopology,
    verts: &[f64],
    dim: usize,
    point: &[f64],
) -> Option<Vec<f64>> {
    debug_assert_eq!(dim, topology.reference_dim());
    debug_assert_eq!(verts.len(), dim * topology.num_vertices());
    match topology {
        ElementTopology::Line => {
            let len = verts[1] - verts[0];
            if len == 0.0 {
                return None;
            }
            Some(vec![(point[0] - verts[0]) / len])
        }
        ElementTopology::Tri => {
            let a = [
                verts[2] - verts[0],
                verts[4] - verts[0],
                verts[3] - verts[1],
                verts[5] - verts[1],
            ];
            let b = [point[0] - verts[0], point[1] - verts[1]];
            solve2([[a[0], a[1]], [a[2], a[3]]], b).map(|xi| xi.to_vec())
        }
        ElementTopology::Tet => {
            let v = |i: usize, d: usize| verts[3 * i + d];
            let mut a = [[0.0; 3]; 3];
            for (col, vi) in (1..4).enumerate() {
                for row in 0..3 {
                    a[row][col] = v(vi, row) - v(0, row);
                }
            }
            let b = [
                point[0] - v(0, 0),
                point[1] - v(0, 1),
                point[2] - v(0, 2),
            ];
            solve3(a, b).map(|xi| xi.to_vec())
        }
        ElementTopology::Quad => newton(verts, 2, 4, point, &quad_shape, [0.5, 0.5, 0.0]),
        ElementTopology::Wedge => {
            newton(verts, 3, 6, point, &wedge_shape, [1.0 / 3.0, 1.0 / 3.0, 0.5])
        }
        ElementTopology::Hex => newton(verts, 3, 8, point, &hex_shape, [0.5, 0.5, 0.5]),
        ElementTopology::Pyramid => None,
    }
}

/// Shape functions and their reference gradients at `xi`:
/// `out[i] = (N_i, [dN_i/dxi_0, ...])`.
type ShapeFn = dyn Fn(&[f64; 3], &mut [(f64, [f64; 3])]);

fn quad_shape(xi: &[f64; 3], out: &mut [(f64, [f64; 3])]) {
    let (s, t) = (xi[0], xi[1]);
    out[0] = ((1.0 - s) * (1.0 - t), [-(1.0 - t), -(1.0 - s), 0.0]);
    out[1] = (s * (1.0 - t), [1.0 - t, -s, 0.0]);
    out[2] = (s * t, [t, s, 0.0]);
    out[3] = ((1.0 - s) * t, [-t, 1.0 - s, 0.0]);
}

fn wedge_shape(xi: &[f64; 3], out: &mut [(f64, [f64; 3])]) {
    let (s, t, u) = (xi[0], xi[1], xi[2]);
    let lam = [1.0 - s - t, s, t];
    let dlam = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];
    for i in 0..3 {
        out[i] = (
            lam[i] * (1.0 - u),
            [dlam[i][0] * (1.0 - u), dlam[i][1] * (1.0 - u), -lam[i]],
        );
        out[3 + i] = (lam[i] * u, [dlam[i][0] * u, dlam[i][1] * u, lam[i]]);
    }
}

fn hex_shape(xi: &[f64; 3], out: &mut [(f64, [f64; 3])]) {
    let (s, t, u) = (xi[0], xi[1], xi[2]);
    // bottom cycle then top cycle
    let corners = [
        (0.0, 0.0, 0.0),
        (1.0, 0.0, 0.0),
        (1.0, 1.0, 0.0),
        (0.0, 1.0, 0.0),
        (0.0, 0.0, 1.0),
        (1.0, 0.0, 1.0),
        (1.0, 1.0, 1.0),
        (0.0, 1.0, 1.0),
    ];
    for (i, &(a, b, c)) in corners.iter().enumerate() {
        let fs = if a == 0.0 { 1.0 - s } else { s };
        let ft = if b == 0.0 { 1.0 - t } else { t };
        let fu = if c == 0.0 { 1.0 - u } else { u };
        let ds = if a == 0.0 { -1.0 } else { 1.0 };
        let dt = if b == 0.0 { -1.0 } else { 1.0 };
        let du = if c == 0.0 { -1.0 } else { 1.0 };
        out[i] = (fs * ft * fu, [ds * ft * fu, fs * dt * fu, fs * ft * du]);
    }
}

/// Damped-free Newton on `x(xi) - p = 0` for multilinear maps.
fn newton(
    verts: &[f64],
    dim: usize,
    nverts: usize,
    point: &[f64],
    shape: &ShapeFn,
    start: [f64; 3],
) -> Option<Vec<f64>> {
    let mut xi = start;
    let mut basis = vec![(0.0, [0.0; 3]); nverts];
    for _ in 0..NEWTON_MAX_ITERS {
        shape(&xi, &mut basis);

        // residual r = x(xi) - p and Jacobian J[row][col] = dx_row/dxi_col
        let mut r = [0.0f64; 3];
        let mut j = [[0.0f64; 3]; 3];
        for d in 0..dim {
            let mut x = 0.0;
            for i in 0..nverts {
                x += basis[i].0 * verts[dim * i + d];
                for c in 0..dim {
                    j[d][c] += basis[i].1[c] * verts[dim * i + d];
                }
            }
            r[d] = x - point[d];
        }

        let step = if dim == 2 {
            solve2([[j[0][0], j[0][1]], [j[1][0], j[1][1]]], [r[0], r[1]])
                .map(|s| [s[0], s[1], 0.0])?
        } else {
            let s = solve3(j, r)?;
            [s[0], s[1], s[2]]
        };

        let mut delta: f64 = 0.0;
        for d in 0..dim {
            xi[d] -= step[d];
            delta = delta.max(step[d].abs());
        }
        if !delta.is_finite() {
            return None;
        }
        if delta < NEWTON_TOL {
            return Some(xi[..dim].to_vec());
        }
    }
    None
}

fn solve2(a: [[f64; 2]; 2], b: [f64; 2]) -> Option<[f64; 2]> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    if det.abs() < f64::MIN_POSITIVE * 16.0 || !det.is_finite() {
        return None;
    }
    Some([
        (b[0] * a[1][1] - b[1] * a[0][1]) / det,
        (a[0][0] * b[1] - a[1][0] * b[0]) / det,
    ])
}

fn solve3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(a);
    if det.abs() < f64::MIN_POSITIVE * 16.0 || !det.is_finite() {
        return None;
    }
    let mut out = [0.0; 3];
    for col in 0..3 {
        let mut m = a;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        out[col] = det3(m) / det;
    }
    Some(out)
}

fn det3(a: [[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_maps_linearly() {
        let verts = [2.0, 4.0];
        let xi = map_to_reference(ElementTopology::Line, &verts, 1, &[3.0]).unwrap();
        assert!((xi[0] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn degenerate_line_is_singular() {
        let verts = [1.0, 1.0];
        assert!(map_to_reference(ElementTopology::Line, &verts, 1, &[1.0]).is_none());
    }

    #[test]
    fn triangle_barycenter() {
        // physical triangle (0,0), (2,0), (0,2)
        let verts = [0.0, 0.0, 2.0, 0.0, 0.0, 2.0];
        let xi = map_to_reference(ElementTopology::Tri, &verts, 2, &[0.5, 0.5]).unwrap();
        assert!((xi[0] - 0.25).abs() < 1e-14);
        assert!((xi[1] - 0.25).abs() < 1e-14);
    }

    #[test]
    fn unit_tet_is_identity() {
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ];
        let p = [0.1, 0.2, 0.3];
        let xi = map_to_reference(ElementTopology::Tet, &verts, 3, &p).unwrap();
        for d in 0..3 {
            assert!((xi[d] - p[d]).abs() < 1e-14);
        }
    }

    #[test]
    fn skewed_quad_newton_converges() {
        // parallelogram: (0,0), (2,0), (3,1), (1,1)
        let verts = [0.0, 0.0, 2.0, 0.0, 3.0, 1.0, 1.0, 1.0];
        let p = [1.5, 0.5]; // center
        let xi = map_to_reference(ElementTopology::Quad, &verts, 2, &p).unwrap();
        assert!((xi[0] - 0.5).abs() < 1e-10);
        assert!((xi[1] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn unit_hex_is_identity() {
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0, //
            0.0, 1.0, 1.0,
        ];
        let p = [0.25, 0.75, 0.5];
        let xi = map_to_reference(ElementTopology::Hex, &verts, 3, &p).unwrap();
        for d in 0..3 {
            assert!((xi[d] - p[d]).abs() < 1e-12);
        }
    }

    #[test]
    fn unit_wedge_is_identity() {
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            0.0, 1.0, 1.0,
        ];
        let p = [0.2, 0.3, 0.6];
        let xi = map_to_reference(ElementTopology::Wedge, &verts, 3, &p).unwrap();
        for d in 0..3 {
            assert!((xi[d] - p[d]).abs() < 1e-12);
        }
    }

    #[test]
    fn pyramid_is_not_directly_invertible() {
        let verts = [0.0; 15];
        assert!(map_to_reference(ElementTopology::Pyramid, &verts, 3, &[0.0, 0.0, 0.0]).is_none());
    }
}
