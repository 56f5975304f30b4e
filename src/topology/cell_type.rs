//! Element topology registry.
//!
//! Each supported topology maps to a canonical reference cell with a fixed
//! vertex ordering; connectivity everywhere in the crate is stored in this
//! canonical order (user adapters declare a permutation to it, see
//! [`crate::mesh::MeshBlock`]).
//!
//! Canonical reference cells and vertex orders:
//!
//! - `Line`: `[0,1]`, vertices `0, 1`.
//! - `Tri`: unit simplex, `(0,0), (1,0), (0,1)`.
//! - `Quad`: `[0,1]^2`, counterclockwise cycle `(0,0), (1,0), (1,1), (0,1)`.
//! - `Tet`: unit simplex, `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
//! - `Pyramid`: base cycle `(0,0,0), (1,0,0), (1,1,0), (0,1,0)`, apex last.
//! - `Wedge`: triangle at `z=0` extruded to `z=1`, bottom then top.
//! - `Hex`: `[0,1]^3`, bottom cycle then top cycle.

use serde::{Deserialize, Serialize};

/// Tag values are stable wire constants; do not reorder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementTopology {
    Line = 0,
    Tri = 1,
    Quad = 2,
    Tet = 3,
    Pyramid = 4,
    Wedge = 5,
    Hex = 6,
}

impl ElementTopology {
    /// Stable integer tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Line),
            1 => Some(Self::Tri),
            2 => Some(Self::Quad),
            3 => Some(Self::Tet),
            4 => Some(Self::Pyramid),
            5 => Some(Self::Wedge),
            6 => Some(Self::Hex),
            _ => None,
        }
    }

    /// Vertices of the linear element.
    pub fn num_vertices(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Tri => 3,
            Self::Quad => 4,
            Self::Tet => 4,
            Self::Pyramid => 5,
            Self::Wedge => 6,
            Self::Hex => 8,
        }
    }

    /// Topological dimension of the reference cell.
    pub fn reference_dim(self) -> usize {
        match self {
            Self::Line => 1,
            Self::Tri | Self::Quad => 2,
            Self::Tet | Self::Pyramid | Self::Wedge | Self::Hex => 3,
        }
    }

    /// Is `xi` inside this topology's reference cell? The tolerance is
    /// interpreted in reference coordinates (absolute).
    pub fn reference_inclusion(self, xi: &[f64], tol: f64) -> bool {
        let in01 = |x: f64| x >= -tol && x <= 1.0 + tol;
        match self {
            Self::Line => in01(xi[0]),
            Self::Tri => xi[0] >= -tol && xi[1] >= -tol && xi[0] + xi[1] <= 1.0 + tol,
            Self::Quad => in01(xi[0]) && in01(xi[1]),
            Self::Tet => {
                xi[0] >= -tol
                    && xi[1] >= -tol
                    && xi[2] >= -tol
                    && xi[0] + xi[1] + xi[2] <= 1.0 + tol
            }
            Self::Wedge => {
                xi[0] >= -tol && xi[1] >= -tol && xi[0] + xi[1] <= 1.0 + tol && in01(xi[2])
            }
            Self::Hex => in01(xi[0]) && in01(xi[1]) && in01(xi[2]),
            // Apex above the base center: the cross-section at height z is
            // the square [z/2, 1-z/2]^2. Containment queries never take this
            // path (pyramids are split into tetrahedra), but the predicate is
            // part of the registry contract.
            Self::Pyramid => {
                let z = xi[2];
                in01(z)
                    && (xi[0] - 0.5).abs() <= 0.5 * (1.0 - z) + tol
                    && (xi[1] - 0.5).abs() <= 0.5 * (1.0 - z) + tol
            }
        }
    }
}
