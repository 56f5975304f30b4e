//! Fixed-layout, little-endian wire records for inter-rank payloads.
//!
//! Everything that crosses a rank boundary is either a plain `u64`/`f64`
//! slice or one of these `#[repr(C)]` Pod records, cast to bytes with
//! `bytemuck`. Records are padded explicitly; compile-time assertions pin the
//! sizes so an accidental field change cannot silently corrupt the protocol.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Upper bound on vertices per element (hexahedron).
pub const MAX_ELEMENT_VERTICES: usize = 8;

/// One mesh element shipped to a rendezvous rank: its handle, canonical
/// connectivity (vertex handles), the vertex coordinates (interleaved, 3
/// slots per vertex, unused slots zero), and provenance.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireElement {
    pub vertices: [u64; MAX_ELEMENT_VERTICES],
    pub coords: [f64; 3 * MAX_ELEMENT_VERTICES],
    pub handle: u64,
    pub source_rank: u32,
    pub topology: u8,
    pub num_vertices: u8,
    /// 1 if the receiving rank is the element's rendezvous owner.
    pub owned: u8,
    pub _pad: u8,
}

const_assert_eq!(std::mem::size_of::<WireElement>(), 272);

/// Ordinal-directory record: who owns `ordinal` in a distributed map.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireOwnerRecord {
    pub ordinal: u64,
    pub owner: u64,
}

const_assert_eq!(std::mem::size_of::<WireOwnerRecord>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_record_round_trips_through_bytes() {
        let mut record = WireElement::zeroed();
        record.handle = 42;
        record.source_rank = 3;
        record.topology = 6;
        record.num_vertices = 8;
        record.owned = 1;
        record.vertices[..4].copy_from_slice(&[10, 11, 12, 13]);
        record.coords[0] = -1.25;

        let bytes = bytemuck::bytes_of(&record).to_vec();
        let back: WireElement = *bytemuck::from_bytes(&bytes);
        assert_eq!(back.handle, 42);
        assert_eq!(back.source_rank, 3);
        assert_eq!(back.num_vertices, 8);
        assert_eq!(back.vertices[2], 12);
        assert_eq!(back.coords[0], -1.25);
    }

    #[test]
    fn owner_record_layout() {
        let rec = WireOwnerRecord {
            ordinal: u64::MAX - 1,
            owner: 5,
        };
        let bytes = bytemuck::bytes_of(&rec);
        assert_eq!(bytes.len(), 16);
        let back: WireOwnerRecord = *bytemuck::from_bytes(bytes);
        assert_eq!(back.ordinal, u64::MAX - 1);
        assert_eq!(back.owner, 5);
    }
}
