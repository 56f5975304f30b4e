//! Inverse-communication plans.
//!
//! A caller knows, for each of its local items, the destination rank. From
//! that alone [`ImportPlan::from_destinations`] works out the full exchange
//! topology (who sends how much to whom, who receives how much from whom) via
//! one all-to-all of counts. The plan is then reused to move any number of
//! independent Pod payloads along the same topology with
//! [`ImportPlan::do_posts_and_waits`], the pattern the shared-domain map
//! leans on for ordinals, coordinates and element handles alike.
//!
//! Items destined for the same `(source, destination)` rank pair arrive in
//! sender-side order; received items are grouped by source rank, ascending.

use crate::algs::collective::all_to_all_counts;
use crate::algs::communicator::{Communicator, Wait};
use crate::error::{Result, TransferError};
use bytemuck::Pod;

/// A reusable communication plan derived from per-item destination ranks.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    rank: usize,
    /// Item indices reordered so items for one destination are contiguous,
    /// preserving the caller's order within each destination.
    send_perm: Vec<usize>,
    /// Destination ranks with at least one item, ascending.
    images_to: Vec<usize>,
    /// Item count per entry of `images_to`.
    lengths_to: Vec<usize>,
    /// Source ranks that will send to us, ascending.
    images_from: Vec<usize>,
    /// Item count per entry of `images_from`.
    lengths_from: Vec<usize>,
    num_exports: usize,
    num_imports: usize,
    tag: u16,
}

impl ImportPlan {
    /// Build a plan from the destination rank of every local item.
    ///
    /// Collective: every rank must call this with its own (possibly empty)
    /// destination list.
    pub fn from_destinations<C: Communicator>(
        comm: &C,
        destinations: &[usize],
        tag: u16,
    ) -> Result<Self> {
        let size = comm.size();
        let mut counts = vec![0u64; size];
        for &dest in destinations {
            if dest >= size {
                return Err(TransferError::InvalidPlan {
                    context: "destination rank out of range",
                    expected: size,
                    got: dest,
                });
            }
            counts[dest] += 1;
        }

        // Stable counting sort of item indices by destination.
        let mut offsets = vec![0usize; size + 1];
        for r in 0..size {
            offsets[r + 1] = offsets[r] + counts[r] as usize;
        }
        let mut cursor = offsets.clone();
        let mut send_perm = vec![0usize; destinations.len()];
        for (idx, &dest) in destinations.iter().enumerate() {
            send_perm[cursor[dest]] = idx;
            cursor[dest] += 1;
        }

        let recv_counts = all_to_all_counts(comm, &counts)?;

        let pack = |c: &[u64]| -> (Vec<usize>, Vec<usize>) {
            let mut images = Vec::new();
            let mut lengths = Vec::new();
            for (r, &n) in c.iter().enumerate() {
                if n > 0 {
                    images.push(r);
                    lengths.push(n as usize);
                }
            }
            (images, lengths)
        };
        let (images_to, lengths_to) = pack(&counts);
        let (images_from, lengths_from) = pack(&recv_counts);
        let num_imports = lengths_from.iter().sum();

        Ok(Self {
            rank: comm.rank(),
            send_perm,
            images_to,
            lengths_to,
            images_from,
            lengths_from,
            num_exports: destinations.len(),
            num_imports,
            tag,
        })
    }

    /// Number of items this rank will receive.
    pub fn num_imports(&self) -> usize {
        self.num_imports
    }

    /// Source ranks that send to us, ascending.
    pub fn images_from(&self) -> &[usize] {
        &self.images_from
    }

    /// Item counts aligned with [`ImportPlan::images_from`].
    pub fn lengths_from(&self) -> &[usize] {
        &self.lengths_from
    }

    /// Item indices in the order they are placed on the wire (grouped by
    /// destination rank, ascending, caller order within a destination).
    /// Replies that retrace a request plan come back in exactly this order.
    pub fn send_order(&self) -> &[usize] {
        &self.send_perm
    }

    /// The source rank of each received item, in receive order.
    pub fn import_sources(&self) -> Vec<usize> {
        let mut sources = Vec::with_capacity(self.num_imports);
        for (&rank, &len) in self.images_from.iter().zip(&self.lengths_from) {
            sources.extend(std::iter::repeat(rank).take(len));
        }
        sources
    }

    /// Move `items_per_entry` values of `T` per planned item from `send` into
    /// `recv`. `send` is in the caller's original item order; `recv` comes
    /// back grouped by source rank.
    pub fn do_posts_and_waits<C: Communicator, T: Pod>(
        &self,
        comm: &C,
        send: &[T],
        items_per_entry: usize,
        recv: &mut [T],
    ) -> Result<()> {
        if send.len() != self.num_exports * items_per_entry {
            return Err(TransferError::InvalidPlan {
                context: "send buffer size",
                expected: self.num_exports * items_per_entry,
                got: send.len(),
            });
        }
        if recv.len() != self.num_imports * items_per_entry {
            return Err(TransferError::InvalidPlan {
                context: "receive buffer size",
                expected: self.num_imports * items_per_entry,
                got: recv.len(),
            });
        }

        // Pack sends grouped by destination.
        let mut packed: Vec<T> = Vec::with_capacity(send.len());
        for &idx in &self.send_perm {
            packed.extend_from_slice(&send[idx * items_per_entry..(idx + 1) * items_per_entry]);
        }

        let item_bytes = items_per_entry * std::mem::size_of::<T>();

        // Post every receive before any send.
        let mut pending = Vec::new();
        {
            let mut offset = 0usize;
            for (&peer, &len) in self.images_from.iter().zip(&self.lengths_from) {
                if peer != self.rank {
                    pending.push((peer, offset, len, comm.irecv(peer, self.tag, len * item_bytes)));
                }
                offset += len;
            }
        }

        let mut send_handles = Vec::new();
        let mut self_block: Option<(usize, usize)> = None; // (offset into packed, len)
        {
            let mut offset = 0usize;
            for (&peer, &len) in self.images_to.iter().zip(&self.lengths_to) {
                let chunk = &packed[offset * items_per_entry..(offset + len) * items_per_entry];
                if peer == self.rank {
                    self_block = Some((offset, len));
                } else {
                    send_handles.push(comm.isend(peer, self.tag, bytemuck::cast_slice(chunk)));
                }
                offset += len;
            }
        }

        // Local copy for the self-destined block.
        if let Some((src_offset, len)) = self_block {
            let mut dst_offset = 0usize;
            for (&peer, &flen) in self.images_from.iter().zip(&self.lengths_from) {
                if peer == self.rank {
                    recv[dst_offset * items_per_entry..(dst_offset + len) * items_per_entry]
                        .copy_from_slice(
                            &packed[src_offset * items_per_entry
                                ..(src_offset + len) * items_per_entry],
                        );
                    break;
                }
                dst_offset += flen;
            }
        }

        for (peer, offset, len, handle) in pending {
            let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
                neighbor: peer,
                message: "plan receive returned no data".into(),
            })?;
            if bytes.len() != len * item_bytes {
                return Err(TransferError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: len * item_bytes,
                    got: bytes.len(),
                });
            }
            bytemuck::cast_slice_mut(
                &mut recv[offset * items_per_entry..(offset + len) * items_per_entry],
            )
            .copy_from_slice(&bytes);
        }

        for handle in send_handles {
            let _ = handle.wait();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn serial_plan_is_a_local_permutation() {
        let comm = NoComm;
        let plan = ImportPlan::from_destinations(&comm, &[0, 0, 0], 0x0200).unwrap();
        assert_eq!(plan.num_imports(), 3);

        let send = [10u64, 20, 30];
        let mut recv = [0u64; 3];
        plan.do_posts_and_waits(&comm, &send, 1, &mut recv).unwrap();
        assert_eq!(recv, [10, 20, 30]);
    }

    #[test]
    fn serial_plan_rejects_wrong_buffer_sizes() {
        let comm = NoComm;
        let plan = ImportPlan::from_destinations(&comm, &[0, 0], 0x0201).unwrap();
        let send = [1u64, 2];
        let mut recv = [0u64; 5];
        let err = plan.do_posts_and_waits(&comm, &send, 1, &mut recv);
        assert!(matches!(err, Err(TransferError::InvalidPlan { .. })));
    }

    #[test]
    fn two_rank_exchange_preserves_sender_order() {
        let _guard = crate::algs::test_guard::acquire();
        let spawn = |rank: usize| {
            std::thread::spawn(move || {
                let comm = RayonComm::new(rank, 2);
                // Rank 0 keeps one item and sends two to rank 1 (interleaved
                // destinations, so the pack must reorder but stay stable).
                // Rank 1 sends one item to rank 0.
                let (dests, send) = if rank == 0 {
                    (vec![1usize, 0, 1], vec![100u64, 5, 101])
                } else {
                    (vec![0usize], vec![200u64])
                };
                let plan = ImportPlan::from_destinations(&comm, &dests, 0x0210).unwrap();
                let mut recv = vec![0u64; plan.num_imports()];
                plan.do_posts_and_waits(&comm, &send, 1, &mut recv).unwrap();
                (recv, plan.import_sources())
            })
        };
        let t0 = spawn(0);
        let t1 = spawn(1);
        let (recv0, src0) = t0.join().unwrap();
        let (recv1, src1) = t1.join().unwrap();
        // rank 0 receives its own kept item first (source 0), then rank 1's.
        assert_eq!(recv0, vec![5, 200]);
        assert_eq!(src0, vec![0, 1]);
        // rank 1 receives rank 0's two items in their original relative order.
        assert_eq!(recv1, vec![100, 101]);
        assert_eq!(src1, vec![0, 0]);
    }

    #[test]
    fn plan_is_reusable_for_multiple_payloads() {
        let _guard = crate::algs::test_guard::acquire();
        let spawn = |rank: usize| {
            std::thread::spawn(move || {
                let comm = RayonComm::new(rank, 2);
                let dests = if rank == 0 { vec![1usize] } else { vec![0usize] };
                let plan = ImportPlan::from_destinations(&comm, &dests, 0x0220).unwrap();

                let ords = vec![(rank as u64 + 1) * 7];
                let mut got_ords = vec![0u64; plan.num_imports()];
                plan.do_posts_and_waits(&comm, &ords, 1, &mut got_ords).unwrap();

                let coords = vec![rank as f64, rank as f64 + 0.5];
                let mut got_coords = vec![0f64; plan.num_imports() * 2];
                plan.do_posts_and_waits(&comm, &coords, 2, &mut got_coords)
                    .unwrap();
                (got_ords, got_coords)
            })
        };
        let t0 = spawn(0);
        let t1 = spawn(1);
        let (o0, c0) = t0.join().unwrap();
        let (o1, c1) = t1.join().unwrap();
        assert_eq!(o0, vec![14]);
        assert_eq!(c0, vec![1.0, 1.5]);
        assert_eq!(o1, vec![7]);
        assert_eq!(c1, vec![0.0, 0.5]);
    }
}
