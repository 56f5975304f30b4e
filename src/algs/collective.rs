//! Collective operations built on the point-to-point [`Communicator`] trait.
//!
//! Every backend gets reductions, broadcasts and gathers for free: values are
//! funneled to rank 0, combined, and fanned back out. All ranks must call the
//! same collectives in the same order (the crate is SPMD throughout), so a
//! single shared tag is sufficient: the per-`(src, dst, tag)` FIFO keeps
//! consecutive collectives from interleaving.

use crate::algs::communicator::{Communicator, Wait};
use crate::error::{Result, TransferError};
use bytemuck::Pod;

/// Tag shared by all collective traffic.
const COLLECTIVE_TAG: u16 = 0xF000;

/// Reduction operator for [`all_reduce_f64`] / [`all_reduce_u64`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

fn recv_exact<C: Communicator>(comm: &C, peer: usize, len: usize) -> Result<Vec<u8>> {
    let handle = comm.irecv(peer, COLLECTIVE_TAG, len);
    let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
        neighbor: peer,
        message: "collective receive returned no data".into(),
    })?;
    if bytes.len() != len {
        return Err(TransferError::BufferSizeMismatch {
            neighbor: peer,
            expected: len,
            got: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Funnel every rank's `values` to rank 0, combine elementwise, fan back out.
fn reduce_bcast<C, T, F>(comm: &C, values: &mut [T], combine: F) -> Result<()>
where
    C: Communicator,
    T: Pod,
    F: Fn(&mut T, T),
{
    if comm.size() == 1 {
        return Ok(());
    }
    let nbytes = std::mem::size_of_val(values);
    if comm.rank() == 0 {
        let mut handles = Vec::with_capacity(comm.size() - 1);
        for peer in 1..comm.size() {
            handles.push((peer, comm.irecv(peer, COLLECTIVE_TAG, nbytes)));
        }
        for (peer, handle) in handles {
            let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
                neighbor: peer,
                message: "reduction receive returned no data".into(),
            })?;
            if bytes.len() != nbytes {
                return Err(TransferError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: nbytes,
                    got: bytes.len(),
                });
            }
            let incoming: &[T] = bytemuck::cast_slice(&bytes);
            for (acc, x) in values.iter_mut().zip(incoming) {
                combine(acc, *x);
            }
        }
        let mut sends = Vec::with_capacity(comm.size() - 1);
        for peer in 1..comm.size() {
            sends.push(comm.isend(peer, COLLECTIVE_TAG, bytemuck::cast_slice(values)));
        }
        for send in sends {
            let _ = send.wait();
        }
    } else {
        let send = comm.isend(0, COLLECTIVE_TAG, bytemuck::cast_slice(values));
        let bytes = recv_exact(comm, 0, nbytes)?;
        bytemuck::cast_slice_mut(values).copy_from_slice(&bytes);
        let _ = send.wait();
    }
    Ok(())
}

/// Elementwise all-reduce of an `f64` slice, in place.
pub fn all_reduce_f64<C: Communicator>(comm: &C, op: ReduceOp, values: &mut [f64]) -> Result<()> {
    match op {
        ReduceOp::Sum => reduce_bcast(comm, values, |a, b| *a += b),
        ReduceOp::Min => reduce_bcast(comm, values, |a, b| *a = a.min(b)),
        ReduceOp::Max => reduce_bcast(comm, values, |a, b| *a = a.max(b)),
    }
}

/// Elementwise all-reduce of a `u64` slice, in place.
pub fn all_reduce_u64<C: Communicator>(comm: &C, op: ReduceOp, values: &mut [u64]) -> Result<()> {
    match op {
        ReduceOp::Sum => reduce_bcast(comm, values, |a, b| *a += b),
        ReduceOp::Min => reduce_bcast(comm, values, |a: &mut u64, b| *a = (*a).min(b)),
        ReduceOp::Max => reduce_bcast(comm, values, |a: &mut u64, b| *a = (*a).max(b)),
    }
}

/// Scalar sum convenience.
pub fn sum_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64> {
    let mut buf = [value];
    all_reduce_u64(comm, ReduceOp::Sum, &mut buf)?;
    Ok(buf[0])
}

/// Scalar max convenience.
pub fn max_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64> {
    let mut buf = [value];
    all_reduce_u64(comm, ReduceOp::Max, &mut buf)?;
    Ok(buf[0])
}

/// Distributed dot product: local partial in, global sum out.
pub fn sum_f64<C: Communicator>(comm: &C, value: f64) -> Result<f64> {
    let mut buf = [value];
    all_reduce_f64(comm, ReduceOp::Sum, &mut buf)?;
    Ok(buf[0])
}

/// Broadcast `values` from `root` to every rank, in place.
pub fn broadcast<C: Communicator, T: Pod>(comm: &C, root: usize, values: &mut [T]) -> Result<()> {
    if comm.size() == 1 {
        return Ok(());
    }
    let nbytes = std::mem::size_of_val(values);
    if comm.rank() == root {
        let mut sends = Vec::with_capacity(comm.size() - 1);
        for peer in 0..comm.size() {
            if peer != root {
                sends.push(comm.isend(peer, COLLECTIVE_TAG, bytemuck::cast_slice(values)));
            }
        }
        for send in sends {
            let _ = send.wait();
        }
    } else {
        let bytes = recv_exact(comm, root, nbytes)?;
        bytemuck::cast_slice_mut(values).copy_from_slice(&bytes);
    }
    Ok(())
}

/// Every rank contributes one record; everyone receives all of them in rank
/// order.
pub fn all_gather<C: Communicator, T: Pod>(comm: &C, item: T) -> Result<Vec<T>> {
    let size = comm.size();
    let mut all = vec![item; size];
    if size == 1 {
        return Ok(all);
    }
    let item_bytes = std::mem::size_of::<T>();
    if comm.rank() == 0 {
        all[0] = item;
        let mut handles = Vec::with_capacity(size - 1);
        for peer in 1..size {
            handles.push((peer, comm.irecv(peer, COLLECTIVE_TAG, item_bytes)));
        }
        for (peer, handle) in handles {
            let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
                neighbor: peer,
                message: "gather receive returned no data".into(),
            })?;
            if bytes.len() != item_bytes {
                return Err(TransferError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: item_bytes,
                    got: bytes.len(),
                });
            }
            all[peer] = *bytemuck::from_bytes(&bytes);
        }
    } else {
        let send = comm.isend(0, COLLECTIVE_TAG, bytemuck::bytes_of(&item));
        let _ = send.wait();
    }
    broadcast(comm, 0, &mut all)?;
    Ok(all)
}

/// Pairwise exchange of per-destination counts: entry `r` of the result is
/// the count rank `r` holds for us.
pub fn all_to_all_counts<C: Communicator>(comm: &C, send_counts: &[u64]) -> Result<Vec<u64>> {
    let size = comm.size();
    debug_assert_eq!(send_counts.len(), size);
    let me = comm.rank();
    let mut recv_counts = vec![0u64; size];
    recv_counts[me] = send_counts[me];
    if size == 1 {
        return Ok(recv_counts);
    }
    let mut handles = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer != me {
            handles.push((peer, comm.irecv(peer, COLLECTIVE_TAG, 8)));
        }
    }
    let mut sends = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer != me {
            sends.push(comm.isend(peer, COLLECTIVE_TAG, &send_counts[peer].to_le_bytes()));
        }
    }
    for (peer, handle) in handles {
        let bytes = handle.wait().ok_or_else(|| TransferError::CommError {
            neighbor: peer,
            message: "count exchange returned no data".into(),
        })?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        recv_counts[peer] = u64::from_le_bytes(raw);
    }
    for send in sends {
        let _ = send.wait();
    }
    Ok(recv_counts)
}

/// Combine per-rank failure flags so that one rank's error surfaces on every
/// rank instead of deadlocking peers at the next barrier. Call at stage
/// boundaries with `ok = local_result.is_ok()`; a rank whose own stage failed
/// reports its local error, the others see [`TransferError::PeerFailure`].
pub fn check_peers<C: Communicator>(comm: &C, stage: &'static str, ok: bool) -> Result<()> {
    let flag = max_u64(comm, if ok { 0 } else { 1 })?;
    if flag != 0 && ok {
        return Err(TransferError::PeerFailure { stage });
    }
    Ok(())
}
