//! Message-passing abstraction over which the transfer pipeline runs.
//!
//! The crate is written SPMD-style against a minimal non-blocking
//! [`Communicator`] trait. Three backends are provided:
//!
//! - [`NoComm`] for single-process runs (rank 0 of 1; no messages ever move),
//! - [`RayonComm`] for multi-rank runs inside one process, one thread per
//!   rank, used by the test suite,
//! - `MpiComm` for real distributed runs (cargo feature `mpi-support`).
//!
//! Wire conventions for the layers above: payloads are `bytemuck`-cast slices
//! of `#[repr(C)]` Pod records or plain `u64`/`f64` arrays, little-endian
//! fixed width. Messages between the same `(src, dst, tag)` triple are
//! delivered in send order; nothing is guaranteed across triples.

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Tag reserved by [`Communicator::barrier`] implementations; user protocols
/// must stay below it.
pub const BARRIER_TAG: u16 = 0xFFF0;

/// Anything that can be waited on for completion.
pub trait Wait {
    /// Block until the operation completes; for receives, yield the bytes.
    fn wait(self) -> Option<Vec<u8>>;
}

/// Minimal non-blocking communication interface.
///
/// `isend`/`irecv` are matched by `(peer, tag)`; a receive states the exact
/// byte length it expects. Self-sends are legal on backends with a mailbox
/// (`RayonComm`, MPI) but the distributor short-circuits them locally, so
/// `NoComm` never sees one.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Rank of this process in `0..size`.
    fn rank(&self) -> usize;
    /// Number of ranks.
    fn size(&self) -> usize;

    /// Synchronize all ranks. Collective; every rank must call it.
    fn barrier(&self);
}

/// Serial stand-in: one rank, no messages.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
}

// --- RayonComm: ranks as threads inside one process -----------------------

type MailKey = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct MailSlot {
    queue: VecDeque<Vec<u8>>,
}

struct MailHub {
    slots: Mutex<HashMap<MailKey, Arc<(Mutex<MailSlot>, Condvar)>>>,
}

static MAIL: Lazy<MailHub> = Lazy::new(|| MailHub {
    slots: Mutex::new(HashMap::new()),
});

fn mail_slot(key: MailKey) -> Arc<(Mutex<MailSlot>, Condvar)> {
    let mut guard = MAIL.slots.lock().expect("mail hub poisoned");
    guard
        .entry(key)
        .or_insert_with(|| Arc::new((Mutex::new(MailSlot::default()), Condvar::new())))
        .clone()
}

/// Send completes at post time (the message is copied into the mailbox).
pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct ThreadRecvHandle {
    slot: Arc<(Mutex<MailSlot>, Condvar)>,
    expect: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.slot;
        let mut slot = lock.lock().expect("mail slot poisoned");
        while slot.queue.is_empty() {
            slot = cv.wait(slot).expect("mail condvar poisoned");
        }
        let mut msg = slot.queue.pop_front().expect("queue non-empty");
        msg.truncate(self.expect.min(msg.len()));
        Some(msg)
    }
}

/// Intra-process communicator: each "rank" is a thread, messages go through
/// a global mailbox keyed by `(src, dst, tag)`. FIFO per key.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for size {size}");
        Self { rank, size }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> ThreadSendHandle {
        let entry = mail_slot((self.rank, peer, tag));
        let (lock, cv) = &*entry;
        lock.lock()
            .expect("mail slot poisoned")
            .queue
            .push_back(buf.to_vec());
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> ThreadRecvHandle {
        ThreadRecvHandle {
            slot: mail_slot((peer, self.rank, tag)),
            expect: len,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    /// Token barrier over the mailbox: everyone reports to rank 0, rank 0
    /// releases everyone. Works wherever the mailbox works, including in
    /// integration tests.
    fn barrier(&self) {
        if self.size == 1 {
            return;
        }
        if self.rank == 0 {
            for peer in 1..self.size {
                let h = self.irecv(peer, BARRIER_TAG, 1);
                let _ = h.wait();
            }
            for peer in 1..self.size {
                let _ = self.isend(peer, BARRIER_TAG, &[1u8]);
            }
        } else {
            let _ = self.isend(0, BARRIER_TAG, &[1u8]);
            let h = self.irecv(0, BARRIER_TAG, 1);
            let _ = h.wait();
        }
    }
}

// --- MPI backend ----------------------------------------------------------

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::Wait;
    use mpi::collective::CommunicatorCollectives;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    /// World communicator owned for the lifetime of the process.
    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn world() -> Self {
            let universe = mpi::initialize().expect("MPI already initialized");
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world,
                rank,
                size,
            }
        }
    }

    pub struct MpiSendHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<std::ptr::NonNull<[u8]>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
                #[cfg(debug_assertions)]
                eprintln!("[MpiSendHandle::drop] send not explicitly waited");
            }
            if let Some(ptr) = self.buf.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        }
    }

    pub struct MpiRecvHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<std::ptr::NonNull<[u8]>>,
        expect: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            let ptr = self.buf.take()?;
            let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut v = Vec::from(boxed);
            v.truncate(self.expect);
            Some(v)
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
                #[cfg(debug_assertions)]
                eprintln!("[MpiRecvHandle::drop] recv not explicitly waited");
            }
            if let Some(ptr) = self.buf.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        }
    }

    impl super::Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            use mpi::request::StaticScope;
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            let slice: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(unsafe { std::ptr::NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecvHandle {
            use mpi::request::StaticScope;
            let raw: *mut [u8] = Box::into_raw(vec![0u8; len].into_boxed_slice());
            let slice: &'static mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice, tag as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: Some(unsafe { std::ptr::NonNull::new_unchecked(raw) }),
                expect: len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
