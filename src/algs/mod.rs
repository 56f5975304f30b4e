//! Communication algorithms: the communicator abstraction, collectives,
//! inverse-communication plans, and rank indexing.

pub mod collective;
pub mod comm_indexer;
pub mod communicator;
pub mod distributor;
pub mod wire;

/// Unit tests that drive [`communicator::RayonComm`] ranks on threads share a
/// global mailbox; take this lock so concurrent tests cannot interleave
/// messages on the shared collective tags.
#[cfg(test)]
pub(crate) mod test_guard {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};

    static LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    pub fn acquire() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
