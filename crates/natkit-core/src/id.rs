//! Resource ids. Monotonically increasing within a gateway's lifetime,
//! never reused even after the entry they named is closed.

use std::sync::atomic::{AtomicU64, Ordering};

/// A handle to a network socket or a child process, scoped to the gateway
/// that issued it. Ids from two different gateways are not comparable.
pub type ResourceId = u64;

/// Hands out strictly increasing [`ResourceId`]s. Each gateway owns exactly
/// one allocator and never shares it — the allocator itself is `Sync` only
/// so it can be read by tests, not because gateways hand it to other
/// threads.
#[derive(Debug, Default)]
pub struct ResourceIdAllocator {
    next: AtomicU64,
}

impl ResourceIdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Allocate the next id. Never returns the same value twice for the
    /// lifetime of this allocator.
    pub fn allocate(&self) -> ResourceId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let allocator = ResourceIdAllocator::new();
        let ids: Vec<_> = (0..10).map(|_| allocator.allocate()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
