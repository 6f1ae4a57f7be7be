//! Shared read view of per-IP live registration counts.
//!
//! The registration table itself is owned exclusively by the reactor task
//! (see `reactor.rs`) so that dispatching never needs to lock it. The
//! introspection API still needs to answer "how many live entries does
//! this IP have" from a different task, so the reactor publishes counts
//! here after each request that touches an IP — the same
//! lock-a-small-side-table-instead-of-the-hot-path shape as the teacher's
//! `Statistics` map.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::RwLock;

#[derive(Clone, Default)]
pub struct LiveCounts(Arc<RwLock<HashMap<Ipv4Addr, usize>>>);

impl LiveCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current live count for `ip`. A zero count removes the
    /// entry instead of leaving a stale zero behind.
    pub fn set(&self, ip: Ipv4Addr, count: usize) {
        let mut counts = self.0.write();
        if count == 0 {
            counts.remove(&ip);
        } else {
            counts.insert(ip, count);
        }
    }

    pub fn get(&self, ip: Ipv4Addr) -> usize {
        self.0.read().get(&ip).copied().unwrap_or(0)
    }
}
