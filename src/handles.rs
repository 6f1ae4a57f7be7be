//! An arena of stream write-halves, indexed by an opaque integer id.
//!
//! Registration entries need to outlive several reactor ticks while only
//! storing a `HandleId` (see `rendezvous_registry::HandleId`), so the
//! actual `tokio::net::TcpStream` write half lives here instead of
//! entangled in the registration table's lifetime. This is the "arena of
//! handles indexed by integer id" design note.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex as AsyncMutex;

use registry::HandleId;

#[derive(Clone, Default)]
pub struct StreamHandles {
    next_id: Arc<AtomicU64>,
    handles: Arc<Mutex<HashMap<HandleId, Arc<AsyncMutex<OwnedWriteHalf>>>>>,
}

impl StreamHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-accepted connection's write half, returning the id
    /// the registration table will carry around for it.
    pub fn insert(&self, write_half: OwnedWriteHalf) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(id, Arc::new(AsyncMutex::new(write_half)));
        id
    }

    /// Best-effort send: writes `bytes` to the handle if it still exists.
    /// A closed or missing handle is silently ignored, matching the
    /// `MSG_NOSIGNAL` "don't die on a broken pipe" send semantics.
    pub async fn send(&self, id: HandleId, bytes: &[u8]) -> bool {
        let handle = self.handles.lock().get(&id).cloned();

        match handle {
            Some(handle) => handle.lock().await.write_all(bytes).await.is_ok(),
            None => false,
        }
    }

    /// Close and drop the handle. Called when an entry carrying this
    /// handle is evicted by cap, overwritten by refresh, or consumed by a
    /// successful ASK.
    pub fn close(&self, id: HandleId) {
        self.handles.lock().remove(&id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }
}
