//! The pending-stream slot: a single-writer^N / single-reader rendezvous
//! holding at most one stream-originated request.
//!
//! The original design is a busy-wait plus mutex plus atomic "pending"
//! boolean; the underlying requirement is "single-item bounded handoff
//! from many producers to one consumer", which a capacity-1 bounded
//! channel implements directly: producers `try_send` and retry on
//! `Full`, the consumer `try_recv`s without ever blocking. See the
//! "Rendezvous slot" design note.

use std::net::SocketAddr;

use registry::HandleId;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

/// A request that arrived over a stream connection, handed from a reader
/// task to the reactor.
pub struct PendingStreamRequest {
    pub peer_addr: SocketAddr,
    pub handle: HandleId,
    /// Raw bytes as read off the connection; may be short or long if the
    /// peer misbehaved, left to the dispatcher's size check.
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct SlotSender(Sender<PendingStreamRequest>);

pub struct SlotReceiver(Receiver<PendingStreamRequest>);

/// Build a fresh capacity-1 handoff.
pub fn channel() -> (SlotSender, SlotReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (SlotSender(tx), SlotReceiver(rx))
}

impl SlotSender {
    /// Deposit a request, retrying while the slot is full. A reader that
    /// loses the race does not drop its request; it waits for the next
    /// drain.
    pub async fn deposit(&self, request: PendingStreamRequest) {
        let mut request = request;

        loop {
            match self.0.try_send(request) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    request = returned;
                    tokio::task::yield_now().await;
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }
}

impl SlotReceiver {
    /// Drain the slot if it holds a request, without blocking.
    pub fn drain(&mut self) -> Option<PendingStreamRequest> {
        self.0.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deposit_then_drain() {
        let (tx, mut rx) = channel();
        assert!(rx.drain().is_none());

        tx.deposit(PendingStreamRequest {
            peer_addr: "127.0.0.1:1".parse().unwrap(),
            handle: 0,
            bytes: vec![1, 2, 3],
        })
        .await;

        let request = rx.drain().unwrap();
        assert_eq!(request.bytes, vec![1, 2, 3]);
        assert!(rx.drain().is_none());
    }

    #[tokio::test]
    async fn a_second_depositor_waits_for_drain() {
        let (tx, mut rx) = channel();

        tx.deposit(PendingStreamRequest {
            peer_addr: "127.0.0.1:1".parse().unwrap(),
            handle: 0,
            bytes: vec![1],
        })
        .await;

        let tx2 = tx.clone();
        let waiter = tokio::spawn(async move {
            tx2.deposit(PendingStreamRequest {
                peer_addr: "127.0.0.1:2".parse().unwrap(),
                handle: 1,
                bytes: vec![2],
            })
            .await;
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let first = rx.drain().unwrap();
        assert_eq!(first.bytes, vec![1]);

        waiter.await.unwrap();
        let second = rx.drain().unwrap();
        assert_eq!(second.bytes, vec![2]);
    }
}
