//! Per-order ticket chain.
//!
//! Each lifecycle call on an order takes a ticket for `(kind, id)` and waits
//! for the previous ticket on the same key to be dropped, so calls on one
//! order run in the order they were dispatched while different orders stay
//! fully concurrent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::models::OrderKind;

type Key = (OrderKind, u64);

#[derive(Default)]
struct Tails {
    next_seq: u64,
    /// Latest ticket per key and the receiver that resolves when it drops.
    tails: HashMap<Key, (u64, oneshot::Receiver<()>)>,
}

#[derive(Clone, Default)]
pub struct OrderSequencer {
    inner: Arc<Mutex<Tails>>,
}

/// A place in the queue that has not reached the front yet.
pub struct Pending {
    ticket: Ticket,
    previous: Option<oneshot::Receiver<()>>,
}

impl Pending {
    pub async fn ready(self) -> Ticket {
        if let Some(rx) = self.previous {
            // resolves with Err once the previous ticket is dropped
            let _ = rx.await;
        }
        self.ticket
    }
}

/// Held for the duration of one lifecycle call.
pub struct Ticket {
    key: Key,
    seq: u64,
    _done: oneshot::Sender<()>,
    inner: Arc<Mutex<Tails>>,
}

impl OrderSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the queue for `(kind, id)` now; the returned [`Pending`] resolves
    /// once every ticket enqueued earlier on that key has been released.
    pub fn enqueue(&self, kind: OrderKind, id: u64) -> Pending {
        let key = (kind, id);
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let previous = state.tails.insert(key, (seq, rx)).map(|(_, rx)| rx);
        Pending {
            ticket: Ticket {
                key,
                seq,
                _done: tx,
                inner: self.inner.clone(),
            },
            previous,
        }
    }

    pub async fn acquire(&self, kind: OrderKind, id: u64) -> Ticket {
        self.enqueue(kind, id).ready().await
    }

    /// Keys with a ticket outstanding.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().tails.len()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if state.tails.get(&self.key).is_some_and(|(seq, _)| *seq == self.seq) {
            state.tails.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn same_key_runs_in_dispatch_order() {
        let sequencer = OrderSequencer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = sequencer.acquire(OrderKind::Limit, 1).await;
        let second = {
            let sequencer = sequencer.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _ticket = sequencer.acquire(OrderKind::Limit, 1).await;
                log.lock().push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        log.lock().push("first");
        drop(first);

        second.await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(sequencer.in_flight(), 0);
    }

    #[tokio::test]
    async fn enqueue_order_wins_over_poll_order() {
        let sequencer = OrderSequencer::new();
        let first = sequencer.enqueue(OrderKind::Range, 4);
        let second = sequencer.enqueue(OrderKind::Range, 4);
        let log = Arc::new(Mutex::new(Vec::new()));

        let late = {
            let log = log.clone();
            tokio::spawn(async move {
                let _ticket = second.ready().await;
                log.lock().push(2);
            })
        };
        tokio::task::yield_now().await;
        assert!(log.lock().is_empty());

        let ticket = first.ready().await;
        log.lock().push(1);
        drop(ticket);
        late.await.unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn different_keys_do_not_wait() {
        let sequencer = OrderSequencer::new();
        let _limit = sequencer.acquire(OrderKind::Limit, 1).await;
        let _range = sequencer.acquire(OrderKind::Range, 1).await;
        let _other = sequencer.acquire(OrderKind::Limit, 2).await;
        assert_eq!(sequencer.in_flight(), 3);
    }
}
