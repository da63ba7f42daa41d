//! Blocking priority queue for request dispatch.
//!
//! Ordering lives in a lock-free skiplist keyed by `(priority rank,
//! sequence)`; blocking lives in an unbounded ticket channel with exactly
//! one ticket per queued request. `take` waits on the ticket channel and
//! a shutdown channel at once, so a blocked worker wakes immediately when
//! its queue generation is torn down.

use crossbeam_channel::{unbounded, Receiver, Sender};
use crossbeam_skiplist::SkipMap;

use crate::request::erased::SharedRequest;
use crate::request::Priority;

/// Skiplist key ordering requests by priority (descending) then arrival
/// sequence (ascending). Lower keys pop first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueToken {
    rank: u8,
    sequence: u64,
}

impl QueueToken {
    fn new(priority: Priority, sequence: u64) -> Self {
        let rank = match priority {
            Priority::Immediate => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        };
        Self { rank, sequence }
    }
}

/// Thread-safe blocking priority queue of erased requests.
pub(crate) struct DispatchQueue {
    entries: SkipMap<QueueToken, SharedRequest>,
    ticket_tx: Sender<()>,
    ticket_rx: Receiver<()>,
}

impl DispatchQueue {
    pub(crate) fn new() -> Self {
        let (ticket_tx, ticket_rx) = unbounded();
        Self { entries: SkipMap::new(), ticket_tx, ticket_rx }
    }

    /// Enqueue a request. Never blocks.
    pub(crate) fn put(&self, request: SharedRequest) {
        let token = QueueToken::new(request.priority(), request.sequence());
        self.entries.insert(token, request);
        let _ = self.ticket_tx.send(());
    }

    /// Dequeue the highest-priority request, blocking until one arrives.
    /// Returns `None` when the shutdown channel fires or closes.
    pub(crate) fn take(&self, shutdown: &Receiver<()>) -> Option<SharedRequest> {
        loop {
            crossbeam_channel::select! {
                recv(self.ticket_rx) -> ticket => {
                    if ticket.is_err() {
                        return None;
                    }
                    // One ticket per insert, so the skiplist cannot be
                    // empty here; loop anyway rather than assume.
                    if let Some(entry) = self.entries.pop_front() {
                        return Some(entry.value().clone());
                    }
                }
                recv(shutdown) -> _ => return None,
            }
        }
    }

    /// Number of queued requests.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::bounded;

    use super::*;
    use crate::request::erased::DispatchRequest;
    use crate::request::Request;

    fn request(priority: Priority, sequence: u64) -> SharedRequest {
        let request = Request::get("http://example.com", |r| {
            String::from_utf8(r.data.to_vec())
                .map_err(|e| crate::error::RequestError::parse(e.to_string()))
        })
        .priority(priority)
        .build();
        request.assign_sequence(sequence);
        Arc::new(request)
    }

    #[test]
    fn higher_priority_pops_before_earlier_sequence() {
        let queue = DispatchQueue::new();
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        queue.put(request(Priority::Normal, 1));
        queue.put(request(Priority::High, 2));

        let first = queue.take(&shutdown_rx).unwrap();
        assert_eq!(first.sequence(), 2);
        let second = queue.take(&shutdown_rx).unwrap();
        assert_eq!(second.sequence(), 1);
    }

    #[test]
    fn equal_priority_is_fifo_by_sequence() {
        let queue = DispatchQueue::new();
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        for sequence in [3, 1, 2] {
            queue.put(request(Priority::Normal, sequence));
        }
        let order: Vec<u64> = (0..3)
            .map(|_| queue.take(&shutdown_rx).unwrap().sequence())
            .collect();
        assert_eq!(order, [1, 2, 3]);
    }

    #[test]
    fn immediate_jumps_a_full_queue() {
        let queue = DispatchQueue::new();
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        for sequence in 1..=10 {
            queue.put(request(Priority::Normal, sequence));
        }
        queue.put(request(Priority::Immediate, 11));
        assert_eq!(queue.take(&shutdown_rx).unwrap().sequence(), 11);
    }

    #[test]
    fn closed_shutdown_channel_unblocks_take() {
        let queue = Arc::new(DispatchQueue::new());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let waiter = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.take(&shutdown_rx))
        };
        drop(shutdown_tx);
        assert!(waiter.join().unwrap().is_none());
    }
}
