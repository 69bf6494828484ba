//! Fixed-capacity FIFO with a sticky end-of-stream marker.
//!
//! The queues between pipeline stages bound memory and provide
//! backpressure: a full queue suspends the producer, an empty one the
//! consumer. Producers mark the end of the stream instead of sending a
//! sentinel; consumers observe it as `None` once the queue drains. The
//! `force_*` operations move whole batches without blocking (capacity is
//! advisory on that path) to amortise synchronisation on the
//! parser-to-persister edge.

use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// The queue was marked ended; the rejected value is returned.
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue ended")
    }
}

/// The queue was marked ended before a forced batch move.
#[derive(Debug, thiserror::Error)]
#[error("queue ended")]
pub struct Closed;

/// Operation and wait counters for one queue edge.
///
/// A wait is counted once per operation that had to suspend at least
/// once; the ratios approximate how often each side of the edge was the
/// bottleneck.
#[derive(Debug, Default)]
pub struct QueueStats {
    enqueue_ops: AtomicU64,
    enqueue_waits: AtomicU64,
    dequeue_ops: AtomicU64,
    dequeue_waits: AtomicU64,
}

impl QueueStats {
    /// Fraction of enqueues that had to wait for space.
    #[must_use]
    pub fn enqueue_wait_ratio(&self) -> f64 {
        ratio(
            self.enqueue_waits.load(Ordering::Relaxed),
            self.enqueue_ops.load(Ordering::Relaxed),
        )
    }

    /// Fraction of dequeues that had to wait for an item.
    #[must_use]
    pub fn dequeue_wait_ratio(&self) -> f64 {
        ratio(
            self.dequeue_waits.load(Ordering::Relaxed),
            self.dequeue_ops.load(Ordering::Relaxed),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

struct State<T> {
    buf: VecDeque<T>,
    ended: bool,
}

/// A bounded multi-producer multi-consumer FIFO for cooperative tasks.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Signalled when a slot frees up.
    space: Notify,
    /// Signalled when an item arrives.
    items: Notify,
    stats: QueueStats,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items on the blocking
    /// path.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State { buf: VecDeque::with_capacity(capacity), ended: false }),
            space: Notify::new(),
            items: Notify::new(),
            stats: QueueStats::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues one value, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the value back once the queue has been marked ended.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.stats.enqueue_ops.fetch_add(1, Ordering::Relaxed);
        let mut waited = false;

        loop {
            // Register interest before checking so a wake between the
            // check and the await is never lost.
            let mut notified = pin!(self.space.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.ended {
                    return Err(SendError(value));
                }
                if state.buf.len() < self.capacity {
                    state.buf.push_back(value);
                    drop(state);
                    self.items.notify_one();
                    return Ok(());
                }
            }

            if !waited {
                waited = true;
                self.stats.enqueue_waits.fetch_add(1, Ordering::Relaxed);
            }
            notified.await;
        }
    }

    /// Dequeues one value, suspending while the queue is empty; `None`
    /// once the queue is empty and ended.
    pub async fn recv(&self) -> Option<T> {
        self.stats.dequeue_ops.fetch_add(1, Ordering::Relaxed);
        let mut waited = false;

        loop {
            let mut notified = pin!(self.items.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(v) = state.buf.pop_front() {
                    drop(state);
                    self.space.notify_one();
                    return Some(v);
                }
                if state.ended {
                    return None;
                }
            }

            if !waited {
                waited = true;
                self.stats.dequeue_waits.fetch_add(1, Ordering::Relaxed);
            }
            notified.await;
        }
    }

    /// Moves an entire batch in without blocking; capacity is advisory
    /// here. The batch is drained on success and left untouched on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`Closed`] once the queue has been marked ended.
    pub fn force_send_all(&self, batch: &mut Vec<T>) -> Result<(), Closed> {
        if batch.is_empty() {
            return Ok(());
        }
        self.stats
            .enqueue_ops
            .fetch_add(batch.len() as u64, Ordering::Relaxed);

        let pushed = batch.len();
        {
            let mut state = self.state();
            if state.ended {
                return Err(Closed);
            }
            state.buf.extend(batch.drain(..));
        }
        for _ in 0..pushed {
            self.items.notify_one();
        }
        Ok(())
    }

    /// Drains everything currently queued into `buf` without blocking.
    pub fn force_recv_all(&self, buf: &mut Vec<T>) {
        let drained = {
            let mut state = self.state();
            let n = state.buf.len();
            buf.extend(state.buf.drain(..));
            n
        };
        self.stats
            .dequeue_ops
            .fetch_add(drained as u64, Ordering::Relaxed);
        for _ in 0..drained {
            self.space.notify_one();
        }
    }

    /// Marks the stream ended. Idempotent; wakes every waiter. Pending
    /// items remain dequeueable.
    pub fn mark_end(&self) {
        {
            let mut state = self.state();
            state.ended = true;
        }
        self.items.notify_waiters();
        self.space.notify_waiters();
    }

    /// Wait counters for this queue edge.
    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fifo_order() {
        let q = BoundedQueue::new(4);
        q.send(1).await.unwrap();
        q.send(2).await.unwrap();
        q.send(3).await.unwrap();
        assert_eq!(q.recv().await, Some(1));
        assert_eq!(q.recv().await, Some(2));
        assert_eq!(q.recv().await, Some(3));
    }

    #[tokio::test]
    async fn end_drains_then_closes() {
        let q = BoundedQueue::new(4);
        q.send(7).await.unwrap();
        q.mark_end();
        assert_eq!(q.recv().await, Some(7));
        assert_eq!(q.recv().await, None);
        assert_eq!(q.recv().await, None); // sticky
    }

    #[tokio::test]
    async fn send_after_end_returns_value() {
        let q = BoundedQueue::new(4);
        q.mark_end();
        let err = q.send(42).await.unwrap_err();
        assert_eq!(err.0, 42);
    }

    #[tokio::test]
    async fn blocked_receiver_wakes_on_end() {
        let q = Arc::new(BoundedQueue::<u32>::new(4));
        let q2 = q.clone();
        let recv = tokio::spawn(async move { q2.recv().await });

        tokio::task::yield_now().await;
        q.mark_end();

        let got = timeout(Duration::from_secs(5), recv).await.unwrap().unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let q = Arc::new(BoundedQueue::new(1));
        q.send(1).await.unwrap();

        // The second send must suspend until the slot frees.
        let q2 = q.clone();
        let pending = tokio::spawn(async move { q2.send(2).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(q.recv().await, Some(1));
        timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(q.recv().await, Some(2));
        assert!(q.stats().enqueue_wait_ratio() > 0.0);
    }

    #[tokio::test]
    async fn blocked_sender_wakes_on_end() {
        let q = Arc::new(BoundedQueue::new(1));
        q.send(1).await.unwrap();

        let q2 = q.clone();
        let pending = tokio::spawn(async move { q2.send(2).await });
        tokio::task::yield_now().await;

        q.mark_end();
        let err = timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[tokio::test]
    async fn force_ops_ignore_capacity() {
        let q: BoundedQueue<u32> = BoundedQueue::new(2);
        let mut batch = vec![1, 2, 3, 4, 5];
        q.force_send_all(&mut batch).unwrap();
        assert!(batch.is_empty());

        let mut out = Vec::new();
        q.force_recv_all(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn force_send_fails_after_end() {
        let q: BoundedQueue<u32> = BoundedQueue::new(2);
        q.mark_end();
        let mut batch = vec![1, 2];
        assert!(q.force_send_all(&mut batch).is_err());
        assert_eq!(batch, vec![1, 2]); // untouched
    }
}
