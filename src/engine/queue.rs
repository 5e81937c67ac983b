//! Bounded FIFO task queue shared by producers and workers.
//!
//! A full queue makes `enqueue` wait; nothing is ever dropped to make room.
//! Closing the queue fails pending and future `enqueue` calls with
//! [`Error::QueueClosed`].

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::Task;

pub struct TaskQueue<P> {
    tx: mpsc::Sender<Task<P>>,
    rx: Mutex<mpsc::Receiver<Task<P>>>,
    closed: CancellationToken,
    capacity: usize,
}

impl<P: Send> TaskQueue<P> {
    /// Create a queue holding at most `capacity` pending tasks.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".to_string()));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
            capacity,
        })
    }

    /// Push a task, waiting while the queue is full.
    pub async fn enqueue(&self, task: Task<P>) -> Result<()> {
        self.reserve().await?.send(task);
        Ok(())
    }

    /// Wait for a free slot and hold it.
    ///
    /// Nothing is visible to workers until the permit is used, so callers can
    /// announce a task before any worker can pick it up. Dropping the permit
    /// gives the slot back.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, Task<P>>> {
        if self.closed.is_cancelled() {
            return Err(Error::QueueClosed);
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(Error::QueueClosed),
            permit = self.tx.reserve() => permit.map_err(|_| Error::QueueClosed),
        }
    }

    /// Pop the oldest task, waiting while the queue is empty.
    ///
    /// Returns `None` once `cancel` fires.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<Task<P>> {
        // Only one consumer waits on the receiver at a time; the rest wait
        // on the lock, which is equivalent for FIFO hand-off.
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            task = rx.recv() => {
                if let Some(ref t) = task {
                    trace!(task_id = %t.id, key = %t.key, "dequeued");
                }
                task
            }
        }
    }

    /// Number of tasks waiting to be picked up.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reject all further enqueues, including ones currently waiting.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Remove and return everything still buffered.
    pub async fn drain(&self) -> Vec<Task<P>> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(task) = rx.try_recv() {
            drained.push(task);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let queue = TaskQueue::new(4).unwrap();
        for n in 0..3 {
            queue.enqueue(Task::new("k", n)).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        let cancel = CancellationToken::new();
        for n in 0..3 {
            assert_eq!(queue.dequeue(&cancel).await.unwrap().payload, n);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        assert!(matches!(TaskQueue::<()>::new(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn full_queue_blocks_until_dequeue() {
        let queue = std::sync::Arc::new(TaskQueue::new(1).unwrap());
        queue.enqueue(Task::new("k", 1)).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            queue.enqueue(Task::new("k", 2)),
        )
        .await;
        assert!(blocked.is_err(), "enqueue should wait on a full queue");

        let producer = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(Task::new("k", 3)).await })
        };

        let cancel = CancellationToken::new();
        assert_eq!(queue.dequeue(&cancel).await.unwrap().payload, 1);
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue(&cancel).await.unwrap().payload, 3);
    }

    #[tokio::test]
    async fn close_fails_waiting_and_future_producers() {
        let queue = std::sync::Arc::new(TaskQueue::new(1).unwrap());
        queue.enqueue(Task::new("k", 1)).await.unwrap();

        let waiting = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(Task::new("k", 2)).await })
        };
        tokio::task::yield_now().await;

        queue.close();
        assert!(matches!(waiting.await.unwrap(), Err(Error::QueueClosed)));
        assert!(matches!(
            queue.enqueue(Task::new("k", 3)).await,
            Err(Error::QueueClosed)
        ));

        let leftover = queue.drain().await;
        assert_eq!(leftover.len(), 1);
    }

    #[tokio::test]
    async fn reserved_slot_is_hidden_until_sent() {
        let queue = TaskQueue::new(1).unwrap();
        let permit = queue.reserve().await.unwrap();

        let cancel = CancellationToken::new();
        let early = tokio::time::timeout(Duration::from_millis(50), queue.dequeue(&cancel)).await;
        assert!(early.is_err(), "nothing should be dequeued before send");

        permit.send(Task::new("k", 7));
        assert_eq!(queue.dequeue(&cancel).await.unwrap().payload, 7);

        // A dropped permit frees its slot.
        drop(queue.reserve().await.unwrap());
        queue.enqueue(Task::new("k", 8)).await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn reserve_fails_after_close() {
        let queue = TaskQueue::<u32>::new(1).unwrap();
        queue.close();
        assert!(matches!(queue.reserve().await, Err(Error::QueueClosed)));
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_cancel() {
        let queue = TaskQueue::<u32>::new(1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(queue.dequeue(&cancel).await.is_none());
    }
}
