//! Task queue boundary between job creation and the worker pool.
//!
//! The contract assumes at-least-once delivery: the orchestration side
//! must tolerate seeing the same job id twice, which it does by treating
//! a failed `start` transition as "already claimed".

use async_trait::async_trait;
use narravox_foundation::JobId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, job_id: JobId);

    /// Next job id, waiting until one is available.
    async fn dequeue(&self) -> JobId;
}

/// FIFO in-memory queue for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryTaskQueue {
    items: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, job_id: JobId) {
        self.items.lock().push_back(job_id);
        self.notify.notify_one();
    }

    async fn dequeue(&self) -> JobId {
        loop {
            let popped = {
                let mut items = self.items.lock();
                let popped = items.pop_front();
                // A stored notification may have been consumed on behalf
                // of an item another worker already took; pass the wakeup
                // along while work remains.
                if popped.is_some() && !items.is_empty() {
                    self.notify.notify_one();
                }
                popped
            };
            match popped {
                Some(id) => return id,
                None => self.notify.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let queue = MemoryTaskQueue::new();
        let a = JobId::from("a");
        let b = JobId::from("b");
        queue.enqueue(a.clone()).await;
        queue.enqueue(b.clone()).await;
        assert_eq!(queue.dequeue().await, a);
        assert_eq!(queue.dequeue().await, b);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_possible() {
        let queue = MemoryTaskQueue::new();
        let id = JobId::from("dup");
        queue.enqueue(id.clone()).await;
        queue.enqueue(id.clone()).await;
        assert_eq!(queue.dequeue().await, id);
        assert_eq!(queue.dequeue().await, id);
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_enqueue() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(JobId::from("late")).await;
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer wakes")
            .expect("task succeeds");
        assert_eq!(got, JobId::from("late"));
    }

    #[tokio::test]
    async fn two_consumers_drain_two_items() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let c1 = {
            let q = Arc::clone(&queue);
            tokio::spawn(async move { q.dequeue().await })
        };
        let c2 = {
            let q = Arc::clone(&queue);
            tokio::spawn(async move { q.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(JobId::from("x")).await;
        queue.enqueue(JobId::from("y")).await;

        let mut got = vec![
            tokio::time::timeout(Duration::from_secs(1), c1)
                .await
                .expect("c1 wakes")
                .expect("c1 ok"),
            tokio::time::timeout(Duration::from_secs(1), c2)
                .await
                .expect("c2 wakes")
                .expect("c2 ok"),
        ];
        got.sort();
        assert_eq!(got, vec![JobId::from("x"), JobId::from("y")]);
    }
}
