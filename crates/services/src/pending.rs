//! Hand-off queue between accepted tips and the downstream generator that
//! attaches them to its next entries.

use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Upper bound on ids handed out per consumption.
pub const MAX_BATCH: usize = 3;

/// Ids held when nobody consumes; matches the default tip ring.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct PendingTipQueue {
    ids: Mutex<VecDeque<Uuid>>,
    batch: usize,
    capacity: usize,
}

impl Default for PendingTipQueue {
    fn default() -> Self {
        Self::new(MAX_BATCH, DEFAULT_CAPACITY)
    }
}

impl PendingTipQueue {
    /// `batch` is clamped to `1..=MAX_BATCH`, `capacity` to at least one.
    pub fn new(batch: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: Mutex::new(VecDeque::with_capacity(capacity)),
            batch: batch.clamp(1, MAX_BATCH),
            capacity,
        }
    }

    /// Appends `id`, dropping the oldest pending id when full.
    pub async fn push(&self, id: Uuid) {
        let mut ids = self.ids.lock().await;
        if ids.len() >= self.capacity {
            if let Some(dropped) = ids.pop_front() {
                debug!(tip_id = %dropped, capacity = self.capacity, "pending queue full, oldest tip dropped");
            }
        }
        ids.push_back(id);
    }

    /// Removes and returns up to one batch from the front. Each id is
    /// handed out exactly once.
    pub async fn take_batch(&self) -> Vec<Uuid> {
        let mut ids = self.ids.lock().await;
        let n = ids.len().min(self.batch);
        ids.drain(..n).collect()
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn hands_out_at_most_three_in_order() {
        let queue = PendingTipQueue::new(10, 10);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            queue.push(*id).await;
        }

        assert_eq!(queue.take_batch().await, ids[..3].to_vec());
        assert_eq!(queue.take_batch().await, ids[3..].to_vec());
        assert!(queue.take_batch().await.is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_the_oldest() {
        let queue = PendingTipQueue::new(MAX_BATCH, 4);
        let ids: Vec<Uuid> = (0..7).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            queue.push(*id).await;
        }

        assert_eq!(queue.len().await, 4);
        assert_eq!(queue.take_batch().await, ids[3..6].to_vec());
        assert_eq!(queue.take_batch().await, ids[6..].to_vec());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn default_queue_is_bounded() {
        let queue = PendingTipQueue::default();
        for _ in 0..(DEFAULT_CAPACITY * 3) {
            queue.push(Uuid::now_v7()).await;
        }
        assert_eq!(queue.len().await, DEFAULT_CAPACITY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_see_an_id_twice() {
        let queue = Arc::new(PendingTipQueue::new(MAX_BATCH, 300));
        for _ in 0..300 {
            queue.push(Uuid::now_v7()).await;
        }

        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut taken = Vec::new();
                    loop {
                        let batch = queue.take_batch().await;
                        if batch.is_empty() {
                            break taken;
                        }
                        assert!(batch.len() <= MAX_BATCH);
                        taken.extend(batch);
                    }
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for consumer in consumers {
            for id in consumer.await.unwrap() {
                total += 1;
                assert!(all.insert(id), "id {id} dequeued twice");
            }
        }
        assert_eq!(total, 300);
        assert!(queue.is_empty().await);
    }
}
