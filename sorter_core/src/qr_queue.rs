//! The QR queue: pending recognitions, FIFO per lane and globally ordered
//! for the age-based head timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::state_store::StateStore;
use crate::types::QrQueueItem;

/// Ordered queue of pending recognitions. Every mutation re-projects the
/// lane indices of all queued items into the state store while still
/// holding this queue's own lock — the one sanctioned nested-lock order.
pub struct QrQueue {
    items: Mutex<std::collections::VecDeque<QrQueueItem>>,
    state: Arc<StateStore>,
}

impl QrQueue {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self {
            items: Mutex::new(std::collections::VecDeque::new()),
            state,
        }
    }

    fn project_indices_locked(&self, items: &std::collections::VecDeque<QrQueueItem>) {
        let indices = items.iter().map(|i| i.lane_index).collect();
        self.state.set_queue_indices(indices);
    }

    /// Append a newly recognized item.
    pub fn push_back(&self, item: QrQueueItem) {
        let mut items = self.items.lock();
        items.push_back(item);
        self.project_indices_locked(&items);
    }

    /// Return an item to the head — used on a false trigger. The item's
    /// original timestamp must be preserved by the caller so the
    /// head-timeout can still eventually drain it.
    pub fn push_front(&self, item: QrQueueItem) {
        let mut items = self.items.lock();
        items.push_front(item);
        self.project_indices_locked(&items);
    }

    /// Remove and return the first queued item targeting `lane_index`.
    pub fn pop_by_lane(&self, lane_index: usize) -> Option<QrQueueItem> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|i| i.lane_index == lane_index)?;
        let item = items.remove(pos);
        self.project_indices_locked(&items);
        item
    }

    /// If the head's age exceeds `max_age`, pop and return it.
    pub fn timeout_head(&self, max_age: Duration) -> Option<QrQueueItem> {
        let mut items = self.items.lock();
        let expired = items.front().is_some_and(|head| head.timestamp.elapsed() > max_age);
        if !expired {
            return None;
        }
        let item = items.pop_front();
        self.project_indices_locked(&items);
        item
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Empty the queue, e.g. as part of `clear_all_queues`.
    pub fn clear(&self) {
        let mut items = self.items.lock();
        items.clear();
        self.project_indices_locked(&items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::TimingConfig;

    fn item(lane_index: usize, key: &str) -> QrQueueItem {
        QrQueueItem {
            lane_index,
            qr_key: key.to_string(),
            lane_id: key.to_string(),
            timestamp: Instant::now(),
            data_raw: key.to_string(),
            source: "test".to_string(),
        }
    }

    fn store() -> Arc<StateStore> {
        Arc::new(StateStore::new(TimingConfig::default(), &[]))
    }

    #[test]
    fn pop_by_lane_returns_first_matching_item() {
        let q = QrQueue::new(store());
        q.push_back(item(0, "A"));
        q.push_back(item(1, "B"));
        q.push_back(item(0, "A2"));
        let popped = q.pop_by_lane(0).unwrap();
        assert_eq!(popped.qr_key, "A");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pop_by_lane_with_no_match_returns_none() {
        let q = QrQueue::new(store());
        q.push_back(item(1, "B"));
        assert!(q.pop_by_lane(0).is_none());
    }

    #[test]
    fn timeout_head_pops_only_when_aged_past_max() {
        let q = QrQueue::new(store());
        q.push_back(item(0, "A"));
        assert!(q.timeout_head(Duration::from_secs(10)).is_none());
        assert!(q.timeout_head(Duration::from_nanos(0)).is_some());
    }

    #[test]
    fn return_to_front_preserves_timestamp_and_ordering() {
        let q = QrQueue::new(store());
        let original = item(0, "A");
        let original_ts = original.timestamp;
        q.push_back(original);
        q.push_back(item(1, "B"));

        let popped = q.pop_by_lane(0).unwrap();
        assert_eq!(popped.timestamp, original_ts);
        q.push_front(popped);

        assert_eq!(q.len(), 2);
        let head = q.pop_by_lane(0).unwrap();
        assert_eq!(head.timestamp, original_ts);
    }

    #[test]
    fn clear_empties_queue() {
        let q = QrQueue::new(store());
        q.push_back(item(0, "A"));
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn queue_indices_projected_into_state_store() {
        let state = store();
        let q = QrQueue::new(Arc::clone(&state));
        q.push_back(item(0, "A"));
        q.push_back(item(2, "C"));
        assert_eq!(state.queue_indices(), vec![0, 2]);
        q.pop_by_lane(0);
        assert_eq!(state.queue_indices(), vec![2]);
    }
}
