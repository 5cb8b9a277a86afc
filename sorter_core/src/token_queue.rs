//! The entry-token queue: a fungible count of unmatched gate-sensor edges.
//! Order is not observable, so this is a counter rather than a real queue.

use parking_lot::Mutex;

#[derive(Default)]
pub struct TokenQueue {
    count: Mutex<u64>,
}

impl TokenQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one gate-sensor edge. Returns the new count.
    pub fn add(&self) -> u64 {
        let mut count = self.count.lock();
        *count += 1;
        *count
    }

    /// Consume one token if available. Returns whether one was consumed.
    pub fn consume(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        *self.count.lock() == 0
    }

    pub fn length(&self) -> u64 {
        *self.count.lock()
    }

    pub fn clear(&self) {
        *self.count.lock() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_consume_nets_to_zero() {
        let q = TokenQueue::new();
        q.add();
        q.add();
        assert_eq!(q.length(), 2);
        assert!(q.consume());
        assert!(q.consume());
        assert!(!q.consume());
        assert!(q.is_empty());
    }

    #[test]
    fn length_equals_adds_minus_consumes_clamped_at_zero() {
        let q = TokenQueue::new();
        for _ in 0..5 {
            q.add();
        }
        for _ in 0..3 {
            q.consume();
        }
        assert_eq!(q.length(), 2);
        for _ in 0..10 {
            q.consume();
        }
        assert_eq!(q.length(), 0);
    }

    #[test]
    fn clear_resets_to_zero() {
        let q = TokenQueue::new();
        q.add();
        q.add();
        q.clear();
        assert!(q.is_empty());
    }
}
