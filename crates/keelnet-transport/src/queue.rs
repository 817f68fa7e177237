use std::collections::VecDeque;

use parking_lot::Mutex;

/// FIFO shared between an I/O task and the dispatch loop.
///
/// The lock is held for one push or pop only. Callers never run a handler
/// while holding it: [`pop`](Self::pop) hands the item out first.
#[derive(Debug)]
pub struct FrameQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drops everything queued. Returns how many items were discarded.
    pub fn clear(&self) -> usize {
        let mut q = self.inner.lock();
        let n = q.len();
        q.clear();
        n
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_pop_is_fifo() {
        let q = FrameQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_clear_reports_discarded() {
        let q = FrameQueue::new();
        q.push("a");
        q.push("b");
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_concurrent_pushes_are_all_kept() {
        let q = Arc::new(FrameQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        q.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 1000);
    }
}
