use std::collections::VecDeque;

/// Fixed-capacity FIFO. Pushing into a full window evicts the oldest entry.
#[derive(Clone, Debug)]
pub struct SlidingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Contiguous view, oldest first.
    pub fn as_slice(&mut self) -> &[T] {
        self.items.make_contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let mut window = SlidingWindow::new(30);
        for i in 0..100 {
            window.push(i);
            assert!(window.len() <= 30);
            assert_eq!(window.len(), (i + 1).min(30));
        }
        assert!(window.is_full());
    }

    #[test]
    fn keeps_the_most_recent_entries_in_order() {
        let mut window = SlidingWindow::new(30);
        for i in 0..45 {
            window.push(i);
        }
        assert_eq!(window.as_slice(), (15..45).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn slice_view_is_oldest_first_after_wrapping() {
        let mut window = SlidingWindow::new(2);
        window.push(vec![1.0, 2.0]);
        window.push(vec![3.0, 4.0]);
        window.push(vec![5.0, 6.0]);
        assert_eq!(window.as_slice(), &[vec![3.0, 4.0], vec![5.0, 6.0]]);
    }
}
