//! Fixed-capacity sliding window over the most recent delay samples.

use std::num::NonZeroUsize;

use les_types::Sample;

/// The most recent `capacity` samples, newest first.
///
/// Backed by a ring buffer with a write index and a length counter, so a
/// push never allocates. Pushing into a full window evicts the oldest entry.
///
/// # Example
///
/// ```
/// use std::num::NonZeroUsize;
/// use les::SlidingWindow;
///
/// let mut window = SlidingWindow::new(NonZeroUsize::new(3).unwrap());
/// for sample in [1, 2, 3, 4] {
///     window.push(sample);
/// }
///
/// assert_eq!(window.iter().collect::<Vec<_>>(), vec![4, 3, 2]);
/// assert_eq!(window.average(), Some(3.0));
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Ring storage, `capacity` slots
    buffer: Box<[Sample]>,
    /// Slot the next push writes to
    head: usize,
    /// Number of valid samples (0 to capacity)
    len: usize,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` samples.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: vec![0; capacity.get()].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of samples kept.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True before the first push.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a sample as the newest entry, evicting the oldest when full.
    pub fn push(&mut self, sample: Sample) {
        let capacity = self.capacity();
        self.buffer[self.head] = sample;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Arithmetic mean of the current entries, or `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: f64 = self.iter().map(|s| s as f64).sum();
        Some(sum / self.len as f64)
    }

    /// Iterate from the newest sample to the oldest.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        let capacity = self.capacity();
        (1..=self.len).map(move |back| self.buffer[(self.head + capacity - back) % capacity])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(capacity: usize) -> SlidingWindow {
        SlidingWindow::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_eviction_keeps_newest_first() {
        let mut w = window(3);
        for s in [1, 2, 3, 4] {
            w.push(s);
        }

        assert_eq!(w.iter().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(w.len(), 3);
        assert_eq!(w.average(), Some(3.0));
    }

    #[test]
    fn test_empty_window_has_no_average() {
        let w = window(4);
        assert!(w.is_empty());
        assert_eq!(w.average(), None);
        assert_eq!(w.iter().count(), 0);
    }

    #[test]
    fn partially_filled_window_averages_present_entries() {
        let mut w = window(5);
        w.push(10);
        w.push(20);

        assert_eq!(w.len(), 2);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![20, 10]);
        assert_eq!(w.average(), Some(15.0));
    }

    #[test]
    fn capacity_one_holds_only_latest() {
        let mut w = window(1);
        for s in [5, 6, 7] {
            w.push(s);
        }

        assert_eq!(w.iter().collect::<Vec<_>>(), vec![7]);
        assert_eq!(w.average(), Some(7.0));
    }

    #[test]
    fn length_never_exceeds_capacity_across_wraparound() {
        let mut w = window(4);
        for s in 0..37 {
            w.push(s);
            assert!(w.len() <= w.capacity());
        }

        assert_eq!(w.iter().collect::<Vec<_>>(), vec![36, 35, 34, 33]);
    }
}
