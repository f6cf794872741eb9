//! Fixed-capacity history of valid samples for one signal.
//!
//! Single writer, single reader: each buffer is owned by exactly one
//! [`AlertEvaluator`](crate::evaluator::AlertEvaluator), so there is no locking.

use std::collections::VecDeque;

use crate::models::Sample;

const PREALLOC: usize = 64;

// ---

/// Ring buffer of the last `capacity` samples in arrival order.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    // ---
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl HistoryBuffer {
    // ---
    /// Create an empty buffer. A capacity of zero is bumped to one.
    ///
    /// Only the first `PREALLOC` slots are reserved up front.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(PREALLOC)),
        }
    }

    /// Append at the tail, evicting the oldest sample when full.
    pub fn append(&mut self, sample: Sample) {
        // ---
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.samples.make_contiguous();
    }

    /// Ordered view, oldest first.
    pub fn snapshot(&self) -> &[Sample] {
        // ---
        // `append` keeps the deque contiguous, so the second half is empty.
        let (head, tail) = self.samples.as_slices();
        debug_assert!(tail.is_empty());
        head
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }
}
