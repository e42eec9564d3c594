//! Growable compacting byte buffer.
//!
//! Socket reads arrive at arbitrary boundaries. The buffer keeps a single
//! contiguous backing store with two offsets:
//!
//! ```text
//! ┌──────────────┬───────────────────┬──────────────┐
//! │ consumed     │ live              │ free         │
//! └──────────────┴───────────────────┴──────────────┘
//! 0            start                end          capacity
//! ```
//!
//! `consume` only moves `start`. `append` writes into the free tail when it
//! fits, slides the live region back to offset 0 when the consumed head plus
//! the tail is enough, and only reallocates when neither can hold the chunk.

use std::ops::{Bound, RangeBounds};

/// Default initial capacity, large enough for a full request line.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Contiguous byte buffer with cheap consume and amortized append.
pub struct CompactingBuffer {
    store: Box<[u8]>,
    start: usize,
    end: usize,
}

impl CompactingBuffer {
    /// Create a buffer with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Append a chunk after the live bytes.
    pub fn append(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let capacity = self.store.len();
        let live = self.end - self.start;

        if capacity - self.end < chunk.len() {
            if capacity - live >= chunk.len() {
                self.store.copy_within(self.start..self.end, 0);
            } else {
                // Doubling keeps byte-at-a-time growth linear.
                let new_capacity = (live + chunk.len()).max(capacity * 2);
                let mut store = vec![0u8; new_capacity].into_boxed_slice();
                store[..live].copy_from_slice(&self.store[self.start..self.end]);
                self.store = store;
            }
            self.start = 0;
            self.end = live;
        }

        self.store[self.end..self.end + chunk.len()].copy_from_slice(chunk);
        self.end += chunk.len();
    }

    /// Mark the first `n` live bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the live length.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.len(), "consume({}) past live length {}", n, self.len());
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Read-only window into the live bytes, relative to the first unconsumed byte.
    ///
    /// An open upper bound means the live length.
    ///
    /// # Panics
    ///
    /// Panics if the range falls outside the live bytes.
    pub fn view<R: RangeBounds<usize>>(&self, range: R) -> &[u8] {
        let from = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let to = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.len(),
        };
        assert!(
            from <= to && to <= self.len(),
            "view {}..{} outside live length {}",
            from,
            to,
            self.len()
        );
        &self.store[self.start + from..self.start + to]
    }

    /// Number of live (unconsumed) bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if there are no live bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Size of the backing store.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Drop all live bytes, keeping the backing store.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl Default for CompactingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompactingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactingBuffer")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("capacity", &self.store.len())
            .finish()
    }
}
