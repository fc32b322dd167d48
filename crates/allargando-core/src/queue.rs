//! Per-channel sample queues.
//!
//! Thin wrapper over a heap ring buffer that adds peeking a whole analysis
//! window without consuming it, and growth for output queues whose backlog
//! depends on how eagerly the caller retrieves.

use ringbuf::{traits::*, HeapRb};

/// FIFO of mono samples.
pub struct SampleQueue {
    rb: HeapRb<f32>,
}

impl SampleQueue {
    /// Queue with an initial capacity; it grows when a push does not fit.
    pub fn growable(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity.max(1)),
        }
    }

    /// Samples currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    /// Free space before the next reallocation.
    #[inline]
    pub fn space(&self) -> usize {
        self.rb.vacant_len()
    }

    /// Make room for `additional` more samples without losing queued data.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.len() + additional;
        if needed <= self.capacity() {
            return;
        }
        let new_capacity = needed.max(self.capacity() * 2);
        let pending: Vec<f32> = self.rb.iter().copied().collect();
        let mut grown = HeapRb::new(new_capacity);
        grown.push_slice(&pending);
        self.rb = grown;
    }

    /// Append samples, returning how many were queued.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        if samples.len() > self.space() {
            self.reserve(samples.len());
        }
        self.rb.push_slice(samples)
    }

    /// Append `count` zeros, returning how many were queued.
    pub fn push_zeros(&mut self, count: usize) -> usize {
        if count > self.space() {
            self.reserve(count);
        }
        self.rb.push_iter(std::iter::repeat(0.0).take(count))
    }

    /// Copy from the front without consuming. Returns samples copied.
    pub fn peek(&self, dest: &mut [f32]) -> usize {
        let mut copied = 0;
        for (d, s) in dest.iter_mut().zip(self.rb.iter()) {
            *d = *s;
            copied += 1;
        }
        copied
    }

    /// Move samples from the front into `dest`. Returns samples moved.
    pub fn pop(&mut self, dest: &mut [f32]) -> usize {
        self.rb.pop_slice(dest)
    }

    /// Drop up to `count` samples from the front. Returns samples dropped.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len());
        self.rb.skip(count)
    }

    pub fn clear(&mut self) {
        let len = self.len();
        self.rb.skip(len);
    }
}
