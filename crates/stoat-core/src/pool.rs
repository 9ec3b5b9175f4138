use std::collections::HashMap;
use std::sync::Mutex;

// Pool — Recycled buffers for matrix storage
//
// A training step allocates and frees the same handful of buffer sizes over
// and over (one per operator output, one per gradient). The pool keeps
// released buffers bucketed by length so the next allocation of that length
// reuses them instead of going to the allocator.
//
// The pool is shared by every graph of a given element type and must be
// thread-safe: forward tasks allocate concurrently, and backward releases
// temporaries from the worker pool.

/// Maximum number of recycled buffers kept per length bucket.
/// Excess buffers are dropped and returned to the allocator.
const BUCKET_CAP: usize = 64;

/// A thread-safe pool of recycled `Vec<T>` buffers, bucketed by length.
pub struct Pool<T> {
    buckets: Mutex<HashMap<usize, Vec<Vec<T>>>>,
}

impl<T: Copy + Default> Pool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Pool {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Get a zeroed buffer of exactly `len` elements, reusing a recycled
    /// buffer when one is available.
    pub fn get_zeroed(&self, len: usize) -> Vec<T> {
        let recycled = {
            let mut buckets = self.buckets.lock().unwrap();
            buckets.get_mut(&len).and_then(|b| b.pop())
        };
        match recycled {
            Some(mut buf) => {
                buf.fill(T::default());
                buf
            }
            None => vec![T::default(); len],
        }
    }

    /// Get an uninitialized-content buffer of exactly `len` elements.
    /// The contents are unspecified (stale values from a prior use are
    /// possible); every element must be overwritten before reading.
    pub fn get_raw(&self, len: usize) -> Vec<T> {
        let recycled = {
            let mut buckets = self.buckets.lock().unwrap();
            buckets.get_mut(&len).and_then(|b| b.pop())
        };
        recycled.unwrap_or_else(|| vec![T::default(); len])
    }

    /// Return a buffer to the pool. Buffers beyond the bucket cap are
    /// dropped.
    pub fn put(&self, buf: Vec<T>) {
        if buf.is_empty() {
            return;
        }
        let len = buf.len();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(len).or_default();
        if bucket.len() < BUCKET_CAP {
            bucket.push(buf);
        }
    }

    /// Number of buffers currently held across all buckets.
    pub fn recycled_count(&self) -> usize {
        let buckets = self.buckets.lock().unwrap();
        buckets.values().map(|b| b.len()).sum()
    }

    /// Number of buffers currently held for one buffer length.
    pub fn bucket_len(&self, len: usize) -> usize {
        let buckets = self.buckets.lock().unwrap();
        buckets.get(&len).map_or(0, |b| b.len())
    }
}

impl<T: Copy + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse() {
        let pool: Pool<f64> = Pool::new();
        let mut buf = pool.get_zeroed(8);
        buf[3] = 42.0;
        pool.put(buf);
        assert_eq!(pool.recycled_count(), 1);

        // A zeroed get of the same length reuses the buffer and clears it.
        let buf = pool.get_zeroed(8);
        assert_eq!(pool.recycled_count(), 0);
        assert!(buf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_bucket_cap() {
        let pool: Pool<f32> = Pool::new();
        for _ in 0..(BUCKET_CAP + 10) {
            pool.put(vec![0.0f32; 4]);
        }
        assert_eq!(pool.recycled_count(), BUCKET_CAP);
    }

    #[test]
    fn test_empty_buffers_are_not_pooled() {
        let pool: Pool<f32> = Pool::new();
        pool.put(Vec::new());
        assert_eq!(pool.recycled_count(), 0);
    }
}
