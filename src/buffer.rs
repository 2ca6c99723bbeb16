//! Reusable chunk buffers.
//!
//! [`BufferPool::acquire`] hands out a [`PooledBuffer`] guard that returns
//! its storage to the pool when dropped, so a buffer is released on every
//! exit path including `?` early returns.  The pool is single-threaded; one
//! pool belongs to one pack, extract or transform call.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct BufferPool {
    chunk_size: usize,
    free:       RefCell<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), free: RefCell::new(Vec::new()) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Borrow a zeroed-or-recycled buffer of exactly `chunk_size` bytes.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let data = self.free.borrow_mut().pop()
            .unwrap_or_else(|| vec![0u8; self.chunk_size]);
        PooledBuffer { pool: self, data }
    }

    /// Number of buffers currently parked in the pool.
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    data: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.free.borrow_mut().push(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_buffer_is_reused() {
        let pool = BufferPool::new(16);
        {
            let mut buf = pool.acquire();
            assert_eq!(buf.len(), 16);
            buf[0] = 0xAB;
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 16);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(pool: &BufferPool) -> io::Result<usize> {
            let mut buf = pool.acquire();
            let mut src = std::fs::File::open("/nonexistent/dirpack/source")?;
            io::Read::read(&mut src, &mut buf)
        }
        let pool = BufferPool::new(8);
        assert!(failing(&pool).is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_nested_acquire_allocates_second_buffer() {
        let pool = BufferPool::new(4);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        assert_eq!(BufferPool::new(0).acquire().len(), 1);
    }
}
