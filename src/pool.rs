//! Shared decompressed-buffer pool.
//!
//! Cursors borrow their decompressed buffer from a [`SharedBufferPool`] and
//! hand it back on drop. Cloned cursors share one buffer through the
//! [`SharedBuffer`] handle; the reference count is the `Arc` strong count.
//! A writer never mutates a shared buffer: [`SharedBuffer::make_mut`]
//! releases this handle's reference and takes a fresh pool buffer instead,
//! which is what lets clones keep reading a stable snapshot until they
//! refill on their own (copy-on-refill).

use std::sync::Arc;

use parking_lot::Mutex;

/// Released buffers kept around for reuse beyond this are dropped.
const MAX_POOLED_BUFFERS: usize = 16;

pub struct SharedBufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Hands out a buffer with `len >= min_capacity`, reusing a released
    /// one when a large enough vector is pooled.
    pub fn acquire(self: &Arc<Self>, min_capacity: usize) -> SharedBuffer {
        let pooled = {
            let mut free = self.free.lock();
            let slot = free.iter().position(|buf| buf.capacity() >= min_capacity);
            slot.map(|i| free.swap_remove(i))
        };
        let mut data = pooled.unwrap_or_default();
        let len = data.capacity().max(min_capacity);
        data.resize(len, 0);
        SharedBuffer {
            data: Some(Arc::new(data)),
            pool: Arc::clone(self),
        }
    }

    /// Zero-capacity handle for readers that have released their buffer.
    pub(crate) fn empty_handle(self: &Arc<Self>) -> SharedBuffer {
        SharedBuffer {
            data: Some(Arc::new(Vec::new())),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, data: Vec<u8>) {
        if data.capacity() == 0 {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(data);
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for SharedBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference-counted handle over one pooled buffer. Dropping the last
/// handle returns the backing vector to its pool.
pub struct SharedBuffer {
    // Always `Some` until drop.
    data: Option<Arc<Vec<u8>>>,
    pool: Arc<SharedBufferPool>,
}

impl SharedBuffer {
    pub fn bytes(&self) -> &[u8] {
        self.data.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Another handle over the same bytes; bumps the reference count.
    pub fn share(&self) -> SharedBuffer {
        SharedBuffer {
            data: self.data.clone(),
            pool: Arc::clone(&self.pool),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.data
            .as_ref()
            .map_or(false, |data| Arc::strong_count(data) > 1)
    }

    pub fn capacity(&self) -> usize {
        self.data.as_deref().map_or(0, |data| data.len())
    }

    /// Mutable access with at least `min_capacity` bytes. If other handles
    /// share this buffer, they keep the old bytes and this handle switches
    /// to a fresh pool buffer before writing.
    pub fn make_mut(&mut self, min_capacity: usize) -> &mut [u8] {
        if self.is_shared() {
            let pool = Arc::clone(&self.pool);
            *self = pool.acquire(min_capacity);
        }
        let arc = self
            .data
            .as_mut()
            .expect("buffer present until drop"); // INVARIANT: data is Some outside Drop
        let data = Arc::get_mut(arc).expect("buffer uniquely owned"); // INVARIANT: uniqueness established above
        if data.len() < min_capacity {
            data.resize(min_capacity, 0);
        }
        data.as_mut_slice()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if let Some(arc) = self.data.take() {
            if let Ok(data) = Arc::try_unwrap(arc) {
                self.pool.release(data);
            }
        }
    }
}
