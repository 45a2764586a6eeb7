//! Double-buffered shared-memory pixel buffers
//!
//! Every surface owns a two-slot pool. `acquire` never blocks: when both slots
//! are still held by the compositor the caller drops the frame and tries again
//! on the next trigger. `release` is driven by `wl_buffer.release`.

use smithay_client_toolkit::shm::{Shm, raw::RawPool};
use thiserror::Error;
use wayland_client::{
    Dispatch, QueueHandle,
    protocol::{wl_buffer::WlBuffer, wl_shm},
};

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("buffer size {width}x{height} is empty or too large")]
    Size { width: u32, height: u32 },
    #[error("failed to allocate shared memory buffer: {0}")]
    Allocation(String),
}

/// Memory a buffer draws into
pub trait Backing {
    fn canvas(&mut self) -> &mut [u8];
}

/// Identifies one allocation of one slot; a reallocated slot gets a new generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferKey {
    pub slot: usize,
    pub generation: u64,
}

/// User data attached to every `wl_buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTag {
    pub output: u32,
    pub key: BufferKey,
}

#[derive(Debug)]
pub struct Buffer<B> {
    backing: B,
    width: u32,
    height: u32,
    busy: bool,
    key: BufferKey,
}

impl<B: Backing> Buffer<B> {
    pub fn key(&self) -> BufferKey {
        self.key
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn canvas(&mut self) -> &mut [u8] {
        self.backing.canvas()
    }
}

#[derive(Debug)]
pub struct BufferPool<B> {
    slots: [Option<Buffer<B>>; 2],
    generation: u64,
}

impl<B: Backing> Default for BufferPool<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backing> BufferPool<B> {
    pub fn new() -> Self {
        Self {
            slots: [None, None],
            generation: 0,
        }
    }

    /// Loan a free buffer of exactly `width` x `height` pixels.
    ///
    /// Returns `Ok(None)` when both slots are busy. A free slot of the wrong
    /// size is dropped and reallocated through `allocate`. The returned buffer
    /// is marked busy until `release` is called with its key.
    pub fn acquire<F>(
        &mut self,
        width: u32,
        height: u32,
        allocate: F,
    ) -> Result<Option<&mut Buffer<B>>, BufferError>
    where
        F: FnOnce(u32, u32, BufferKey) -> Result<B, BufferError>,
    {
        if width == 0 || height == 0 {
            return Err(BufferError::Size { width, height });
        }

        let Some(slot) = self
            .slots
            .iter()
            .position(|entry| !entry.as_ref().is_some_and(|buffer| buffer.busy))
        else {
            return Ok(None);
        };

        let reusable = self.slots[slot]
            .as_ref()
            .is_some_and(|buffer| buffer.width == width && buffer.height == height);
        if !reusable {
            // Release the stale backing before mapping a new one.
            self.slots[slot] = None;
            self.generation += 1;
            let key = BufferKey {
                slot,
                generation: self.generation,
            };
            let backing = allocate(width, height, key)?;
            self.slots[slot] = Some(Buffer {
                backing,
                width,
                height,
                busy: false,
                key,
            });
        }

        let Some(buffer) = self.slots[slot].as_mut() else {
            return Ok(None);
        };
        buffer.busy = true;
        Ok(Some(buffer))
    }

    /// The compositor no longer reads from the buffer behind `key`.
    ///
    /// Releases for a replaced allocation are ignored.
    pub fn release(&mut self, key: BufferKey) -> bool {
        match self.slots.get_mut(key.slot) {
            Some(Some(buffer)) if buffer.key == key => {
                buffer.busy = false;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn busy_count(&self) -> usize {
        self.slots.iter().flatten().filter(|buffer| buffer.busy).count()
    }

    /// Drop both buffers, destroying their `wl_buffer`s
    pub fn clear(&mut self) {
        self.slots = [None, None];
    }
}

/// A `wl_buffer` backed by its own memfd pool
pub struct ShmBacking {
    pool: RawPool,
    buffer: WlBuffer,
    len: usize,
}

impl ShmBacking {
    pub fn new<D>(
        shm: &Shm,
        qh: &QueueHandle<D>,
        tag: BufferTag,
        width: u32,
        height: u32,
    ) -> Result<Self, BufferError>
    where
        D: Dispatch<WlBuffer, BufferTag> + 'static,
    {
        let size_err = || BufferError::Size { width, height };
        let stride = i32::try_from(width).ok().and_then(|w| w.checked_mul(4)).ok_or_else(size_err)?;
        let rows = i32::try_from(height).map_err(|_| size_err())?;
        let len = usize::try_from(stride)
            .ok()
            .and_then(|s| s.checked_mul(height as usize))
            .ok_or_else(size_err)?;

        let mut pool =
            RawPool::new(len, shm).map_err(|e| BufferError::Allocation(e.to_string()))?;
        let buffer = pool.create_buffer(
            0,
            stride / 4,
            rows,
            stride,
            wl_shm::Format::Argb8888,
            tag,
            qh,
        );

        Ok(Self { pool, buffer, len })
    }

    pub fn wl_buffer(&self) -> &WlBuffer {
        &self.buffer
    }
}

impl Backing for ShmBacking {
    fn canvas(&mut self) -> &mut [u8] {
        &mut self.pool.mmap()[..self.len]
    }
}

impl Drop for ShmBacking {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBacking(Vec<u8>);

    impl Backing for FakeBacking {
        fn canvas(&mut self) -> &mut [u8] {
            &mut self.0
        }
    }

    fn alloc(width: u32, height: u32, _key: BufferKey) -> Result<FakeBacking, BufferError> {
        Ok(FakeBacking(vec![0; 4 * width as usize * height as usize]))
    }

    #[test]
    fn test_acquire_alternates_slots_and_marks_busy() {
        let mut pool = BufferPool::new();
        let first = pool.acquire(10, 5, alloc).unwrap().unwrap().key();
        let second = pool.acquire(10, 5, alloc).unwrap().unwrap().key();
        assert_ne!(first.slot, second.slot);
        assert_eq!(pool.busy_count(), 2);

        // Both slots held by the compositor: the frame is skipped.
        assert!(pool.acquire(10, 5, alloc).unwrap().is_none());

        assert!(pool.release(first));
        let third = pool.acquire(10, 5, alloc).unwrap().unwrap();
        assert_eq!(third.key(), first, "same size reuses the allocation");
    }

    #[test]
    fn test_never_returns_a_busy_buffer() {
        let mut pool = BufferPool::new();
        let mut keys = Vec::new();
        for round in 0..20u32 {
            if let Some(buffer) = pool.acquire(4, 4, alloc).unwrap() {
                keys.push(buffer.key());
            }
            if round % 3 == 0 {
                if let Some(key) = keys.pop() {
                    pool.release(key);
                }
            }
            assert!(pool.busy_count() <= 2);
            let held: std::collections::HashSet<_> = keys.iter().map(|k| k.slot).collect();
            assert_eq!(held.len(), keys.len(), "a busy slot was handed out twice");
        }
    }

    #[test]
    fn test_size_change_reallocates() {
        let mut pool = BufferPool::new();
        let key = {
            let buffer = pool.acquire(10, 5, alloc).unwrap().unwrap();
            assert_eq!(buffer.canvas().len(), 4 * 10 * 5);
            buffer.key()
        };
        pool.release(key);

        let buffer = pool.acquire(20, 8, alloc).unwrap().unwrap();
        assert_eq!(buffer.canvas().len(), 4 * 20 * 8);
        assert_ne!(buffer.key().generation, key.generation);
    }

    #[test]
    fn test_stale_release_is_ignored() {
        let mut pool = BufferPool::new();
        let old = pool.acquire(10, 5, alloc).unwrap().unwrap().key();
        pool.release(old);
        let new = pool.acquire(12, 5, alloc).unwrap().unwrap().key();
        assert_eq!(old.slot, new.slot);

        assert!(!pool.release(old));
        assert_eq!(pool.busy_count(), 1);
        assert!(pool.release(new));
        assert_eq!(pool.busy_count(), 0);
    }

    #[test]
    fn test_failed_allocation_leaves_slot_empty() {
        let mut pool: BufferPool<FakeBacking> = BufferPool::new();
        let result = pool.acquire(10, 5, |_, _, _| Err(BufferError::Allocation("no memory".into())));
        assert!(result.is_err());
        assert_eq!(pool.busy_count(), 0);
        assert!(pool.acquire(10, 5, alloc).unwrap().is_some());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut pool = BufferPool::new();
        assert!(matches!(
            pool.acquire(0, 5, alloc),
            Err(BufferError::Size { width: 0, height: 5 })
        ));
    }

    #[test]
    fn test_clear_drops_both_buffers() {
        let mut pool = BufferPool::new();
        let old = pool.acquire(3, 3, alloc).unwrap().unwrap().key();
        pool.acquire(3, 3, alloc).unwrap();
        pool.clear();
        pool.clear();
        assert_eq!(pool.busy_count(), 0);
        assert!(!pool.release(old), "cleared buffers are gone");

        // Same size, yet a new allocation
        let new = pool.acquire(3, 3, alloc).unwrap().unwrap().key();
        assert_ne!(new.generation, old.generation);
    }
}
