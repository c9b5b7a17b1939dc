//! # Block Cache
//!
//! Offset-keyed cache of memory-mapped blocks with pin counting and LRU
//! eviction. This is the only path between in-memory node views and the
//! backing file: the tree engine asks for a block by file offset, works
//! through the returned guard, and the guard's drop releases the pin.
//!
//! ## Frames and pins
//!
//! Each resident block is a `Frame` holding its own `MmapMut` region and a
//! pin count. A block with pins > 0 is in active use by some tree operation
//! and can never be evicted. When the last pin drops the block is parked at
//! the front of the idle list; eviction consumes the list from the back, so
//! the least recently released block goes first.
//!
//! ## Eviction
//!
//! Eviction runs at the end of a cache miss, once the new frame is resident:
//! while the total resident byte count (pinned plus idle) exceeds the
//! ceiling, idle frames are unmapped oldest-first. Unmapping a MAP_SHARED
//! region hands its dirty pages to the kernel for write-back, so an evicted
//! block re-reads with its latest contents. If every frame is pinned the
//! cache stays over ceiling until pins drop; the ceiling is a target, not a
//! guarantee, once a single operation's working set exceeds it.
//!
//! ## Guard discipline
//!
//! `BlockRef::bytes`/`bytes_mut` return slices into the pinned mapping; the
//! guard's lifetime bounds them, so a reference can never outlive the pin.
//! The engine must not hold two guards for the same offset and write through
//! both; its descent discipline loads each block at most once per operation.

use std::collections::VecDeque;
use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use memmap2::MmapMut;
use parking_lot::Mutex;

use super::file::StoreFile;

#[derive(Debug)]
struct Frame {
    map: MmapMut,
    pins: u32,
}

#[derive(Debug)]
struct CacheInner {
    frames: HashMap<u64, Frame>,
    /// Unpinned offsets, most recently released at the front.
    idle: VecDeque<u64>,
    resident_bytes: usize,
}

#[derive(Debug)]
pub struct BlockCache {
    file: Arc<StoreFile>,
    inner: Mutex<CacheInner>,
    ceiling: usize,
}

impl BlockCache {
    pub fn new(file: Arc<StoreFile>, ceiling: usize) -> Self {
        Self {
            file,
            inner: Mutex::new(CacheInner {
                frames: HashMap::new(),
                idle: VecDeque::new(),
                resident_bytes: 0,
            }),
            ceiling,
        }
    }

    /// Returns a pinned guard for the block at `offset`, mapping it (and
    /// growing the file to cover it) on a miss.
    pub fn load(&self, offset: u64, len: usize) -> Result<BlockRef<'_>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(frame) = inner.frames.get_mut(&offset) {
            if frame.pins == 0 {
                if let Some(pos) = inner.idle.iter().position(|&o| o == offset) {
                    inner.idle.remove(pos);
                }
            }
            frame.pins += 1;
            let ptr = frame.map.as_mut_ptr();
            let len = frame.map.len();
            return Ok(BlockRef {
                cache: self,
                offset,
                ptr,
                len,
            });
        }

        self.file.ensure_len(offset + len as u64)?;
        let mut map = self.file.map_range(offset, len)?;
        let ptr = map.as_mut_ptr();

        inner.frames.insert(offset, Frame { map, pins: 1 });
        inner.resident_bytes += len;

        Self::evict_over_ceiling(inner, self.ceiling);

        Ok(BlockRef {
            cache: self,
            offset,
            ptr,
            len,
        })
    }

    fn release(&self, offset: u64) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(frame) = inner.frames.get_mut(&offset) {
            debug_assert!(frame.pins > 0, "release of unpinned block {offset}");
            frame.pins -= 1;
            if frame.pins == 0 {
                inner.idle.push_front(offset);
            }
        }
    }

    fn evict_over_ceiling(inner: &mut CacheInner, ceiling: usize) {
        while inner.resident_bytes > ceiling {
            let Some(offset) = inner.idle.pop_back() else {
                break;
            };
            if let Some(frame) = inner.frames.remove(&offset) {
                inner.resident_bytes -= frame.map.len();
                // Dropping the frame unmaps it; the kernel writes back any
                // dirty pages of the shared mapping.
            }
        }
    }

    /// Flushes every resident block to disk (`msync`).
    pub fn flush(&self) -> Result<()> {
        let guard = self.inner.lock();
        for (offset, frame) in guard.frames.iter() {
            frame
                .map
                .flush()
                .map_err(|e| eyre::eyre!("failed to flush block at offset {offset}: {e}"))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().resident_bytes
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// RAII pin on a cached block. Dropping the guard releases the pin, making
/// the block eligible for eviction again.
pub struct BlockRef<'a> {
    cache: &'a BlockCache,
    offset: u64,
    ptr: *mut u8,
    len: usize,
}

impl BlockRef<'_> {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: ptr was taken from the frame's mapping while pinned, and
        // the pin held by this guard keeps the frame resident: eviction only
        // touches unpinned frames and the file substrate never remaps a
        // region. The returned lifetime is bound to &self, so the slice
        // cannot outlive the pin.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for bytes(), plus exclusivity: &mut self guarantees no
        // other slice from *this* guard is live, and the engine holds at
        // most one guard per offset per operation, so no aliasing mutable
        // view of the block exists.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for BlockRef<'_> {
    fn drop(&mut self) {
        self.cache.release(self.offset);
    }
}
