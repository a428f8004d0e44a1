//! Chunk management - memory acquisition for pools
//!
//! Design: chunks start small (most pools hold a handful of objects) and
//! grow geometrically up to a cap. Oversized requests get a dedicated chunk.

use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Chunk size strategy
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024; // 8KB
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// Largest request served from a shared chunk
pub const MAX_CHUNKABLE_SIZE: usize = 1024;

/// Strictest alignment handed out by a pool
pub const MAX_ALIGN: usize = 16;

/// Zero-initialized memory region owned by a pool
pub struct Chunk {
    start: *mut u8,
    layout: Layout,
}

impl Chunk {
    pub fn new(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size.max(1), MAX_ALIGN).ok()?;

        let start = unsafe { alloc_zeroed(layout) };
        if start.is_null() {
            return None;
        }

        Some(Self { start, layout })
    }

    /// Chunk bounds for the bump allocator
    #[inline]
    pub fn bounds(&self) -> (*mut u8, *mut u8) {
        unsafe { (self.start, self.start.add(self.layout.size())) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.start, self.layout);
        }
    }
}

/// All chunks of one pool, freed together
pub struct ChunkList {
    chunks: Vec<Chunk>,
    next_size: usize,
}

impl ChunkList {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            next_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Acquire a shared chunk able to hold at least `min` bytes
    pub fn grow_with_min(&mut self, min: usize) -> Option<&Chunk> {
        let size = self.next_size.max(min);
        let chunk = Chunk::new(size)?;

        self.next_size = (self.next_size * 2).min(MAX_CHUNK_SIZE);

        self.chunks.push(chunk);
        self.chunks.last()
    }

    /// Acquire a chunk reserved for a single oversized allocation
    pub fn dedicated(&mut self, size: usize) -> Option<&Chunk> {
        let chunk = Chunk::new(size)?;
        self.chunks.push(chunk);
        self.chunks.last()
    }

    pub fn total_allocated(&self) -> usize {
        self.chunks.iter().map(|c| c.size()).sum()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ChunkList {
    fn default() -> Self {
        Self::new()
    }
}
