//! Pool memory allocator - bump allocation over pool-owned chunks
//!
//! Design: two layers.
//! 1. Bump allocation inside the current chunk (fast path)
//! 2. Chunk acquisition (slow path, amortized by geometric growth)
//!
//! Nothing is freed individually; dropping the allocator frees every chunk.

mod arena;
mod bump;

#[cfg(test)]
mod tests;

pub use arena::{Chunk, ChunkList, DEFAULT_CHUNK_SIZE, MAX_ALIGN, MAX_CHUNKABLE_SIZE, MAX_CHUNK_SIZE};
pub use bump::BumpAllocator;

use core::ptr::NonNull;

/// Allocator backing a single pool
pub struct Allocator {
    bump: BumpAllocator,
    chunks: ChunkList,
}

// Chunks are owned exclusively by the allocator; the raw pointers never alias
// another allocator's memory.
unsafe impl Send for Allocator {}

impl Allocator {
    pub fn new() -> Self {
        Self {
            bump: BumpAllocator::new(),
            chunks: ChunkList::new(),
        }
    }

    /// Allocate zeroed memory (fast path first, falls back to a new chunk)
    pub fn alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() || align > MAX_ALIGN {
            return None;
        }

        if size > MAX_CHUNKABLE_SIZE {
            let chunk = self.chunks.dedicated(size)?;
            return NonNull::new(chunk.bounds().0);
        }

        if let Some(ptr) = self.bump.try_alloc(size, align) {
            return Some(ptr);
        }

        self.alloc_slow(size, align)
    }

    fn alloc_slow(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let chunk = self.chunks.grow_with_min(size + align)?;
        let (start, end) = chunk.bounds();

        self.bump.reset(start, end);

        self.bump.try_alloc(size, align)
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            total_allocated: self.chunks.total_allocated(),
            chunk_count: self.chunks.len(),
            current_chunk_remaining: self.bump.remaining(),
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocator statistics for monitoring and debugging
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    pub total_allocated: usize,
    pub chunk_count: usize,
    pub current_chunk_remaining: usize,
}
