//! Physical frame allocation.

use crate::error::{Error, Result};
use crate::memory::{PhysAddr, PhysRange, PAGE_SIZE};

/// Source of fresh physical frames.
///
/// Implementations return page-aligned, otherwise unused frames. Whether
/// exhaustion is an error or a panic is up to the implementation; the ones
/// in this crate return [`Error::OutOfFrames`].
pub trait FrameAllocator {
    /// Hand out one frame.
    fn allocate_frame(&mut self) -> Result<PhysAddr>;
}

/// Bump allocator over a fixed pool of physical memory.
///
/// Frames are handed out in increasing address order and never reclaimed.
/// They are not zeroed.
#[derive(Debug, Clone)]
pub struct BumpAllocator {
    next: u64,
    limit: u64,
    allocated: usize,
}

impl BumpAllocator {
    /// Allocate from `pool`. The pool start is rounded up to a page boundary.
    pub fn new(pool: PhysRange) -> Self {
        let page = PAGE_SIZE as u64;
        let next = (pool.base as u64 + page - 1) & !(page - 1);
        Self {
            next,
            limit: pool.end(),
            allocated: 0,
        }
    }

    /// Number of frames handed out so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Frames still available.
    pub fn remaining(&self) -> usize {
        (self.limit.saturating_sub(self.next) / PAGE_SIZE as u64) as usize
    }
}

impl FrameAllocator for BumpAllocator {
    fn allocate_frame(&mut self) -> Result<PhysAddr> {
        if self.next + PAGE_SIZE as u64 > self.limit {
            return Err(Error::OutOfFrames {
                next: self.next,
                limit: self.limit,
            });
        }
        let frame = self.next as PhysAddr;
        self.next += PAGE_SIZE as u64;
        self.allocated += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_frames() {
        let mut alloc = BumpAllocator::new(PhysRange::new(0x10_0000, 0x3000));
        assert_eq!(alloc.remaining(), 3);
        assert_eq!(alloc.allocate_frame().unwrap(), 0x10_0000);
        assert_eq!(alloc.allocate_frame().unwrap(), 0x10_1000);
        assert_eq!(alloc.allocate_frame().unwrap(), 0x10_2000);
        assert_eq!(alloc.allocated(), 3);
        assert!(matches!(
            alloc.allocate_frame(),
            Err(Error::OutOfFrames { .. })
        ));
    }

    #[test]
    fn test_unaligned_pool() {
        let mut alloc = BumpAllocator::new(PhysRange::new(0x10_0010, 0x2000));
        // Rounded up to 0x101000; only one whole frame fits before 0x102010
        assert_eq!(alloc.allocate_frame().unwrap(), 0x10_1000);
        assert!(alloc.allocate_frame().is_err());
    }
}
