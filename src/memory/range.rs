//! Physical address ranges.

use super::PhysAddr;

/// A half-open range `[base, base + size)` of guest physical addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysRange {
    /// First address of the range
    pub base: PhysAddr,
    /// Size in bytes
    pub size: u32,
}

impl PhysRange {
    /// Create a new range.
    pub const fn new(base: PhysAddr, size: u32) -> Self {
        Self { base, size }
    }

    /// Create a range from an inclusive `[start, end]` pair.
    pub const fn inclusive(start: PhysAddr, end: PhysAddr) -> Self {
        Self {
            base: start,
            size: end.wrapping_sub(start).wrapping_add(1),
        }
    }

    /// One past the last address, widened so the top of memory does not wrap.
    pub fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check if an address falls within this range.
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    /// Get the offset of an address within this range.
    pub fn offset(&self, addr: PhysAddr) -> Option<u32> {
        if self.contains(addr) {
            Some(addr - self.base)
        } else {
            None
        }
    }

    /// Whether two ranges share at least one address.
    pub fn overlaps(&self, other: &PhysRange) -> bool {
        (self.base as u64) < other.end() && (other.base as u64) < self.end()
    }
}

impl std::fmt::Display for PhysRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[0x{:08x}, 0x{:08x})", self.base, self.end())
    }
}
