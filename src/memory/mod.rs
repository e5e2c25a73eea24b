//! Guest physical memory.
//!
//! This module provides the RAM backing store and the page-size helpers
//! shared by the bus, the MMU and the program loader.

mod physical;
mod range;

pub use physical::PhysicalMemory;
pub use range::PhysRange;

/// Guest physical address.
pub type PhysAddr = u32;

/// Guest virtual address.
pub type VirtAddr = u32;

/// Page (and frame) size in bytes.
pub const PAGE_SIZE: usize = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the offset within a page.
pub const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

/// Default guest RAM size (128 MiB).
pub const PMEM_SIZE: usize = 128 * 1024 * 1024;

/// Largest RAM size a 32-bit physical address space can describe.
pub const MAX_PMEM_SIZE: u64 = 1 << 32;

/// Standard memory layout for loaded guest programs.
pub mod layout {
    use super::VirtAddr;

    /// Virtual address programs are loaded at and entered from.
    pub const DEFAULT_ENTRY: VirtAddr = 0x0804_8000;
}

/// Round an address down to the start of its page.
pub const fn page_round_down(addr: u32) -> u32 {
    addr & !PAGE_MASK
}

/// Round a byte count up to a whole number of pages.
pub const fn page_round_up(len: usize) -> usize {
    (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Number of pages needed to hold `len` bytes.
pub const fn pages_for(len: usize) -> usize {
    page_round_up(len) / PAGE_SIZE
}

/// Whether an address is page aligned.
pub const fn is_page_aligned(addr: u32) -> bool {
    addr & PAGE_MASK == 0
}

/// Whether an access of `len` bytes at `addr` stays within one page.
///
/// Zero-length accesses never cross. The end address is computed in 64 bits
/// so an access at the very top of the address space does not wrap.
pub fn within_page(addr: u32, len: usize) -> bool {
    if len == 0 {
        return true;
    }
    let last = addr as u64 + len as u64 - 1;
    (addr as u64 >> PAGE_SHIFT) == (last >> PAGE_SHIFT)
}

/// Check an access width, returning the value mask for it.
pub(crate) fn access_mask(len: usize) -> crate::Result<u32> {
    match len {
        1 => Ok(0xff),
        2 => Ok(0xffff),
        4 => Ok(0xffff_ffff),
        _ => Err(crate::Error::InvalidAccessLength(len)),
    }
}
