//! Page-directory and page-table entries.
//!
//! Entries are plain 32-bit little-endian words living in guest RAM, with
//! the standard non-PAE layout: bits [31:12] hold the frame base and the
//! low bits are flags.

use std::fmt;

use bitflags::bitflags;

use crate::memory::{PhysAddr, PAGE_MASK};

bitflags! {
    /// Flag bits shared by PDEs and PTEs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        /// The entry maps a valid frame
        const PRESENT = 1 << 0;
        /// Writes are allowed
        const WRITABLE = 1 << 1;
        /// Accessible from user mode
        const USER = 1 << 2;
        /// Write-through caching
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled
        const CACHE_DISABLE = 1 << 4;
        /// Set when the page was referenced
        const ACCESSED = 1 << 5;
        /// Set when the page was written (PTE only)
        const DIRTY = 1 << 6;
        /// 4 MiB page (PDE only, not supported by the walker)
        const PAGE_SIZE = 1 << 7;
        /// Global page (PTE only)
        const GLOBAL = 1 << 8;
    }
}

/// Flags used for entries installed by [`AddressSpace`](super::AddressSpace).
pub const DEFAULT_FLAGS: EntryFlags = EntryFlags::PRESENT
    .union(EntryFlags::WRITABLE)
    .union(EntryFlags::USER);

const FRAME_MASK: u32 = !PAGE_MASK;

/// A page-directory entry.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PageDirectoryEntry(u32);

impl PageDirectoryEntry {
    /// Entry pointing at the page table in `frame`.
    pub const fn new(frame: PhysAddr, flags: EntryFlags) -> Self {
        Self((frame & FRAME_MASK) | (flags.bits() & PAGE_MASK))
    }

    /// Wrap a raw entry read from guest memory.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw entry value.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Physical base of the page table.
    pub const fn frame_base(&self) -> PhysAddr {
        self.0 & FRAME_MASK
    }

    /// Flags encoded in this entry.
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    pub fn is_accessed(&self) -> bool {
        self.flags().contains(EntryFlags::ACCESSED)
    }

    pub fn set_accessed(&mut self) {
        self.0 |= EntryFlags::ACCESSED.bits();
    }
}

/// A page-table entry.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Entry mapping the page onto `frame`.
    pub const fn new(frame: PhysAddr, flags: EntryFlags) -> Self {
        Self((frame & FRAME_MASK) | (flags.bits() & PAGE_MASK))
    }

    /// Wrap a raw entry read from guest memory.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw entry value.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Physical base of the mapped frame.
    pub const fn frame_base(&self) -> PhysAddr {
        self.0 & FRAME_MASK
    }

    /// Flags encoded in this entry.
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    pub fn is_accessed(&self) -> bool {
        self.flags().contains(EntryFlags::ACCESSED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags().contains(EntryFlags::DIRTY)
    }

    pub fn set_accessed(&mut self) {
        self.0 |= EntryFlags::ACCESSED.bits();
    }

    pub fn set_dirty(&mut self) {
        self.0 |= EntryFlags::DIRTY.bits();
    }
}

fn fmt_entry(name: &str, bits: u32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct(name)
        .field("frame", &format_args!("{:#010x}", bits & FRAME_MASK))
        .field("flags", &EntryFlags::from_bits_truncate(bits))
        .finish()
}

impl fmt::Debug for PageDirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_entry("PageDirectoryEntry", self.0, f)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_entry("PageTableEntry", self.0, f)
    }
}
