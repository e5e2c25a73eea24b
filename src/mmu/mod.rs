//! x86 two-level paging.
//!
//! With CR0.PE and CR0.PG both set, a 32-bit virtual address is split into
//! a 10-bit directory index, a 10-bit table index and a 12-bit offset:
//!
//! ```text
//!  31        22 21        12 11          0
//! +------------+------------+-------------+
//! | dir index  | tbl index  |   offset    |
//! +------------+------------+-------------+
//! ```
//!
//! The walk reads one PDE and one PTE through the bus. Both must be present;
//! a missing entry is reported as [`Error::PageNotPresent`] rather than
//! delivered to the guest as a page fault. There is no TLB.

mod entry;
mod frame;
mod registers;
mod space;

pub use entry::{EntryFlags, PageDirectoryEntry, PageTableEntry, DEFAULT_FLAGS};
pub use frame::{BumpAllocator, FrameAllocator};
pub use registers::{ControlRegisters, Cr0, Cr3};
pub use space::AddressSpace;

use std::fmt;

use crate::bus::Bus;
use crate::error::{Error, Result};
use crate::memory::{PhysAddr, VirtAddr, PAGE_MASK};

/// Directory index: bits [31:22].
pub const fn directory_index(vaddr: VirtAddr) -> u32 {
    (vaddr >> 22) & 0x3ff
}

/// Table index: bits [21:12].
pub const fn table_index(vaddr: VirtAddr) -> u32 {
    (vaddr >> 12) & 0x3ff
}

/// Offset within the page: bits [11:0].
pub const fn page_offset(vaddr: VirtAddr) -> u32 {
    vaddr & PAGE_MASK
}

/// Kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write)
    }
}

/// Level of the paging structure a walk failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingLevel {
    Directory,
    Table,
}

impl fmt::Display for PagingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagingLevel::Directory => write!(f, "page directory"),
            PagingLevel::Table => write!(f, "page table"),
        }
    }
}

/// What the walker does with the accessed and dirty bits it computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessTracking {
    /// Compute the updated entries but leave guest memory untouched.
    #[default]
    Discard,
    /// Store PDE.A, PTE.A and (on writes) PTE.D back into the tables, the
    /// way hardware does. Unchanged entries are not rewritten.
    WriteBack,
}

/// Translate a virtual address to a physical one.
///
/// Identity when paging is off. Otherwise walks the tables rooted at CR3;
/// the directory and table entries are read through [`Bus::paddr_read`].
pub fn translate(
    bus: &mut Bus,
    regs: &ControlRegisters,
    vaddr: VirtAddr,
    access: Access,
    tracking: AccessTracking,
) -> Result<PhysAddr> {
    if !regs.paging_enabled() {
        return Ok(vaddr);
    }

    let pde_addr = regs.cr3.page_directory_base() + directory_index(vaddr) * 4;
    let pde_raw = bus.paddr_read(pde_addr, 4)?;
    let mut pde = PageDirectoryEntry::from_bits(pde_raw);
    if !pde.is_present() {
        return Err(Error::PageNotPresent {
            level: PagingLevel::Directory,
            vaddr,
            entry: pde_raw,
        });
    }

    let pte_addr = pde.frame_base() + table_index(vaddr) * 4;
    let pte_raw = bus.paddr_read(pte_addr, 4)?;
    let mut pte = PageTableEntry::from_bits(pte_raw);
    if !pte.is_present() {
        return Err(Error::PageNotPresent {
            level: PagingLevel::Table,
            vaddr,
            entry: pte_raw,
        });
    }

    pde.set_accessed();
    pte.set_accessed();
    if access.is_write() {
        pte.set_dirty();
    }

    if tracking == AccessTracking::WriteBack {
        if pde.bits() != pde_raw {
            bus.paddr_write(pde_addr, 4, pde.bits())?;
        }
        if pte.bits() != pte_raw {
            bus.paddr_write(pte_addr, 4, pte.bits())?;
        }
    }

    let paddr = pte.frame_base() | page_offset(vaddr);
    crate::debug_mmu!(
        "{:?} va=0x{:08x} pde={:?} pte={:?} -> pa=0x{:08x}",
        access,
        vaddr,
        pde,
        pte,
        paddr
    );
    Ok(paddr)
}
