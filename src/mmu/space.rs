//! Guest address spaces and mapping installation.

use super::entry::{PageDirectoryEntry, PageTableEntry, DEFAULT_FLAGS};
use super::frame::FrameAllocator;
use super::registers::Cr3;
use super::{directory_index, page_offset, table_index};
use crate::error::{Error, Result};
use crate::memory::{
    is_page_aligned, page_round_down, PhysAddr, PhysRange, PhysicalMemory, VirtAddr, PAGE_SIZE,
};

const ENTRY_SIZE: u32 = 4;

/// A two-level page table rooted at a page directory in guest RAM.
///
/// The handle only remembers where the directory lives; the tables
/// themselves are guest memory and are edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    page_directory: PhysAddr,
}

impl AddressSpace {
    /// Allocate and zero a fresh page directory.
    pub fn new(pmem: &mut PhysicalMemory, alloc: &mut impl FrameAllocator) -> Result<Self> {
        let page_directory = alloc_zeroed(pmem, alloc)?;
        crate::debug_mmu!("new address space, pgdir=0x{:08x}", page_directory);
        Ok(Self { page_directory })
    }

    /// Address space for an existing directory, e.g. the one in CR3.
    pub fn from_cr3(cr3: Cr3) -> Self {
        Self {
            page_directory: cr3.page_directory_base(),
        }
    }

    /// Physical address of the page directory.
    pub fn page_directory(&self) -> PhysAddr {
        self.page_directory
    }

    /// CR3 value that activates this address space.
    pub fn cr3(&self) -> Cr3 {
        Cr3::new(self.page_directory)
    }

    /// Map the page at `vaddr` onto `frame`.
    ///
    /// The page table covering `vaddr` is allocated and zeroed on first use.
    /// An existing mapping for the page is replaced.
    pub fn map(
        &self,
        pmem: &mut PhysicalMemory,
        alloc: &mut impl FrameAllocator,
        vaddr: VirtAddr,
        frame: PhysAddr,
    ) -> Result<()> {
        if !is_page_aligned(vaddr) {
            return Err(Error::MisalignedFrame(vaddr));
        }
        if !is_page_aligned(frame) {
            return Err(Error::MisalignedFrame(frame));
        }

        let pde_addr = self.page_directory + directory_index(vaddr) * ENTRY_SIZE;
        let pde = PageDirectoryEntry::from_bits(pmem.read(pde_addr, 4)?);
        let table = if pde.is_present() {
            pde.frame_base()
        } else {
            let table = alloc_zeroed(pmem, alloc)?;
            pmem.write(pde_addr, 4, PageDirectoryEntry::new(table, DEFAULT_FLAGS).bits())?;
            crate::debug_mmu!("new page table 0x{:08x} for pdx {}", table, directory_index(vaddr));
            table
        };

        let pte_addr = table + table_index(vaddr) * ENTRY_SIZE;
        let old = PageTableEntry::from_bits(pmem.read(pte_addr, 4)?);
        if old.is_present() {
            log::warn!(
                "remapping vaddr 0x{:08x}: 0x{:08x} -> 0x{:08x}",
                vaddr,
                old.frame_base(),
                frame
            );
        }
        pmem.write(pte_addr, 4, PageTableEntry::new(frame, DEFAULT_FLAGS).bits())?;
        crate::debug_mmu!("map va=0x{:08x} -> pa=0x{:08x}", vaddr, frame);
        Ok(())
    }

    /// Map every page touched by `range` onto itself.
    pub fn map_identity(
        &self,
        pmem: &mut PhysicalMemory,
        alloc: &mut impl FrameAllocator,
        range: PhysRange,
    ) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let mut page = page_round_down(range.base) as u64;
        while page < range.end() {
            self.map(pmem, alloc, page as u32, page as u32)?;
            page += PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Walk the tables without touching accessed/dirty bits.
    ///
    /// Returns `None` when either level is not present.
    pub fn lookup(&self, pmem: &PhysicalMemory, vaddr: VirtAddr) -> Result<Option<PhysAddr>> {
        let pde_addr = self.page_directory + directory_index(vaddr) * ENTRY_SIZE;
        let pde = PageDirectoryEntry::from_bits(pmem.read(pde_addr, 4)?);
        if !pde.is_present() {
            return Ok(None);
        }
        let pte_addr = pde.frame_base() + table_index(vaddr) * ENTRY_SIZE;
        let pte = PageTableEntry::from_bits(pmem.read(pte_addr, 4)?);
        if !pte.is_present() {
            return Ok(None);
        }
        Ok(Some(pte.frame_base() | page_offset(vaddr)))
    }
}

fn alloc_zeroed(pmem: &mut PhysicalMemory, alloc: &mut impl FrameAllocator) -> Result<PhysAddr> {
    let frame = alloc.allocate_frame()?;
    if !is_page_aligned(frame) {
        return Err(Error::MisalignedFrame(frame));
    }
    pmem.fill(frame, PAGE_SIZE, 0)?;
    Ok(frame)
}
