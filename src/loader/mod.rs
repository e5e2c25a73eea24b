//! Program loader.
//!
//! Places a flat program image into freshly allocated frames, one page at a
//! time, and maps those frames at a fixed virtual base. The bytes are copied
//! straight into the frames through the raw RAM view, so the loader works
//! regardless of the CPU's paging state.

mod fs;

pub use fs::{Fd, FileSystem, HostFs, RamdiskFs};

use crate::error::{Error, Result};
use crate::memory::{
    is_page_aligned, layout::DEFAULT_ENTRY, pages_for, PhysAddr, PhysicalMemory, VirtAddr,
    PAGE_SIZE,
};
use crate::mmu::{AddressSpace, FrameAllocator};

/// One page installed by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapping {
    /// Virtual page address
    pub vaddr: VirtAddr,
    /// Frame backing the page
    pub frame: PhysAddr,
}

/// Result of loading a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    /// Entry point (the load base)
    pub entry: VirtAddr,
    /// Image size in bytes
    pub size: usize,
    /// Installed pages, in increasing virtual address order
    pub pages: Vec<PageMapping>,
}

/// Flat image loader.
#[derive(Debug, Clone)]
pub struct ProgramLoader {
    base: VirtAddr,
}

impl Default for ProgramLoader {
    fn default() -> Self {
        Self {
            base: DEFAULT_ENTRY,
        }
    }
}

impl ProgramLoader {
    /// Loader using the default base, [`DEFAULT_ENTRY`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Load at a different page-aligned base.
    pub fn with_base(mut self, base: VirtAddr) -> Result<Self> {
        if !is_page_aligned(base) {
            return Err(Error::MisalignedFrame(base));
        }
        self.base = base;
        Ok(self)
    }

    /// Load base and entry point.
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// Load `filename` into `pmem`, mapping it into `space`.
    ///
    /// A missing file is an error before anything is allocated. There is no
    /// rollback: if a later step fails, pages already installed stay mapped.
    /// The file is closed either way.
    pub fn load(
        &self,
        space: &AddressSpace,
        fs: &mut impl FileSystem,
        alloc: &mut impl FrameAllocator,
        pmem: &mut PhysicalMemory,
        filename: &str,
    ) -> Result<LoadedProgram> {
        let fd = fs.open(filename)?;
        crate::debug_loader!("filename={}, fd={}", filename, fd.0);

        let loaded = self.load_pages(space, fs, fd, alloc, pmem);
        let closed = fs.close(fd);
        let program = loaded?;
        closed?;

        log::info!(
            "loaded '{}' ({} bytes, {} pages) at 0x{:08x}",
            filename,
            program.size,
            program.pages.len(),
            program.entry
        );
        Ok(program)
    }

    fn load_pages(
        &self,
        space: &AddressSpace,
        fs: &mut impl FileSystem,
        fd: Fd,
        alloc: &mut impl FrameAllocator,
        pmem: &mut PhysicalMemory,
    ) -> Result<LoadedProgram> {
        let size = fs.size(fd)?;
        let count = pages_for(size);
        if self.base as u64 + (count * PAGE_SIZE) as u64 > 1 << 32 {
            return Err(Error::InvalidRange {
                base: self.base,
                size: size.try_into().unwrap_or(u32::MAX),
            });
        }

        let mut pages = Vec::with_capacity(count);
        let mut vaddr = self.base;
        for _ in 0..count {
            let frame = alloc.allocate_frame()?;
            space.map(pmem, alloc, vaddr, frame)?;
            fs.read(fd, pmem.frame_mut(frame)?)?;
            crate::debug_loader!("va=0x{:08x}, pa=0x{:08x}", vaddr, frame);
            pages.push(PageMapping { vaddr, frame });
            vaddr = vaddr.wrapping_add(PAGE_SIZE as u32);
        }

        Ok(LoadedProgram {
            entry: self.base,
            size,
            pages,
        })
    }
}

/// Load `filename` at [`DEFAULT_ENTRY`] and return the entry point.
pub fn load(
    space: &AddressSpace,
    fs: &mut impl FileSystem,
    alloc: &mut impl FrameAllocator,
    pmem: &mut PhysicalMemory,
    filename: &str,
) -> Result<VirtAddr> {
    ProgramLoader::new()
        .load(space, fs, alloc, pmem, filename)
        .map(|program| program.entry)
}
