//! Guest memory access layer.

use crate::bus::Bus;
use crate::device::{MmioDevice, MmioRegionId};
use crate::error::{Error, Result};
use crate::loader::{FileSystem, LoadedProgram, ProgramLoader};
use crate::memory::{within_page, PhysAddr, PhysRange, PhysicalMemory, VirtAddr};
use crate::mmu::{self, Access, AccessTracking, AddressSpace, ControlRegisters, FrameAllocator};

/// Memory subsystem of one emulator session.
///
/// Owns guest RAM and the device regions. Control registers stay with the
/// CPU and are passed in on every translated access. Independent instances
/// share nothing, so tests can run them in parallel.
///
/// # Example
///
/// ```rust
/// use guestmem::{GuestMemory, mmu::ControlRegisters};
///
/// let mut mem = GuestMemory::builder().memory_mb(1).build()?;
/// let regs = ControlRegisters::flat();
/// mem.vaddr_write(&regs, 0x100, 4, 0xdeadbeef)?;
/// assert_eq!(mem.vaddr_read(&regs, 0x100, 4)?, 0xdeadbeef);
/// # Ok::<(), guestmem::Error>(())
/// ```
#[derive(Debug)]
pub struct GuestMemory {
    bus: Bus,
    tracking: AccessTracking,
}

impl GuestMemory {
    /// Create a new memory builder.
    pub fn builder() -> crate::builder::MemoryBuilder {
        crate::builder::MemoryBuilder::new()
    }

    /// Create a session over `pmem` with no devices.
    pub fn new(pmem: PhysicalMemory, tracking: AccessTracking) -> Self {
        Self {
            bus: Bus::new(pmem),
            tracking,
        }
    }

    /// The physical bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The physical bus, mutably.
    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Guest RAM.
    pub fn pmem(&self) -> &PhysicalMemory {
        self.bus.pmem()
    }

    /// Raw guest RAM, bypassing both translation and MMIO routing.
    ///
    /// Only valid for setting up memory before the guest starts executing
    /// through the translated path.
    pub fn pmem_mut(&mut self) -> &mut PhysicalMemory {
        self.bus.pmem_mut()
    }

    /// Accessed/dirty bit policy of this session.
    pub fn access_tracking(&self) -> AccessTracking {
        self.tracking
    }

    /// Register a device region.
    pub fn register_mmio(
        &mut self,
        name: impl Into<String>,
        range: PhysRange,
        device: Box<dyn MmioDevice>,
    ) -> Result<MmioRegionId> {
        self.bus.register_mmio(name, range, device)
    }

    /// Region servicing a physical address, if any.
    pub fn is_mmio(&self, addr: PhysAddr) -> Option<MmioRegionId> {
        self.bus.is_mmio(addr)
    }

    /// Physical read, routed to RAM or a device.
    pub fn paddr_read(&mut self, addr: PhysAddr, len: usize) -> Result<u32> {
        self.bus.paddr_read(addr, len)
    }

    /// Physical write, routed to RAM or a device.
    pub fn paddr_write(&mut self, addr: PhysAddr, len: usize, data: u32) -> Result<()> {
        self.bus.paddr_write(addr, len, data)
    }

    /// Translate a virtual address under `regs`.
    pub fn translate(
        &mut self,
        regs: &ControlRegisters,
        vaddr: VirtAddr,
        access: Access,
    ) -> Result<PhysAddr> {
        mmu::translate(&mut self.bus, regs, vaddr, access, self.tracking)
    }

    /// Read `len` bytes at a virtual address.
    ///
    /// Accesses straddling a page boundary are refused before any
    /// translation happens.
    pub fn vaddr_read(
        &mut self,
        regs: &ControlRegisters,
        addr: VirtAddr,
        len: usize,
    ) -> Result<u32> {
        check_single_page(addr, len)?;
        let paddr = self.translate(regs, addr, Access::Read)?;
        self.bus.paddr_read(paddr, len)
    }

    /// Write the low `len` bytes of `data` at a virtual address.
    pub fn vaddr_write(
        &mut self,
        regs: &ControlRegisters,
        addr: VirtAddr,
        len: usize,
        data: u32,
    ) -> Result<()> {
        check_single_page(addr, len)?;
        let paddr = self.translate(regs, addr, Access::Write)?;
        self.bus.paddr_write(paddr, len, data)
    }

    /// Create an address space whose page directory lives in this RAM.
    pub fn new_address_space(&mut self, alloc: &mut impl FrameAllocator) -> Result<AddressSpace> {
        AddressSpace::new(self.bus.pmem_mut(), alloc)
    }

    /// Load a program image into this RAM, mapped into `space`.
    pub fn load_program(
        &mut self,
        space: &AddressSpace,
        fs: &mut impl FileSystem,
        alloc: &mut impl FrameAllocator,
        filename: &str,
    ) -> Result<LoadedProgram> {
        ProgramLoader::new().load(space, fs, alloc, self.bus.pmem_mut(), filename)
    }
}

fn check_single_page(addr: VirtAddr, len: usize) -> Result<()> {
    if !within_page(addr, len) {
        log::error!(
            "access crosses a page boundary: addr=0x{:08x}, len={}",
            addr,
            len
        );
        return Err(Error::CrossPage { addr, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MmioHandlers;
    use crate::loader::RamdiskFs;
    use crate::memory::layout::DEFAULT_ENTRY;
    use crate::mmu::{BumpAllocator, PagingLevel};

    const SIZE: usize = 4 * 1024 * 1024;

    fn session() -> GuestMemory {
        GuestMemory::new(PhysicalMemory::new(SIZE).unwrap(), AccessTracking::Discard)
    }

    #[test]
    fn test_flat_access() {
        let mut mem = session();
        let regs = ControlRegisters::flat();
        mem.vaddr_write(&regs, 0x1000, 2, 0xabcd_1234).unwrap();
        assert_eq!(mem.vaddr_read(&regs, 0x1000, 2).unwrap(), 0x1234);
        assert_eq!(mem.paddr_read(0x1000, 4).unwrap(), 0x1234);
    }

    #[test]
    fn test_cross_page_refused_even_when_mapped() {
        let mut mem = session();
        let regs = ControlRegisters::flat();

        assert!(matches!(
            mem.vaddr_read(&regs, 0x0fff, 4),
            Err(Error::CrossPage { addr: 0x0fff, len: 4 })
        ));
        assert!(matches!(
            mem.vaddr_read(&regs, 0x0ffe, 4),
            Err(Error::CrossPage { .. })
        ));
        assert!(matches!(
            mem.vaddr_write(&regs, 0x1fff, 2, 0),
            Err(Error::CrossPage { addr: 0x1fff, len: 2 })
        ));
        // Nothing was written on either side
        assert_eq!(mem.paddr_read(0x1ffc, 4).unwrap(), 0);
        assert_eq!(mem.paddr_read(0x2000, 4).unwrap(), 0);

        // Last bytes of a page are fine
        assert!(mem.vaddr_read(&regs, 0x0ffc, 4).is_ok());
        assert!(mem.vaddr_read(&regs, 0x0fff, 1).is_ok());
    }

    #[test]
    fn test_cross_page_checked_before_translation() {
        let mut mem = session();
        // Paging on with an empty directory: every page is unmapped
        let regs = ControlRegisters::paged(crate::mmu::Cr3::new(0x1000));
        assert!(matches!(
            mem.vaddr_read(&regs, 0x0fff, 4),
            Err(Error::CrossPage { .. })
        ));
        assert!(matches!(
            mem.vaddr_read(&regs, 0x0ff0, 4),
            Err(Error::PageNotPresent {
                level: PagingLevel::Directory,
                ..
            })
        ));
    }

    #[test]
    fn test_paged_access_goes_through_mapping() {
        let mut mem = session();
        let mut alloc = BumpAllocator::new(PhysRange::new(0x10_0000, 0x10_0000));
        let space = mem.new_address_space(&mut alloc).unwrap();
        space
            .map(mem.pmem_mut(), &mut alloc, 0x0804_8000, 0x5000)
            .unwrap();
        let regs = ControlRegisters::paged(space.cr3());

        mem.vaddr_write(&regs, 0x0804_8010, 4, 0x1122_3344).unwrap();
        assert_eq!(mem.paddr_read(0x5010, 4).unwrap(), 0x1122_3344);
        assert_eq!(mem.vaddr_read(&regs, 0x0804_8012, 2).unwrap(), 0x1122);
        assert!(matches!(
            mem.vaddr_read(&regs, 0x0804_9000, 1),
            Err(Error::PageNotPresent {
                level: PagingLevel::Table,
                ..
            })
        ));
    }

    #[test]
    fn test_virtual_access_reaches_mmio() {
        let mut mem = session();
        mem.register_mmio(
            "sentinel",
            PhysRange::new(0x8000, 0x1000),
            Box::new(MmioHandlers::new(|_, _| 0xfeed_f00d, |_, _, _| {})),
        )
        .unwrap();

        let mut alloc = BumpAllocator::new(PhysRange::new(0x10_0000, 0x10_0000));
        let space = mem.new_address_space(&mut alloc).unwrap();
        space.map(mem.pmem_mut(), &mut alloc, 0x4000_0000, 0x8000).unwrap();
        let regs = ControlRegisters::paged(space.cr3());

        assert!(mem.is_mmio(0x8004).is_some());
        assert_eq!(mem.vaddr_read(&regs, 0x4000_0004, 4).unwrap(), 0xfeed_f00d);
    }

    #[test]
    fn test_load_program_and_read_back() {
        let mut mem = session();
        let mut alloc = BumpAllocator::new(PhysRange::new(0x10_0000, 0x10_0000));
        let space = mem.new_address_space(&mut alloc).unwrap();

        let mut image = vec![0u8; 5000];
        image[0..4].copy_from_slice(&0x9090_90e8u32.to_le_bytes());
        image[4096..4100].copy_from_slice(&0xcafe_babeu32.to_le_bytes());
        let mut fs = RamdiskFs::new();
        fs.add_file("/bin/hello", image);

        let program = mem
            .load_program(&space, &mut fs, &mut alloc, "/bin/hello")
            .unwrap();
        assert_eq!(program.entry, DEFAULT_ENTRY);

        let regs = ControlRegisters::paged(space.cr3());
        assert_eq!(mem.vaddr_read(&regs, DEFAULT_ENTRY, 4).unwrap(), 0x9090_90e8);
        assert_eq!(
            mem.vaddr_read(&regs, DEFAULT_ENTRY + 4096, 4).unwrap(),
            0xcafe_babe
        );
        // Tail of the second page is zero-filled
        assert_eq!(mem.vaddr_read(&regs, DEFAULT_ENTRY + 8188, 4).unwrap(), 0);
    }
}
