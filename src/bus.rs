//! Physical address routing between RAM and MMIO devices.

use crate::device::{MmioBus, MmioDevice, MmioRegionId};
use crate::error::{Error, Result};
use crate::memory::{access_mask, PhysAddr, PhysRange, PhysicalMemory};

/// Guest physical address space: RAM plus device regions.
///
/// Every access is bounds checked against the RAM capacity first, then
/// routed to the device owning the address or to RAM.
#[derive(Debug)]
pub struct Bus {
    pmem: PhysicalMemory,
    mmio: MmioBus,
}

impl Bus {
    /// Create a bus over `pmem` with no devices.
    pub fn new(pmem: PhysicalMemory) -> Self {
        Self {
            pmem,
            mmio: MmioBus::new(),
        }
    }

    /// Guest RAM.
    pub fn pmem(&self) -> &PhysicalMemory {
        &self.pmem
    }

    /// Guest RAM, mutably. Writes through this handle bypass MMIO routing.
    pub fn pmem_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.pmem
    }

    /// Registered device regions.
    pub fn mmio(&self) -> &MmioBus {
        &self.mmio
    }

    /// Physical capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.pmem.size()
    }

    /// Register a device region. The range must lie inside the physical
    /// capacity and must not overlap another region.
    pub fn register_mmio(
        &mut self,
        name: impl Into<String>,
        range: PhysRange,
        device: Box<dyn MmioDevice>,
    ) -> Result<MmioRegionId> {
        if range.end() > self.capacity() as u64 {
            return Err(Error::InvalidRange {
                base: range.base,
                size: range.size,
            });
        }
        self.mmio.register(name, range, device)
    }

    /// Region servicing `addr`, or `None` when RAM does.
    pub fn is_mmio(&self, addr: PhysAddr) -> Option<MmioRegionId> {
        self.mmio.find(addr)
    }

    fn check(&self, addr: PhysAddr, len: usize) -> Result<()> {
        access_mask(len)?;
        if !self.pmem.contains(addr, len) {
            return Err(Error::OutOfBounds { addr, len });
        }
        Ok(())
    }

    /// Read `len` bytes at a physical address.
    ///
    /// RAM reads are zero extended and masked to the access width; device
    /// reads return whatever the handler produced. Routing looks only at
    /// `addr`, like [`Bus::paddr_write`].
    pub fn paddr_read(&mut self, addr: PhysAddr, len: usize) -> Result<u32> {
        self.check(addr, len)?;
        match self.is_mmio(addr) {
            Some(id) => Ok(self.mmio.read(id, addr, len)),
            None => self.pmem.read(addr, len),
        }
    }

    /// Write the low `len` bytes of `data` at a physical address.
    ///
    /// The start address alone decides between device and RAM. A RAM access
    /// whose tail runs into a device region still lands entirely in RAM, and
    /// a device access never spills into the bytes after its region.
    pub fn paddr_write(&mut self, addr: PhysAddr, len: usize, data: u32) -> Result<()> {
        self.check(addr, len)?;
        match self.is_mmio(addr) {
            Some(id) => {
                self.mmio.write(id, addr, len, data);
                Ok(())
            }
            None => self.pmem.write(addr, len, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MmioHandlers;
    use std::sync::{Arc, Mutex};

    const SIZE: usize = 1024 * 1024;
    const SENTINEL: u32 = 0x5a5a_a5a5;
    const DEV_BASE: u32 = 0xa0000;

    fn bus_with_sentinel() -> (Bus, Arc<Mutex<Vec<(u32, usize, u32)>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let log = writes.clone();
        let mut bus = Bus::new(PhysicalMemory::new(SIZE).unwrap());
        bus.register_mmio(
            "sentinel",
            PhysRange::new(DEV_BASE, 0x1000),
            Box::new(MmioHandlers::new(
                |_, _| SENTINEL,
                move |addr, len, data| log.lock().unwrap().push((addr, len, data)),
            )),
        )
        .unwrap();
        (bus, writes)
    }

    #[test]
    fn test_ram_round_trip() {
        let (mut bus, _) = bus_with_sentinel();
        for (addr, len, value) in [
            (0x0u32, 1usize, 0xabu32),
            (0x1002, 2, 0x1234_beef),
            (0x9_fffc, 4, 0xdead_beef),
            ((SIZE - 4) as u32, 4, 0x0102_0304),
        ] {
            bus.paddr_write(addr, len, value).unwrap();
            let mask = access_mask(len).unwrap();
            assert_eq!(bus.paddr_read(addr, len).unwrap(), value & mask);
        }
    }

    #[test]
    fn test_mmio_exclusive_of_ram() {
        let (mut bus, writes) = bus_with_sentinel();

        assert_eq!(bus.is_mmio(DEV_BASE + 0x10).map(|id| id.index()), Some(0));
        assert_eq!(bus.is_mmio(DEV_BASE - 1), None);

        // Reads come from the device, unmasked
        assert_eq!(bus.paddr_read(DEV_BASE, 1).unwrap(), SENTINEL);
        assert_eq!(bus.paddr_read(DEV_BASE + 4, 4).unwrap(), SENTINEL);

        // Writes reach the device and never the backing array
        bus.paddr_write(DEV_BASE + 8, 4, 0xffff_ffff).unwrap();
        assert_eq!(&*writes.lock().unwrap(), &[(DEV_BASE + 8, 4, 0xffff_ffff)]);
        assert_eq!(bus.pmem().read(DEV_BASE + 8, 4).unwrap(), 0);
    }

    #[test]
    fn test_routing_uses_start_address() {
        let (mut bus, writes) = bus_with_sentinel();

        // Starts in RAM, ends inside the device: stored in RAM
        bus.paddr_write(DEV_BASE - 2, 4, 0x1122_3344).unwrap();
        assert!(writes.lock().unwrap().is_empty());
        assert_eq!(bus.pmem().read(DEV_BASE - 2, 2).unwrap(), 0x3344);
        assert_eq!(bus.pmem().read(DEV_BASE, 2).unwrap(), 0x1122);
        assert_eq!(bus.paddr_read(DEV_BASE - 2, 4).unwrap(), 0x1122_3344);

        // Starts in the device: serviced by the device
        assert_eq!(bus.paddr_read(DEV_BASE + 0xffe, 4).unwrap(), SENTINEL);
    }

    #[test]
    fn test_bounds_are_fatal() {
        let (mut bus, _) = bus_with_sentinel();
        let cap = SIZE as u32;
        assert!(matches!(
            bus.paddr_read(cap, 1),
            Err(Error::OutOfBounds { addr, .. }) if addr == cap
        ));
        assert!(matches!(
            bus.paddr_write(cap, 1, 0x42),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            bus.paddr_read(cap - 2, 4),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_mmio_outside_capacity_rejected() {
        let mut bus = Bus::new(PhysicalMemory::new(SIZE).unwrap());
        let err = bus
            .register_mmio(
                "far",
                PhysRange::new(SIZE as u32 - 0x10, 0x20),
                Box::new(MmioHandlers::new(|_, _| 0, |_, _, _| {})),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
    }

    #[test]
    fn test_invalid_length() {
        let (mut bus, _) = bus_with_sentinel();
        assert!(matches!(
            bus.paddr_read(DEV_BASE, 3),
            Err(Error::InvalidAccessLength(3))
        ));
    }
}
