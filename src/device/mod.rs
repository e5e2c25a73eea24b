//! Memory-mapped device routing.
//!
//! Devices claim physical address ranges at initialization time. The bus
//! consults [`MmioBus::find`] before touching RAM, so an address is serviced
//! either by exactly one device or by RAM, never both.

use crate::error::{Error, Result};
use crate::memory::{PhysAddr, PhysRange};

/// Trait for devices reachable through memory-mapped I/O.
///
/// Handlers receive the absolute physical address and the access width
/// (1, 2 or 4 bytes).
pub trait MmioDevice: Send {
    /// Handle a guest read. The returned value is passed through unmodified.
    fn read(&mut self, addr: PhysAddr, len: usize) -> u32;

    /// Handle a guest write of the low `len` bytes of `data`.
    fn write(&mut self, addr: PhysAddr, len: usize, data: u32);
}

/// A device built from a pair of read/write closures.
pub struct MmioHandlers<R, W> {
    read: R,
    write: W,
}

impl<R, W> MmioHandlers<R, W> {
    /// Wrap a read and a write handler into a device.
    pub fn new(read: R, write: W) -> Self
    where
        R: FnMut(PhysAddr, usize) -> u32 + Send,
        W: FnMut(PhysAddr, usize, u32) + Send,
    {
        Self { read, write }
    }
}

impl<R, W> MmioDevice for MmioHandlers<R, W>
where
    R: FnMut(PhysAddr, usize) -> u32 + Send,
    W: FnMut(PhysAddr, usize, u32) + Send,
{
    fn read(&mut self, addr: PhysAddr, len: usize) -> u32 {
        (self.read)(addr, len)
    }

    fn write(&mut self, addr: PhysAddr, len: usize, data: u32) {
        (self.write)(addr, len, data)
    }
}

/// Handle to a registered MMIO region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmioRegionId(usize);

impl MmioRegionId {
    /// Registration index of the region.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A device region on the bus.
pub struct MmioRegion {
    name: String,
    range: PhysRange,
    device: Box<dyn MmioDevice>,
}

impl MmioRegion {
    /// Name given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical range claimed by the device.
    pub fn range(&self) -> PhysRange {
        self.range
    }
}

impl std::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("name", &self.name)
            .field("range", &self.range)
            .finish()
    }
}

/// Table of non-overlapping device regions.
#[derive(Debug, Default)]
pub struct MmioBus {
    regions: Vec<MmioRegion>,
}

impl MmioBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device for `range`.
    ///
    /// Empty ranges, ranges running past the 32-bit address space and ranges
    /// overlapping an existing region are rejected.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        range: PhysRange,
        device: Box<dyn MmioDevice>,
    ) -> Result<MmioRegionId> {
        if range.is_empty() || range.end() > 1 << 32 {
            return Err(Error::InvalidRange {
                base: range.base,
                size: range.size,
            });
        }
        if let Some(existing) = self.regions.iter().find(|r| r.range.overlaps(&range)) {
            return Err(Error::MmioOverlap {
                base: range.base,
                size: range.size,
                existing: existing.name.clone(),
            });
        }

        let id = MmioRegionId(self.regions.len());
        let name = name.into();
        crate::debug_mmio!("registered '{}' at {}", name, range);
        self.regions.push(MmioRegion {
            name,
            range,
            device,
        });
        Ok(id)
    }

    /// Find the region servicing `addr`, if any.
    pub fn find(&self, addr: PhysAddr) -> Option<MmioRegionId> {
        self.regions
            .iter()
            .position(|r| r.range.contains(addr))
            .map(MmioRegionId)
    }

    /// Look up a region by id.
    pub fn region(&self, id: MmioRegionId) -> Option<&MmioRegion> {
        self.regions.get(id.0)
    }

    /// All registered regions, in registration order.
    pub fn regions(&self) -> &[MmioRegion] {
        &self.regions
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region is registered.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Dispatch a read to the region's device.
    pub(crate) fn read(&mut self, id: MmioRegionId, addr: PhysAddr, len: usize) -> u32 {
        let region = &mut self.regions[id.0];
        let value = region.device.read(addr, len);
        crate::debug_mmio!(
            "read  '{}' addr=0x{:08x} len={} -> 0x{:08x}",
            region.name,
            addr,
            len,
            value
        );
        value
    }

    /// Dispatch a write to the region's device.
    pub(crate) fn write(&mut self, id: MmioRegionId, addr: PhysAddr, len: usize, data: u32) {
        let region = &mut self.regions[id.0];
        crate::debug_mmio!(
            "write '{}' addr=0x{:08x} len={} <- 0x{:08x}",
            region.name,
            addr,
            len,
            data
        );
        region.device.write(addr, len, data);
    }
}
