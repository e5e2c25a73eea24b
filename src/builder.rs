//! Builder for configuring guest memory sessions.

use crate::device::MmioDevice;
use crate::error::{Error, Result};
use crate::guest::GuestMemory;
use crate::memory::{PhysRange, PhysicalMemory, PMEM_SIZE};
use crate::mmu::AccessTracking;

/// Builder for creating a [`GuestMemory`].
///
/// # Example
///
/// ```rust
/// use guestmem::{GuestMemory, memory::PhysRange, device::MmioHandlers};
/// use guestmem::mmu::AccessTracking;
///
/// let mem = GuestMemory::builder()
///     .memory_mb(16)
///     .access_tracking(AccessTracking::WriteBack)
///     .mmio("rtc", PhysRange::new(0xa0000, 0x10), MmioHandlers::new(|_, _| 0, |_, _, _| {}))
///     .build()?;
/// assert!(mem.is_mmio(0xa0004).is_some());
/// # Ok::<(), guestmem::Error>(())
/// ```
#[derive(Default)]
pub struct MemoryBuilder {
    memory_size: Option<usize>,
    tracking: AccessTracking,
    devices: Vec<(String, PhysRange, Box<dyn MmioDevice>)>,
}

impl MemoryBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the amount of guest RAM in megabytes.
    ///
    /// Default: 128 MB
    pub fn memory_mb(mut self, mb: u32) -> Self {
        self.memory_size = Some(mb as usize * 1024 * 1024);
        self
    }

    /// Set the amount of guest RAM in bytes.
    pub fn memory_size(mut self, bytes: usize) -> Self {
        self.memory_size = Some(bytes);
        self
    }

    /// Choose what happens to accessed/dirty bits during translation.
    ///
    /// Default: [`AccessTracking::Discard`]
    pub fn access_tracking(mut self, tracking: AccessTracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// Attach a device to a physical range.
    pub fn mmio(
        mut self,
        name: impl Into<String>,
        range: PhysRange,
        device: impl MmioDevice + 'static,
    ) -> Self {
        let device: Box<dyn MmioDevice> = Box::new(device);
        self.devices.push((name.into(), range, device));
        self
    }

    /// Build the session.
    ///
    /// Validates the RAM size and registers the devices in the order they
    /// were added; an invalid or overlapping range fails the build.
    pub fn build(self) -> Result<GuestMemory> {
        let size = self.memory_size.unwrap_or(PMEM_SIZE);
        if size == 0 {
            return Err(Error::InvalidMemorySize(size));
        }

        let pmem = PhysicalMemory::new(size)?;
        let mut memory = GuestMemory::new(pmem, self.tracking);
        for (name, range, device) in self.devices {
            memory.register_mmio(name, range, device)?;
        }

        log::debug!(
            "guest memory: {} bytes, {} MMIO regions, {:?}",
            size,
            memory.bus().mmio().len(),
            self.tracking
        );
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MmioHandlers;

    fn null() -> impl MmioDevice {
        MmioHandlers::new(|_, _| 0, |_, _, _| {})
    }

    #[test]
    fn test_defaults() {
        let mem = MemoryBuilder::new().build().unwrap();
        assert_eq!(mem.pmem().size(), PMEM_SIZE);
        assert_eq!(mem.access_tracking(), AccessTracking::Discard);
        assert!(mem.bus().mmio().is_empty());
    }

    #[test]
    fn test_invalid_size() {
        assert!(matches!(
            MemoryBuilder::new().memory_mb(0).build(),
            Err(Error::InvalidMemorySize(0))
        ));
    }

    #[test]
    fn test_devices_registered() {
        let mem = MemoryBuilder::new()
            .memory_mb(1)
            .mmio("a", PhysRange::new(0x1000, 0x100), null())
            .mmio("b", PhysRange::new(0x2000, 0x100), null())
            .build()
            .unwrap();
        assert_eq!(mem.bus().mmio().len(), 2);
        assert_eq!(mem.is_mmio(0x2010).map(|id| id.index()), Some(1));
    }

    #[test]
    fn test_overlapping_devices_fail() {
        let result = MemoryBuilder::new()
            .memory_mb(1)
            .mmio("a", PhysRange::new(0x1000, 0x100), null())
            .mmio("b", PhysRange::new(0x1080, 0x100), null())
            .build();
        assert!(matches!(result, Err(Error::MmioOverlap { .. })));
    }

    #[test]
    fn test_device_beyond_ram_fails() {
        let result = MemoryBuilder::new()
            .memory_mb(1)
            .mmio("far", PhysRange::new(0x10_0000, 0x100), null())
            .build();
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }
}
