//! RAM backing store.

use super::{access_mask, PhysAddr, MAX_PMEM_SIZE, PAGE_SIZE};
use crate::error::{Error, Result};

/// Guest physical RAM.
///
/// A zero-initialized byte array indexed by physical address. Every access
/// is bounds checked against the capacity; nothing here knows about MMIO.
pub struct PhysicalMemory {
    data: Vec<u8>,
}

impl PhysicalMemory {
    /// Allocate `size` bytes of zeroed guest RAM.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size as u64 > MAX_PMEM_SIZE {
            return Err(Error::InvalidMemorySize(size));
        }
        Ok(Self {
            data: vec![0; size],
        })
    }

    /// Size of guest RAM in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether `addr..addr+len` lies inside guest RAM.
    pub fn contains(&self, addr: PhysAddr, len: usize) -> bool {
        (addr as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len())
    }

    fn check(&self, addr: PhysAddr, len: usize) -> Result<usize> {
        if !self.contains(addr, len) {
            return Err(Error::OutOfBounds { addr, len });
        }
        Ok(addr as usize)
    }

    /// Read a `len`-byte little-endian value, zero extended to 32 bits.
    pub fn read(&self, addr: PhysAddr, len: usize) -> Result<u32> {
        let mask = access_mask(len)?;
        let start = self.check(addr, len)?;
        let mut buf = [0u8; 4];
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(u32::from_le_bytes(buf) & mask)
    }

    /// Store the low `len` bytes of `data` at `addr`, little-endian.
    pub fn write(&mut self, addr: PhysAddr, len: usize, data: u32) -> Result<()> {
        access_mask(len)?;
        let start = self.check(addr, len)?;
        self.data[start..start + len].copy_from_slice(&data.to_le_bytes()[..len]);
        Ok(())
    }

    /// Copy bytes out of guest RAM.
    pub fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) -> Result<()> {
        let start = self.check(addr, buf.len())?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    /// Copy bytes into guest RAM.
    pub fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) -> Result<()> {
        let start = self.check(addr, data.len())?;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fill `len` bytes at `addr` with `value`.
    pub fn fill(&mut self, addr: PhysAddr, len: usize, value: u8) -> Result<()> {
        let start = self.check(addr, len)?;
        self.data[start..start + len].fill(value);
        Ok(())
    }

    /// Raw host view of one physical frame.
    ///
    /// This bypasses translation entirely. It is only meant for populating
    /// memory before the guest starts running through the translated path.
    pub fn frame_mut(&mut self, frame: PhysAddr) -> Result<&mut [u8]> {
        if !super::is_page_aligned(frame) {
            return Err(Error::MisalignedFrame(frame));
        }
        let start = self.check(frame, PAGE_SIZE)?;
        Ok(&mut self.data[start..start + PAGE_SIZE])
    }

    /// Get a slice view of all of guest RAM.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for PhysicalMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 1024 * 1024;

    #[test]
    fn test_allocation() {
        let mem = PhysicalMemory::new(SIZE).unwrap();
        assert_eq!(mem.size(), SIZE);
        assert!(mem.as_slice().iter().all(|&b| b == 0));

        assert!(matches!(
            PhysicalMemory::new(0),
            Err(Error::InvalidMemorySize(0))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_capacity_above_4gib_rejected() {
        let too_big = MAX_PMEM_SIZE as usize + 1;
        assert!(matches!(
            PhysicalMemory::new(too_big),
            Err(Error::InvalidMemorySize(size)) if size == too_big
        ));
        assert!(matches!(
            PhysicalMemory::new(usize::MAX),
            Err(Error::InvalidMemorySize(_))
        ));
    }

    #[test]
    fn test_read_write_widths() {
        let mut mem = PhysicalMemory::new(SIZE).unwrap();

        mem.write(0x100, 4, 0xDEADBEEF).unwrap();
        assert_eq!(mem.read(0x100, 4).unwrap(), 0xDEADBEEF);
        assert_eq!(mem.read(0x100, 2).unwrap(), 0xBEEF);
        assert_eq!(mem.read(0x100, 1).unwrap(), 0xEF);
        assert_eq!(mem.read(0x103, 1).unwrap(), 0xDE);

        // Only the low bytes of the value are stored
        mem.write(0x200, 1, 0x1234_5678).unwrap();
        assert_eq!(mem.read(0x200, 4).unwrap(), 0x78);
        mem.write(0x200, 2, 0xAAAA_BBCC).unwrap();
        assert_eq!(mem.read(0x200, 4).unwrap(), 0xBBCC);
    }

    #[test]
    fn test_bounds() {
        let mut mem = PhysicalMemory::new(SIZE).unwrap();
        let cap = SIZE as u32;

        assert!(matches!(
            mem.read(cap, 1),
            Err(Error::OutOfBounds { addr, len: 1 }) if addr == cap
        ));
        assert!(matches!(
            mem.write(cap, 1, 0),
            Err(Error::OutOfBounds { .. })
        ));
        // The last word fits, one byte further does not
        assert!(mem.read(cap - 4, 4).is_ok());
        assert!(matches!(
            mem.read(cap - 3, 4),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            mem.read(0xffff_ffff, 4),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_invalid_length() {
        let mem = PhysicalMemory::new(SIZE).unwrap();
        assert!(matches!(mem.read(0, 3), Err(Error::InvalidAccessLength(3))));
        assert!(matches!(mem.read(0, 8), Err(Error::InvalidAccessLength(8))));
    }

    #[test]
    fn test_bytes_and_frames() {
        let mut mem = PhysicalMemory::new(SIZE).unwrap();

        let data = b"Hello, guest!";
        mem.write_bytes(0x3000, data).unwrap();
        let mut buf = [0u8; 13];
        mem.read_bytes(0x3000, &mut buf).unwrap();
        assert_eq!(&buf, data);

        let frame = mem.frame_mut(0x3000).unwrap();
        assert_eq!(frame.len(), PAGE_SIZE);
        assert_eq!(&frame[..13], data);
        frame[PAGE_SIZE - 1] = 0x5a;
        assert_eq!(mem.read(0x3fff, 1).unwrap(), 0x5a);

        assert!(matches!(
            mem.frame_mut(0x3001),
            Err(Error::MisalignedFrame(0x3001))
        ));
        assert!(matches!(
            mem.frame_mut(SIZE as u32),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_fill() {
        let mut mem = PhysicalMemory::new(SIZE).unwrap();
        mem.fill(0x10, 4, 0xff).unwrap();
        assert_eq!(mem.read(0x10, 4).unwrap(), 0xffff_ffff);
        assert_eq!(mem.read(0x14, 1).unwrap(), 0);
    }
}
