//! Error types for guestmem.

use thiserror::Error;

use crate::mmu::PagingLevel;

/// Result type alias using guestmem's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the memory subsystem.
///
/// None of these abort the process. The memory faults carry the faulting
/// address so a calling layer can either terminate the session or turn them
/// into guest-visible faults.
#[derive(Error, Debug)]
pub enum Error {
    // Memory faults
    #[error("physical address 0x{addr:08x} (len {len}) is out of bound")]
    OutOfBounds { addr: u32, len: usize },

    #[error("{level} entry not present for vaddr 0x{vaddr:08x} (entry 0x{entry:08x})")]
    PageNotPresent {
        level: PagingLevel,
        vaddr: u32,
        entry: u32,
    },

    #[error("access crosses a page boundary: addr=0x{addr:08x}, len={len}")]
    CrossPage { addr: u32, len: usize },

    #[error("invalid access length: {0} (must be 1, 2 or 4)")]
    InvalidAccessLength(usize),

    // Configuration errors
    #[error("invalid memory size: {0} bytes (must be > 0 and <= 4 GiB)")]
    InvalidMemorySize(usize),

    #[error("invalid physical range: base=0x{base:08x}, size=0x{size:x}")]
    InvalidRange { base: u32, size: u32 },

    #[error("MMIO range 0x{base:08x}+0x{size:x} overlaps region '{existing}'")]
    MmioOverlap {
        base: u32,
        size: u32,
        existing: String,
    },

    // Allocation errors
    #[error("out of physical frames (next 0x{next:08x}, limit 0x{limit:08x})")]
    OutOfFrames { next: u64, limit: u64 },

    #[error("address 0x{0:08x} is not page aligned")]
    MisalignedFrame(u32),

    // Loader errors
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("bad file descriptor: {0}")]
    BadDescriptor(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Faulting guest address for memory faults, `None` for everything else.
    pub fn fault_address(&self) -> Option<u32> {
        match self {
            Error::OutOfBounds { addr, .. } => Some(*addr),
            Error::PageNotPresent { vaddr, .. } => Some(*vaddr),
            Error::CrossPage { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Whether this error is a guest memory fault rather than a host-side
    /// configuration or I/O problem.
    pub fn is_memory_fault(&self) -> bool {
        self.fault_address().is_some()
    }
}
