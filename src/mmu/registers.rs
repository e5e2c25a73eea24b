//! CR0/CR3 control register views.
//!
//! The CPU owns the registers; the MMU only reads them.

use bitflags::bitflags;

use crate::memory::{PhysAddr, PAGE_MASK};

bitflags! {
    /// CR0 flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cr0: u32 {
        /// Protected mode enable
        const PROTECTION_ENABLE = 1 << 0;
        /// Monitor coprocessor
        const MONITOR_COPROCESSOR = 1 << 1;
        /// x87 emulation
        const EMULATION = 1 << 2;
        /// Task switched
        const TASK_SWITCHED = 1 << 3;
        /// Extension type
        const EXTENSION_TYPE = 1 << 4;
        /// Numeric error
        const NUMERIC_ERROR = 1 << 5;
        /// Supervisor write protection
        const WRITE_PROTECT = 1 << 16;
        /// Alignment mask
        const ALIGNMENT_MASK = 1 << 18;
        /// Not write-through
        const NOT_WRITE_THROUGH = 1 << 29;
        /// Cache disable
        const CACHE_DISABLE = 1 << 30;
        /// Paging enable
        const PAGING = 1 << 31;
    }
}

/// CR3: physical base of the active page directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cr3(u32);

impl Cr3 {
    /// CR3 value pointing at the page directory at `page_directory`.
    /// Low (flag) bits of the argument are dropped.
    pub const fn new(page_directory: PhysAddr) -> Self {
        Self(page_directory & !PAGE_MASK)
    }

    /// Wrap a raw register value.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw register value.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Physical address of the page directory.
    pub const fn page_directory_base(&self) -> PhysAddr {
        self.0 & !PAGE_MASK
    }
}

/// Control register state consulted during translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegisters {
    pub cr0: Cr0,
    pub cr3: Cr3,
}

impl ControlRegisters {
    /// Real-mode state: no protection, no paging.
    pub const fn flat() -> Self {
        Self {
            cr0: Cr0::empty(),
            cr3: Cr3(0),
        }
    }

    /// Protected mode with paging on, rooted at `cr3`.
    pub const fn paged(cr3: Cr3) -> Self {
        Self {
            cr0: Cr0::PROTECTION_ENABLE.union(Cr0::PAGING),
            cr3,
        }
    }

    /// Translation only happens when both PE and PG are set.
    pub fn paging_enabled(&self) -> bool {
        self.cr0.contains(Cr0::PROTECTION_ENABLE | Cr0::PAGING)
    }
}

impl Default for ControlRegisters {
    fn default() -> Self {
        Self::flat()
    }
}
