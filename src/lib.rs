//! # guestmem
//!
//! Memory subsystem for a 32-bit x86 teaching emulator: guest physical RAM,
//! MMIO routing, two-level paging and a flat program loader.
//!
//! ## Quick Start
//!
//! ```rust
//! use guestmem::{GuestMemory, Result};
//! use guestmem::loader::RamdiskFs;
//! use guestmem::memory::PhysRange;
//! use guestmem::mmu::{BumpAllocator, ControlRegisters};
//!
//! fn main() -> Result<()> {
//!     let mut mem = GuestMemory::builder().memory_mb(8).build()?;
//!     let mut frames = BumpAllocator::new(PhysRange::new(0x10_0000, 0x40_0000));
//!     let space = mem.new_address_space(&mut frames)?;
//!
//!     let mut fs = RamdiskFs::new();
//!     fs.add_file("/bin/hello", vec![0x90; 100]);
//!     let program = mem.load_program(&space, &mut fs, &mut frames, "/bin/hello")?;
//!
//!     let regs = ControlRegisters::paged(space.cr3());
//!     assert_eq!(mem.vaddr_read(&regs, program.entry, 1)?, 0x90);
//!     Ok(())
//! }
//! ```
//!
//! ## Faults
//!
//! Out-of-bounds physical accesses, missing page entries and accesses that
//! straddle a page boundary come back as [`Error`] values carrying the
//! faulting address. The library never aborts; treating them as fatal is up
//! to the caller.

mod builder;
pub mod bus;
pub mod debug;
pub mod device;
mod error;
pub mod guest;
pub mod loader;
pub mod memory;
pub mod mmu;

// Re-exports
pub use builder::MemoryBuilder;
pub use bus::Bus;
pub use error::{Error, Result};
pub use guest::GuestMemory;
pub use loader::{LoadedProgram, ProgramLoader};
