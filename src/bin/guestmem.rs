//! guestmem CLI tool
//!
//! Loads a flat program image into a fresh guest memory session and
//! inspects it through the paged path.

use std::path::{Path, PathBuf};
use std::process;

use guestmem::loader::HostFs;
use guestmem::memory::{layout::DEFAULT_ENTRY, PhysRange, PAGE_SIZE, PMEM_SIZE};
use guestmem::mmu::{AccessTracking, BumpAllocator, ControlRegisters};
use guestmem::GuestMemory;

/// Frames for page tables and program pages come from here up to the end
/// of RAM, leaving the low 32 MiB to the kernel.
const DEFAULT_POOL_START: u32 = 0x0200_0000;

fn main() {
    guestmem::debug::init_logging();
    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("guestmem");

    if args.len() < 2 {
        print_usage(program);
        return Ok(());
    }

    match args[1].as_str() {
        "load" => cmd_load(&args[2..])?,
        "info" => cmd_info(),
        "help" | "--help" | "-h" => print_usage(program),
        "version" | "--version" | "-V" => print_version(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(program);
            process::exit(1);
        }
    }

    Ok(())
}

fn print_usage(program: &str) {
    println!(
        r#"guestmem - guest memory inspector

USAGE:
    {} <COMMAND> [OPTIONS]

COMMANDS:
    load    Load a program image with paging enabled
    info    Show memory layout defaults
    help    Show this help message
    version Show version information

LOAD OPTIONS:
    --image <PATH>        Program image to load (required)
    --memory <MB>         Guest RAM in MB (default: 128)
    --pool-start <ADDR>   First physical address handed out as a frame (default: 0x2000000)
    --dump <VADDR>[:N]    Read N 32-bit words at VADDR through the MMU (default N: 4)
    --write-back          Persist accessed/dirty bits into the page tables

ENVIRONMENT:
    GUESTMEM_LOG          error|warn|info|debug|trace
    GUESTMEM_DEBUG        1 | mmu,mmio,loader

EXAMPLES:
    {} load --image hello.bin
    {} load --image hello.bin --dump 0x8048000:8 --write-back
"#,
        program, program, program
    );
}

fn print_version() {
    println!("guestmem {}", env!("CARGO_PKG_VERSION"));
    let rust_version = option_env!("CARGO_PKG_RUST_VERSION")
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown");
    println!("Built with Rust {}", rust_version);
}

fn cmd_info() {
    println!("Guest Memory Defaults");
    println!("=====================");
    println!("RAM: {} MB", PMEM_SIZE / (1024 * 1024));
    println!("Page size: {} bytes", PAGE_SIZE);
    println!("Paging: x86 two-level (10/10/12)");
    println!("Program entry: 0x{:08x}", DEFAULT_ENTRY);
    println!("Frame pool start: 0x{:08x}", DEFAULT_POOL_START);
}

/// Parse `0x`-prefixed hex or decimal.
fn parse_addr(s: &str) -> Result<u32, Box<dyn std::error::Error>> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(value)
}

/// Parse `VADDR[:N]`. The dumped span `N * 4` must fit in 32 bits.
fn parse_dump(s: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (addr, count) = match s.split_once(':') {
        Some((addr, count)) => (parse_addr(addr)?, count.parse::<u32>()?),
        None => (parse_addr(s)?, 4),
    };
    if count.checked_mul(4).is_none() {
        return Err(format!("--dump count too large: {}", count).into());
    }
    Ok((addr, count))
}

fn cmd_load(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut image: Option<PathBuf> = None;
    let mut memory_mb = (PMEM_SIZE / (1024 * 1024)) as u32;
    let mut pool_start = DEFAULT_POOL_START;
    let mut dump: Option<(u32, u32)> = None;
    let mut tracking = AccessTracking::Discard;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--image" | "-i" => {
                i += 1;
                if i >= args.len() {
                    return Err("--image requires a path".into());
                }
                image = Some(PathBuf::from(&args[i]));
            }
            "--memory" | "-m" => {
                i += 1;
                if i >= args.len() {
                    return Err("--memory requires a number".into());
                }
                memory_mb = args[i].parse()?;
            }
            "--pool-start" => {
                i += 1;
                if i >= args.len() {
                    return Err("--pool-start requires an address".into());
                }
                pool_start = parse_addr(&args[i])?;
            }
            "--dump" | "-d" => {
                i += 1;
                if i >= args.len() {
                    return Err("--dump requires an address".into());
                }
                dump = Some(parse_dump(&args[i])?);
            }
            "--write-back" => {
                tracking = AccessTracking::WriteBack;
            }
            _ => {
                // Assume it's the image path if no flag
                if image.is_none() {
                    image = Some(PathBuf::from(&args[i]));
                } else {
                    return Err(format!("Unknown argument: {}", args[i]).into());
                }
            }
        }
        i += 1;
    }

    let image = image.ok_or("Image path is required")?;
    let root = image.parent().unwrap_or(Path::new("."));
    let name = image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("Image path has no file name")?;

    let mut mem = GuestMemory::builder()
        .memory_mb(memory_mb)
        .access_tracking(tracking)
        .build()?;

    let pool_size = (mem.pmem().size() as u64).saturating_sub(pool_start as u64);
    if pool_size == 0 {
        return Err(format!("frame pool start 0x{:08x} is beyond guest RAM", pool_start).into());
    }
    let pool = PhysRange::new(pool_start, pool_size.min(u32::MAX as u64) as u32);
    let mut frames = BumpAllocator::new(pool);
    let mut fs = HostFs::new(root);

    let space = mem.new_address_space(&mut frames)?;
    let program = mem.load_program(&space, &mut fs, &mut frames, name)?;

    println!("guestmem - Loaded program");
    println!("=========================");
    println!("Image: {}", image.display());
    println!("Size: {} bytes", program.size);
    println!("Page directory: 0x{:08x}", space.page_directory());
    println!("Entry: 0x{:08x}", program.entry);
    println!("Frames used: {}", frames.allocated());
    for page in &program.pages {
        println!("  va 0x{:08x} -> pa 0x{:08x}", page.vaddr, page.frame);
    }

    if let Some((addr, count)) = dump {
        let regs = ControlRegisters::paged(space.cr3());
        println!();
        for n in 0..count {
            let vaddr = addr.wrapping_add(n * 4);
            let value = mem.vaddr_read(&regs, vaddr, 4)?;
            println!("0x{:08x}: 0x{:08x}", vaddr, value);
        }
    }

    Ok(())
}
