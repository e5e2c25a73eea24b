//! Debug logging utilities for guestmem.
//!
//! Set the `GUESTMEM_DEBUG` environment variable to enable verbose logging:
//! - `GUESTMEM_DEBUG=1` - Enable all debug output
//! - `GUESTMEM_DEBUG=mmu` - Enable only page-walk logs
//! - `GUESTMEM_DEBUG=mmio` - Enable only MMIO dispatch logs
//! - `GUESTMEM_DEBUG=loader` - Enable only program loader logs
//! - `GUESTMEM_DEBUG=mmu,loader` - Enable multiple categories
//!
//! The category macros forward to the `log` facade. Something still has to
//! install a logger; [`init_logging`] installs a stderr logger whose level is
//! taken from `GUESTMEM_LOG`.

use std::io::Write;
use std::sync::OnceLock;

use log::{LevelFilter, Log, Metadata, Record};

/// Debug categories that can be enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCategory {
    Mmu,
    Mmio,
    Loader,
    All,
}

/// Cached debug configuration
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

#[derive(Debug, Default, PartialEq, Eq)]
struct DebugConfig {
    enabled: bool,
    mmu: bool,
    mmio: bool,
    loader: bool,
}

impl DebugConfig {
    fn from_env() -> Self {
        Self::parse(std::env::var("GUESTMEM_DEBUG").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(val) if val == "1" || val.eq_ignore_ascii_case("all") => Self {
                enabled: true,
                mmu: true,
                mmio: true,
                loader: true,
            },
            Some(val) => {
                let val_lower = val.to_lowercase();
                let has = |name: &str| val_lower.split(',').any(|c| c.trim() == name);
                Self {
                    enabled: true,
                    mmu: has("mmu"),
                    mmio: has("mmio"),
                    loader: has("loader"),
                }
            }
            None => Self::default(),
        }
    }
}

fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Check if debug logging is enabled for a category
pub fn is_debug_enabled(category: DebugCategory) -> bool {
    let config = get_config();
    if !config.enabled {
        return false;
    }
    match category {
        DebugCategory::All => config.mmu || config.mmio || config.loader,
        DebugCategory::Mmu => config.mmu,
        DebugCategory::Mmio => config.mmio,
        DebugCategory::Loader => config.loader,
    }
}

/// Debug log macro for page-walk logs
#[macro_export]
macro_rules! debug_mmu {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Mmu) {
            ::log::debug!(target: "guestmem::mmu", $($arg)*);
        }
    };
}

/// Debug log macro for MMIO dispatch logs
#[macro_export]
macro_rules! debug_mmio {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Mmio) {
            ::log::debug!(target: "guestmem::mmio", $($arg)*);
        }
    };
}

/// Debug log macro for program loader logs
#[macro_export]
macro_rules! debug_loader {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Loader) {
            ::log::debug!(target: "guestmem::loader", $($arg)*);
        }
    };
}

/// Logger writing `[LEVEL target] message` lines to stderr.
struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

fn parse_level(value: Option<&str>, debug_enabled: bool) -> LevelFilter {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ if debug_enabled => LevelFilter::Debug,
        _ => LevelFilter::Warn,
    }
}

/// Install the stderr logger.
///
/// The level comes from `GUESTMEM_LOG`; without it the level is `debug`
/// when any `GUESTMEM_DEBUG` category is on and `warn` otherwise. Calling
/// this more than once, or after another logger was installed, is a no-op.
pub fn init_logging() {
    let level = parse_level(
        std::env::var("GUESTMEM_LOG").ok().as_deref(),
        is_debug_enabled(DebugCategory::All),
    );
    let logger = LOGGER.get_or_init(|| StderrLogger { level });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
}
