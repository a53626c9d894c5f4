//! oom-guard library
//!
//! A last-resort low-memory guard for Linux. Once per second the guard reads
//! `MemAvailable` from /proc/meminfo; when it drops below the threshold, it
//! walks /proc, terminates every process whose `oom_score_adj` exceeds the
//! hard-kill score, and then terminates the remaining process with the
//! highest positive score.
//!
//! The guard has to keep working exactly when the kernel is out of memory,
//! so all working buffers come from two preallocated, pinned arena regions
//! (see [`arena`]) and all numeric fields are decoded without allocation
//! (see [`parse`]).
//!
//! # Usage
//!
//! ```rust,no_run
//! use oom_guard::{Config, Guard, SignalTerminator};
//!
//! let mut guard = Guard::new(Config::default(), SignalTerminator).unwrap();
//! if let Err(e) = guard.pin_memory() {
//!     eprintln!("mlock: {e}");
//! }
//! guard.run();
//! ```

pub mod arena;
pub mod config;
pub mod guard;
pub mod meminfo;
pub mod parse;
pub mod process;
pub mod startup_checks;

// Re-export main types for convenience
pub use arena::{Arena, ArenaError, Arenas, CycleScope, EntryScope, PinError, Region};
pub use config::{Config, ConfigError};
pub use guard::{is_low_memory, CycleReport, Guard};
pub use meminfo::MemoryPressureSampler;
pub use parse::parse_decimal_field;
pub use process::{ProcessRecord, ProcessScanner, ScanOutcome, SignalTerminator, Terminator};
