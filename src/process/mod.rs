//! Process-side modules for the guard's scan-and-terminate procedure.
//!
//! This module provides:
//! - `record`: The bounded candidate record kept across one scan
//! - `scanner`: /proc enumeration, score decoding and victim selection
//! - `terminate`: Graceful termination signal delivery
//! - `mitigation`: The best-effort external command run after each scan

pub mod mitigation;
pub mod record;
pub mod scanner;
pub mod terminate;

// Re-export commonly used types
pub use mitigation::run_mitigation;
pub use record::{Cmdline, CmdlinePath, ProcessRecord, CMDLINE_PATH_CAPACITY};
pub use scanner::{ProcessScanner, ScanOutcome};
pub use terminate::{SignalTerminator, Terminator};
