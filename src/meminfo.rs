//! Available-memory sampling from /proc/meminfo.
//!
//! The kernel prints every meminfo line as a 16 column label followed by an
//! 8 column `%8lu` value and ` kB`, 28 bytes per line. `MemAvailable` is the
//! third line, so its value always starts at byte `2 * 28 + 16`. Reading
//! that one field with `pread` avoids parsing the whole file every second.

use crate::arena::Arena;
use crate::parse::{parse_decimal_field, FIELD_WIDTH};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use tracing::warn;

/// Byte offset of the MemAvailable value column.
pub const MEMINFO_AVAILABLE_OFFSET: u64 = 4 * 16 + 8;

/// Samples are reported in units of 1000 kB.
pub const KB_PER_SAMPLE_UNIT: u32 = 1000;

/// Reads one available-memory estimate per cycle.
#[derive(Debug, Clone)]
pub struct MemoryPressureSampler {
    path: PathBuf,
    offset: u64,
}

impl MemoryPressureSampler {
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    /// Returns available memory in MB (kB / 1000).
    ///
    /// A missing file, short read or malformed field yields 0, the value of
    /// the zeroed read buffer, so a meminfo layout the sampler cannot decode
    /// makes every cycle a scan cycle. Each such cycle logs a warning. The
    /// read buffer comes from the cycle arena.
    pub fn sample(&self, arena: &Arena) -> u32 {
        let buf = match arena.alloc_bytes(FIELD_WIDTH) {
            Ok(buf) => buf,
            Err(e) => {
                warn!("No room for the meminfo read buffer: {}", e);
                return 0;
            }
        };

        let read = match File::open(&self.path) {
            Ok(file) => file.read_exact_at(buf, self.offset),
            Err(e) => Err(e),
        };
        if let Err(e) = read {
            warn!("Failed to read {}: {}", self.path.display(), e);
            return 0;
        }

        match parse_decimal_field(&buf[..]) {
            Some(kb) => kb / KB_PER_SAMPLE_UNIT,
            None => {
                warn!(
                    "Unexpected MemAvailable field {:?} in {}",
                    String::from_utf8_lossy(&buf[..]),
                    self.path.display()
                );
                0
            }
        }
    }
}
