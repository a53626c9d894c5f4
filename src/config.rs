//! Configuration for oom-guard.
//!
//! The guard deliberately has no config file and no command-line flags: it
//! always runs with [`Config::default`]. The thresholds still live in one
//! typed structure so that they are validated once at start-up, logged at
//! debug level, and overridable by tests.

use crate::arena::{DEFAULT_INNER_CAPACITY, DEFAULT_OUTER_CAPACITY};
use crate::meminfo::MEMINFO_AVAILABLE_OFFSET;
use crate::process::record::CMDLINE_PATH_CAPACITY;
use serde::{Deserialize, Serialize};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::Duration;

// Default configuration constants
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_MEMINFO_PATH: &str = "/proc/meminfo";
pub const DEFAULT_SCORE_ATTRIBUTE: &str = "oom_score_adj";
pub const DEFAULT_LOW_MEMORY_MB: u32 = 750;
pub const DEFAULT_HARD_KILL_SCORE: u32 = 200;
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PRESSURE_INTERVAL_MS: u64 = 5;

/// Highest value the kernel accepts for `oom_score_adj`.
pub const MAX_SCORE: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("low_memory_mb must be greater than 0")]
    ZeroLowMemoryThreshold,

    #[error("hard_kill_score must be between 1 and {}, got {}", MAX_SCORE, .0)]
    HardKillScoreOutOfRange(u32),

    #[error("idle_interval_ms and pressure_interval_ms must be greater than 0")]
    ZeroInterval,

    #[error("pressure_interval_ms ({pressure}) must not exceed idle_interval_ms ({idle})")]
    PressureIntervalTooLong { pressure: u64, idle: u64 },

    #[error("score_attribute must be a single non-empty file name, got {0:?}")]
    InvalidScoreAttribute(String),

    #[error(
        "proc_root {path:?} is too long: <root>/<pid>/cmdline must fit in {} bytes",
        CMDLINE_PATH_CAPACITY
    )]
    ProcRootTooLong { path: PathBuf },

    #[error("{region} arena capacity must be at least {min} bytes, got {got}")]
    ArenaTooSmall {
        region: &'static str,
        min: usize,
        got: usize,
    },
}

/// Smallest region that still holds one path plus one command line buffer.
pub const MIN_ARENA_CAPACITY: usize = 4 * 1024;

/// Effective guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the per-process directories.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Memory status file sampled once per cycle.
    #[serde(default = "default_meminfo_path")]
    pub meminfo_path: PathBuf,

    /// Byte offset of the 8-column MemAvailable value in `meminfo_path`.
    #[serde(default = "default_meminfo_offset")]
    pub meminfo_offset: u64,

    /// Per-process attribute holding the badness score.
    #[serde(default = "default_score_attribute")]
    pub score_attribute: String,

    /// Scan when available memory (MB) drops strictly below this.
    #[serde(default = "default_low_memory_mb")]
    pub low_memory_mb: u32,

    /// Scores strictly above this are terminated during the scan.
    #[serde(default = "default_hard_kill_score")]
    pub hard_kill_score: u32,

    /// Sleep between cycles while memory is fine.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Sleep after a cycle that intervened.
    #[serde(default = "default_pressure_interval_ms")]
    pub pressure_interval_ms: u64,

    #[serde(default = "default_outer_arena_bytes")]
    pub outer_arena_bytes: usize,

    #[serde(default = "default_inner_arena_bytes")]
    pub inner_arena_bytes: usize,

    /// Command run after every scan, program first. Empty disables it.
    #[serde(default = "default_mitigation_command")]
    pub mitigation_command: Vec<String>,

    /// Set the guard's own oom_score_adj to -1000 at start-up.
    #[serde(default = "default_protect_self")]
    pub protect_self: bool,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(DEFAULT_PROC_ROOT)
}
fn default_meminfo_path() -> PathBuf {
    PathBuf::from(DEFAULT_MEMINFO_PATH)
}
fn default_meminfo_offset() -> u64 {
    MEMINFO_AVAILABLE_OFFSET
}
fn default_score_attribute() -> String {
    DEFAULT_SCORE_ATTRIBUTE.to_string()
}
fn default_low_memory_mb() -> u32 {
    DEFAULT_LOW_MEMORY_MB
}
fn default_hard_kill_score() -> u32 {
    DEFAULT_HARD_KILL_SCORE
}
fn default_idle_interval_ms() -> u64 {
    DEFAULT_IDLE_INTERVAL_MS
}
fn default_pressure_interval_ms() -> u64 {
    DEFAULT_PRESSURE_INTERVAL_MS
}
fn default_outer_arena_bytes() -> usize {
    DEFAULT_OUTER_CAPACITY
}
fn default_inner_arena_bytes() -> usize {
    DEFAULT_INNER_CAPACITY
}
fn default_mitigation_command() -> Vec<String> {
    vec!["/usr/bin/akonadictl".to_string(), "stop".to_string()]
}
fn default_protect_self() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
            meminfo_path: default_meminfo_path(),
            meminfo_offset: default_meminfo_offset(),
            score_attribute: default_score_attribute(),
            low_memory_mb: default_low_memory_mb(),
            hard_kill_score: default_hard_kill_score(),
            idle_interval_ms: default_idle_interval_ms(),
            pressure_interval_ms: default_pressure_interval_ms(),
            outer_arena_bytes: default_outer_arena_bytes(),
            inner_arena_bytes: default_inner_arena_bytes(),
            mitigation_command: default_mitigation_command(),
            protect_self: default_protect_self(),
        }
    }
}

impl Config {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn pressure_interval(&self) -> Duration {
        Duration::from_millis(self.pressure_interval_ms)
    }

    /// Validates the effective config once, before any arena is allocated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_memory_mb == 0 {
            return Err(ConfigError::ZeroLowMemoryThreshold);
        }

        if self.hard_kill_score == 0 || self.hard_kill_score > MAX_SCORE {
            return Err(ConfigError::HardKillScoreOutOfRange(self.hard_kill_score));
        }

        if self.idle_interval_ms == 0 || self.pressure_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.pressure_interval_ms > self.idle_interval_ms {
            return Err(ConfigError::PressureIntervalTooLong {
                pressure: self.pressure_interval_ms,
                idle: self.idle_interval_ms,
            });
        }

        if self.score_attribute.is_empty()
            || self.score_attribute.contains('/')
            || self.score_attribute == "."
            || self.score_attribute == ".."
        {
            return Err(ConfigError::InvalidScoreAttribute(
                self.score_attribute.clone(),
            ));
        }

        // "<root>/" + 8 digit pid + "/cmdline"
        let longest_cmdline_path = self.proc_root.as_os_str().as_bytes().len() + 1 + 8 + 8;
        if longest_cmdline_path > CMDLINE_PATH_CAPACITY {
            return Err(ConfigError::ProcRootTooLong {
                path: self.proc_root.clone(),
            });
        }

        for (region, got) in [
            ("outer", self.outer_arena_bytes),
            ("inner", self.inner_arena_bytes),
        ] {
            if got < MIN_ARENA_CAPACITY {
                return Err(ConfigError::ArenaTooSmall {
                    region,
                    min: MIN_ARENA_CAPACITY,
                    got,
                });
            }
        }

        Ok(())
    }

    /// Renders the effective configuration for the debug log.
    pub fn render_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
