//! Process scanning: enumerate /proc, decode badness scores, pick victims.
//!
//! Every process whose score exceeds the hard-kill score is terminated as
//! soon as it is seen. Among the rest, the strictly highest score wins
//! (first seen on ties) and is terminated once the enumeration is complete.
//! Each directory entry is handled inside its own arena entry scope, so the
//! per-entry paths and read buffers never accumulate over thousands of
//! processes.

use crate::arena::{Arena, ArenaError, CycleScope};
use crate::config::Config;
use crate::parse::{parse_decimal_field, parse_pid, FIELD_WIDTH};
use crate::process::mitigation::run_mitigation;
use crate::process::record::{Cmdline, CmdlinePath, ProcessRecord};
use crate::process::terminate::Terminator;
use nix::dir::{Dir, Entry, Type};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Upper bound on the command line bytes read for a report.
pub const CMDLINE_READ_LIMIT: usize = 256;

/// Summary of one scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Directory entries seen, including non-process entries.
    pub visited: usize,
    /// Processes terminated during the scan for exceeding the hard-kill score.
    pub immediate: usize,
    /// The best below-threshold candidate, terminated after the scan.
    pub selected: Option<ProcessRecord>,
}

pub struct ProcessScanner<'c> {
    config: &'c Config,
}

impl<'c> ProcessScanner<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    /// Runs the full scan-and-terminate procedure once.
    ///
    /// Never fails: unreadable entries are skipped and the external
    /// mitigation command runs regardless of what was found.
    pub fn scan(
        &self,
        cycle: &mut CycleScope<'_>,
        terminator: &mut dyn Terminator,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut best: Option<ProcessRecord> = None;
        let root = self.config.proc_root.as_os_str().as_bytes();

        match Dir::open(
            &self.config.proc_root,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        ) {
            Ok(mut dir) => {
                for entry in dir.iter() {
                    let Ok(entry) = entry else {
                        continue;
                    };
                    outcome.visited += 1;

                    let scope = cycle.enter_entry();
                    if let Err(e) = self.visit(
                        scope.arena(),
                        root,
                        &entry,
                        &mut best,
                        &mut outcome,
                        terminator,
                    ) {
                        warn!("Skipping {:?}: {}", entry.file_name(), e);
                    }
                }
            }
            Err(e) => warn!("Failed to open {}: {}", self.config.proc_root.display(), e),
        }

        match best {
            Some(record) => {
                terminator.terminate(record.pid);
                let cmdline = read_cmdline(cycle.arena(), record.cmdline_path.as_path());
                report_termination(record.pid, record.score, cmdline);
                outcome.selected = Some(record);
            }
            None => info!("Found nothing to kill"),
        }

        run_mitigation(&self.config.mitigation_command);

        debug!(
            visited = outcome.visited,
            immediate = outcome.immediate,
            selected = ?outcome.selected.map(|r| r.pid),
            "Scan complete"
        );
        outcome
    }

    /// Handles one directory entry inside its entry scope.
    fn visit(
        &self,
        arena: &Arena,
        root: &[u8],
        entry: &Entry,
        best: &mut Option<ProcessRecord>,
        outcome: &mut ScanOutcome,
        terminator: &mut dyn Terminator,
    ) -> Result<(), ArenaError> {
        let name = entry.file_name().to_bytes();
        if !is_directory(arena, root, name, entry)? {
            return Ok(());
        }

        let score_path = arena.alloc_path(&[
            root,
            b"/",
            name,
            b"/",
            self.config.score_attribute.as_bytes(),
        ])?;
        let Some(score) = read_score(arena, score_path)? else {
            return Ok(());
        };

        if score > self.config.hard_kill_score {
            let Some(pid) = parse_pid(name) else {
                return Ok(());
            };
            terminator.terminate(pid);
            let cmdline_path = arena.alloc_path(&[root, b"/", name, b"/cmdline"])?;
            report_termination(pid, score, read_cmdline(arena, cmdline_path));
            outcome.immediate += 1;
        } else if score > best.map_or(0, |b| b.score) {
            let Some(pid) = parse_pid(name) else {
                return Ok(());
            };
            let path = arena.alloc_concat(&[root, b"/", name, b"/cmdline"])?;
            let Some(cmdline_path) = CmdlinePath::new(path) else {
                return Ok(());
            };
            *best = Some(ProcessRecord {
                pid,
                score,
                cmdline_path,
            });
        }
        Ok(())
    }
}

/// Uses the entry's `d_type`, falling back to `stat` when the filesystem
/// does not report one.
fn is_directory(
    arena: &Arena,
    root: &[u8],
    name: &[u8],
    entry: &Entry,
) -> Result<bool, ArenaError> {
    match entry.file_type() {
        Some(Type::Directory) => Ok(true),
        Some(_) => Ok(false),
        None => {
            let path = arena.alloc_path(&[root, b"/", name])?;
            Ok(fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false))
        }
    }
}

/// Reads a badness score. `None` for unreadable, non-positive or
/// malformed values.
fn read_score(arena: &Arena, path: &Path) -> Result<Option<u32>, ArenaError> {
    let buf = arena.alloc_bytes(FIELD_WIDTH)?;
    let len = match File::open(path) {
        Ok(mut file) => match file.read(buf) {
            Ok(len) => len,
            Err(_) => return Ok(None),
        },
        Err(_) => return Ok(None),
    };

    let text = &buf[..len];
    let text = text.strip_suffix(b"\n").unwrap_or(text);
    match text.first() {
        None | Some(b'-') | Some(b'0') => Ok(None),
        Some(_) => Ok(parse_decimal_field(text).filter(|&score| score > 0)),
    }
}

/// Reads up to [`CMDLINE_READ_LIMIT`] bytes of a command line. Anything
/// unreadable renders as `<unknown>`.
fn read_cmdline<'a>(arena: &'a Arena, path: &Path) -> Cmdline<'a> {
    let Ok(buf) = arena.alloc_bytes(CMDLINE_READ_LIMIT) else {
        return Cmdline(&[]);
    };
    let len = match File::open(path) {
        Ok(mut file) => file.read(buf).unwrap_or(0),
        Err(_) => 0,
    };
    Cmdline(&buf[..len])
}

fn report_termination(pid: u32, score: u32, cmdline: Cmdline<'_>) {
    warn!("Terminating PID {} (score {}): {}", pid, score, cmdline);
}
