//! Candidate records and command-line rendering.

use std::ffi::OsStr;
use std::fmt::{self, Write as _};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Longest `<root>/<pid>/cmdline` path a record can hold.
pub const CMDLINE_PATH_CAPACITY: usize = 128;

/// Inline, fixed-size copy of a cmdline path.
///
/// The best candidate has to survive every per-entry arena reset of the
/// scan, so its path is stored by value instead of in an arena.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CmdlinePath {
    bytes: [u8; CMDLINE_PATH_CAPACITY],
    len: usize,
}

impl CmdlinePath {
    /// Copies `path`, or returns `None` when it does not fit.
    pub fn new(path: &[u8]) -> Option<Self> {
        if path.len() > CMDLINE_PATH_CAPACITY {
            return None;
        }
        let mut bytes = [0u8; CMDLINE_PATH_CAPACITY];
        bytes[..path.len()].copy_from_slice(path);
        Some(Self {
            bytes,
            len: path.len(),
        })
    }

    pub fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.bytes[..self.len]))
    }
}

impl fmt::Debug for CmdlinePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_path(), f)
    }
}

/// The current best termination candidate of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub score: u32,
    pub cmdline_path: CmdlinePath,
}

/// A raw `/proc/<pid>/cmdline` buffer rendered for the console.
///
/// Arguments are NUL separated; they are shown space separated, trailing
/// separators dropped, invalid UTF-8 replaced.
#[derive(Clone, Copy)]
pub struct Cmdline<'a>(pub &'a [u8]);

impl fmt::Display for Cmdline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        if end == 0 {
            return f.write_str("<unknown>");
        }

        for chunk in self.0[..end].utf8_chunks() {
            for c in chunk.valid().chars() {
                f.write_char(if c == '\0' { ' ' } else { c })?;
            }
            if !chunk.invalid().is_empty() {
                f.write_char(char::REPLACEMENT_CHARACTER)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdline_path_fits() {
        let path = CmdlinePath::new(b"/proc/4242/cmdline").unwrap();
        assert_eq!(path.as_path(), Path::new("/proc/4242/cmdline"));
    }

    #[test]
    fn test_cmdline_path_too_long() {
        let long = vec![b'a'; CMDLINE_PATH_CAPACITY + 1];
        assert!(CmdlinePath::new(&long).is_none());
        let exact = vec![b'a'; CMDLINE_PATH_CAPACITY];
        assert!(CmdlinePath::new(&exact).is_some());
    }

    #[test]
    fn test_cmdline_display() {
        assert_eq!(
            Cmdline(b"/usr/bin/firefox\0--new-window\0\0\0").to_string(),
            "/usr/bin/firefox --new-window"
        );
        assert_eq!(Cmdline(b"").to_string(), "<unknown>");
        assert_eq!(Cmdline(b"\0\0\0").to_string(), "<unknown>");
        assert_eq!(Cmdline(b"ld\0\xff\0").to_string(), "ld \u{FFFD}");
    }
}
