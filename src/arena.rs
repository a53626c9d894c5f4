//! Fixed, pinned bump regions for the guard's working buffers.
//!
//! The guard has to keep working when the kernel cannot hand out more memory,
//! so every path, read buffer and command line it touches while scanning is
//! carved out of two regions allocated once at start-up:
//!
//! - the **outer** region lives for one polling cycle and is reset when the
//!   cycle begins ([`Arenas::begin_cycle`]);
//! - the **inner** region lives for one /proc entry and is reset when the
//!   entry scope is entered ([`CycleScope::enter_entry`]).
//!
//! Individual allocations are never freed. A reset needs `&mut` access to the
//! region, so the borrow checker rejects any allocation that would outlive
//! the reset of its region. The entry scope borrows the cycle scope mutably,
//! which makes nesting deeper than one level a compile error.

use std::cell::Cell;
use std::ffi::{c_void, OsStr};
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use tracing::{debug, warn};

/// Default capacity of the per-cycle region.
pub const DEFAULT_OUTER_CAPACITY: usize = 2 * 1024 * 1024;
/// Default capacity of the per-entry region.
pub const DEFAULT_INNER_CAPACITY: usize = 512 * 1024;

/// Identifies one of the two regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Outer,
    Inner,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Outer => f.write_str("outer"),
            Region::Inner => f.write_str("inner"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("{region} arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted {
        region: Region,
        requested: usize,
        remaining: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("mlock of {region} arena ({bytes} bytes) failed: {source}")]
    Region {
        region: Region,
        bytes: usize,
        source: io::Error,
    },

    #[error("mlockall(MCL_CURRENT) failed: {0}")]
    AddressSpace(io::Error),
}

/// A fixed-capacity bump region.
///
/// Allocation takes `&self` and hands out disjoint byte ranges; only
/// [`Arena::reset`] reclaims them. The region is neither `Send` nor `Sync`.
pub struct Arena {
    region: Region,
    base: NonNull<u8>,
    capacity: usize,
    used: Cell<usize>,
    peak: Cell<usize>,
}

impl Arena {
    /// Allocates the backing storage once. This is the only time the region
    /// asks the global allocator for memory.
    pub fn with_capacity(region: Region, capacity: usize) -> Self {
        let storage: &'static mut [u8] = Box::leak(vec![0u8; capacity].into_boxed_slice());
        Self {
            region,
            base: NonNull::from(storage).cast::<u8>(),
            capacity,
            used: Cell::new(0),
            peak: Cell::new(0),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Highest fill level seen since the region was created.
    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    /// Bump-allocates `len` zeroed bytes.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_bytes(&self, len: usize) -> Result<&mut [u8], ArenaError> {
        let used = self.used.get();
        let remaining = self.capacity - used;
        if len > remaining {
            return Err(ArenaError::Exhausted {
                region: self.region,
                requested: len,
                remaining,
            });
        }

        self.used.set(used + len);
        if used + len > self.peak.get() {
            self.peak.set(used + len);
        }

        // SAFETY: `used..used + len` lies inside the storage and was never
        // handed out since the last reset; resets need `&mut self`, so no
        // earlier slice can still be alive.
        let bytes = unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(used), len) };
        bytes.fill(0);
        Ok(bytes)
    }

    /// Bump-allocates the concatenation of `parts`.
    pub fn alloc_concat(&self, parts: &[&[u8]]) -> Result<&[u8], ArenaError> {
        let len = parts.iter().map(|p| p.len()).sum();
        let bytes = self.alloc_bytes(len)?;
        let mut at = 0;
        for part in parts {
            bytes[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        Ok(bytes)
    }

    /// Builds a path from raw components inside the region.
    pub fn alloc_path(&self, parts: &[&[u8]]) -> Result<&Path, ArenaError> {
        let bytes = self.alloc_concat(parts)?;
        Ok(Path::new(OsStr::from_bytes(bytes)))
    }

    /// Reclaims every allocation at once. A no-op on an empty region.
    ///
    /// Taking `&mut self` means no slice handed out before the reset can
    /// still be alive:
    ///
    /// ```compile_fail
    /// use oom_guard::{Arena, Region};
    ///
    /// let mut arena = Arena::with_capacity(Region::Outer, 64);
    /// let buf = arena.alloc_bytes(8).unwrap();
    /// arena.reset();
    /// buf[0] = 1;
    /// ```
    pub fn reset(&mut self) {
        self.used.set(0);
    }

    /// Locks the backing storage into physical memory.
    pub fn pin(&self) -> Result<(), PinError> {
        if self.capacity == 0 {
            return Ok(());
        }
        // SAFETY: base/capacity describe memory owned by this arena.
        let rc = unsafe { libc::mlock(self.base.as_ptr() as *const c_void, self.capacity) };
        if rc != 0 {
            return Err(PinError::Region {
                region: self.region,
                bytes: self.capacity,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: reconstructs exactly the boxed slice leaked in `with_capacity`.
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.base.as_ptr(),
                self.capacity,
            )));
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("region", &self.region)
            .field("capacity", &self.capacity)
            .field("used", &self.used.get())
            .field("peak", &self.peak.get())
            .finish()
    }
}

/// Locks every page currently mapped into the process.
fn pin_address_space() -> Result<(), PinError> {
    // SAFETY: plain syscall wrapper without pointer arguments.
    if unsafe { libc::mlockall(libc::MCL_CURRENT) } != 0 {
        return Err(PinError::AddressSpace(io::Error::last_os_error()));
    }
    Ok(())
}

fn pin_all(steps: &[&dyn Fn() -> Result<(), PinError>]) -> Result<(), PinError> {
    let mut first = None;
    for step in steps {
        if let Err(e) = step() {
            match first {
                None => first = Some(e),
                Some(_) => warn!("{}", e),
            }
        }
    }
    first.map_or(Ok(()), Err)
}

/// The outer and inner regions plus the marker of which one is current.
#[derive(Debug)]
pub struct Arenas {
    outer: Arena,
    inner: Arena,
    current: Cell<Region>,
}

impl Arenas {
    pub fn new(outer_capacity: usize, inner_capacity: usize) -> Self {
        Self {
            outer: Arena::with_capacity(Region::Outer, outer_capacity),
            inner: Arena::with_capacity(Region::Inner, inner_capacity),
            current: Cell::new(Region::Outer),
        }
    }

    /// Pins both regions, then everything else mapped so far.
    ///
    /// Every step is attempted even after a failure; the first error is
    /// returned and later ones are logged.
    pub fn pin(&self) -> Result<(), PinError> {
        pin_all(&[
            &|| self.outer.pin(),
            &|| self.inner.pin(),
            &pin_address_space,
        ])?;
        debug!(
            outer = self.outer.capacity(),
            inner = self.inner.capacity(),
            "Arena regions pinned"
        );
        Ok(())
    }

    pub fn current(&self) -> Region {
        self.current.get()
    }

    pub fn outer(&self) -> &Arena {
        &self.outer
    }

    pub fn inner(&self) -> &Arena {
        &self.inner
    }

    /// Starts a polling cycle: resets the outer region and makes it current.
    pub fn begin_cycle(&mut self) -> CycleScope<'_> {
        self.outer.reset();
        self.current.set(Region::Outer);
        CycleScope {
            outer: &self.outer,
            inner: &mut self.inner,
            current: &self.current,
        }
    }
}

/// One polling cycle. Outer allocations live as long as this scope.
pub struct CycleScope<'a> {
    outer: &'a Arena,
    inner: &'a mut Arena,
    current: &'a Cell<Region>,
}

impl<'a> CycleScope<'a> {
    /// The per-cycle region.
    pub fn arena(&self) -> &'a Arena {
        self.outer
    }

    pub fn current(&self) -> Region {
        self.current.get()
    }

    /// Enters the per-entry scope: resets the inner region and makes it
    /// current until the returned guard is dropped.
    pub fn enter_entry(&mut self) -> EntryScope<'_> {
        self.inner.reset();
        self.current.set(Region::Inner);
        EntryScope {
            inner: &*self.inner,
            current: self.current,
        }
    }
}

/// Per-entry scope guard. Dropping it makes the outer region current again,
/// whichever way the entry's processing ends.
pub struct EntryScope<'s> {
    inner: &'s Arena,
    current: &'s Cell<Region>,
}

impl EntryScope<'_> {
    /// The per-entry region. Allocations cannot outlive the scope.
    pub fn arena(&self) -> &Arena {
        self.inner
    }
}

impl Drop for EntryScope<'_> {
    fn drop(&mut self) {
        self.current.set(Region::Outer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_bytes_bumps_and_zeroes() {
        let arena = Arena::with_capacity(Region::Outer, 64);
        let a = arena.alloc_bytes(10).unwrap();
        a.fill(0xff);
        let b = arena.alloc_bytes(6).unwrap();
        assert!(b.iter().all(|&x| x == 0));
        assert_eq!(arena.used(), 16);
        assert_eq!(arena.remaining(), 48);
    }

    #[test]
    fn test_alloc_bytes_exhausted() {
        let arena = Arena::with_capacity(Region::Inner, 8);
        arena.alloc_bytes(5).unwrap();
        match arena.alloc_bytes(4) {
            Err(ArenaError::Exhausted {
                region,
                requested,
                remaining,
            }) => {
                assert_eq!(region, Region::Inner);
                assert_eq!(requested, 4);
                assert_eq!(remaining, 3);
            }
            Ok(_) => panic!("allocation beyond capacity must fail"),
        }
        // A failed request leaves the fill level untouched.
        assert_eq!(arena.used(), 5);
    }

    #[test]
    fn test_reset_on_empty_region_is_noop() {
        let mut arena = Arena::with_capacity(Region::Outer, 32);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.peak(), 0);
        assert_eq!(arena.remaining(), 32);
    }

    #[test]
    fn test_reset_reclaims_everything_and_keeps_peak() {
        let mut arena = Arena::with_capacity(Region::Outer, 32);
        arena.alloc_bytes(20).unwrap();
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.peak(), 20);
        // The full capacity is available again.
        assert_eq!(arena.alloc_bytes(32).unwrap().len(), 32);
    }

    #[test]
    fn test_alloc_path_concatenates() {
        let arena = Arena::with_capacity(Region::Inner, 128);
        let path = arena
            .alloc_path(&[b"/proc", b"/", b"1234", b"/", b"oom_score_adj"])
            .unwrap();
        assert_eq!(path, Path::new("/proc/1234/oom_score_adj"));
    }

    #[test]
    fn test_zero_capacity_region() {
        let arena = Arena::with_capacity(Region::Inner, 0);
        assert_eq!(arena.alloc_bytes(0).unwrap().len(), 0);
        assert!(arena.alloc_bytes(1).is_err());
    }

    #[test]
    fn test_begin_cycle_resets_outer() {
        let mut arenas = Arenas::new(64, 64);
        {
            let cycle = arenas.begin_cycle();
            cycle.arena().alloc_bytes(40).unwrap();
        }
        assert_eq!(arenas.outer().used(), 40);
        let cycle = arenas.begin_cycle();
        assert_eq!(cycle.arena().used(), 0);
        assert_eq!(cycle.current(), Region::Outer);
    }

    #[test]
    fn test_entry_scope_switches_and_restores() {
        let mut arenas = Arenas::new(64, 64);
        let mut cycle = arenas.begin_cycle();
        let outer = cycle.arena();
        outer.alloc_bytes(4).unwrap();

        {
            let entry = cycle.enter_entry();
            entry.arena().alloc_bytes(30).unwrap();
            assert_eq!(entry.arena().region(), Region::Inner);
            assert_eq!(entry.arena().used(), 30);
        }
        assert_eq!(cycle.current(), Region::Outer);

        // The next entry starts from an empty inner region.
        let entry = cycle.enter_entry();
        assert_eq!(entry.arena().used(), 0);
        drop(entry);

        // Outer allocations survive entry scopes.
        assert_eq!(outer.used(), 4);
    }

    #[test]
    fn test_entry_scope_restores_on_early_exit() {
        fn visit(cycle: &mut CycleScope<'_>, fail: bool) -> Result<(), ArenaError> {
            let entry = cycle.enter_entry();
            if fail {
                entry.arena().alloc_bytes(1024)?;
            }
            Ok(())
        }

        let mut arenas = Arenas::new(16, 16);
        let mut cycle = arenas.begin_cycle();
        assert!(visit(&mut cycle, true).is_err());
        assert_eq!(cycle.current(), Region::Outer);
        assert!(visit(&mut cycle, false).is_ok());
        assert_eq!(cycle.current(), Region::Outer);
    }

    #[test]
    fn test_entry_scope_restores_on_unwind() {
        let mut arenas = Arenas::new(16, 16);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut cycle = arenas.begin_cycle();
            let _entry = cycle.enter_entry();
            panic!("entry processing aborted");
        }));
        assert!(result.is_err());
        assert_eq!(arenas.current(), Region::Outer);
    }

    fn enomem() -> io::Error {
        io::Error::from_raw_os_error(libc::ENOMEM)
    }

    #[test]
    fn test_pin_all_attempts_every_step_after_failure() {
        let calls = Cell::new(0);
        let outer = || -> Result<(), PinError> {
            calls.set(calls.get() + 1);
            Err(PinError::Region {
                region: Region::Outer,
                bytes: DEFAULT_OUTER_CAPACITY,
                source: enomem(),
            })
        };
        let inner = || -> Result<(), PinError> {
            calls.set(calls.get() + 1);
            Ok(())
        };
        let address_space = || -> Result<(), PinError> {
            calls.set(calls.get() + 1);
            Err(PinError::AddressSpace(enomem()))
        };

        let result = pin_all(&[&outer, &inner, &address_space]);
        assert_eq!(calls.get(), 3);
        // The first failure is the one reported.
        assert!(matches!(
            result,
            Err(PinError::Region {
                region: Region::Outer,
                ..
            })
        ));
    }

    #[test]
    fn test_pin_all_succeeds_when_every_step_does() {
        let ok = || -> Result<(), PinError> { Ok(()) };
        assert!(pin_all(&[&ok, &ok]).is_ok());
    }
}
