//! Graceful termination of selected processes.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Delivers the graceful termination request to a process.
///
/// Delivery is fire-and-forget: a process that already exited or that the
/// guard may not signal is simply left alone.
pub trait Terminator {
    fn terminate(&mut self, pid: u32);
}

/// Sends `SIGTERM` via `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl Terminator for SignalTerminator {
    fn terminate(&mut self, pid: u32) {
        let Ok(raw) = i32::try_from(pid) else {
            debug!("PID {} out of range for kill(2)", pid);
            return;
        };
        if raw <= 0 {
            return;
        }
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!("SIGTERM to PID {} failed: {}", pid, e);
        }
    }
}

impl<T: Terminator + ?Sized> Terminator for &mut T {
    fn terminate(&mut self, pid: u32) {
        (**self).terminate(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_terminator_ignores_pid_zero() {
        // kill(0, ..) would address our own process group.
        SignalTerminator.terminate(0);
    }

    #[test]
    fn test_signal_terminator_absorbs_missing_process() {
        // Above the kernel's pid_max limit, so ESRCH is guaranteed.
        SignalTerminator.terminate(99_999_999);
    }
}
