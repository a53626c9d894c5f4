//! Secondary mitigation command run after every scan.

use std::process::{Command, Stdio};
use tracing::debug;

/// Runs `command` (program first) and waits for it. The outcome is only
/// logged; an empty command does nothing.
pub fn run_mitigation(command: &[String]) {
    let Some((program, args)) = command.split_first() else {
        return;
    };

    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => debug!("Mitigation command {:?} finished", command),
        Ok(status) => debug!("Mitigation command {:?} exited with {}", command, status),
        Err(e) => debug!("Mitigation command {:?} could not be started: {}", command, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_skipped() {
        run_mitigation(&[]);
    }

    #[test]
    fn test_missing_program_is_absorbed() {
        run_mitigation(&["/nonexistent/oom-guard-mitigation".to_string()]);
    }

    #[test]
    fn test_failing_command_is_absorbed() {
        run_mitigation(&["false".to_string()]);
    }
}
