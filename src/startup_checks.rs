//! Startup requirement validation for oom-guard.
//!
//! This module checks that the guard can see and signal other users'
//! processes, and shields the guard itself from being chosen as a victim.
//! Nothing here is fatal: a guard with reduced reach is better than none.

use crate::config::Config;
use nix::unistd::geteuid;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use tracing::{info, warn};

/// Score written to the guard's own `oom_score_adj`: never kill.
pub const SELF_OOM_SCORE_ADJ: i32 = -1000;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("Process root {0} is not readable: {1}")]
    ProcRootUnavailable(String, String),
}

/// Validate all runtime requirements
pub fn validate_requirements(config: &Config) -> Result<(), ValidationError> {
    info!("Validating runtime requirements...");

    check_user_privileges();
    check_proc_access(config)?;

    info!("All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("Not running as root - only processes of the current user can be terminated");
        warn!("   Recommendation: Run as root (or with CAP_KILL) for full protection");
    } else {
        info!("Running as root (uid=0)");
    }
}

/// Check that the process root is listable and pid 1's score is readable.
fn check_proc_access(config: &Config) -> Result<(), ValidationError> {
    let root = &config.proc_root;
    if let Err(e) = fs::read_dir(root) {
        return Err(ValidationError::ProcRootUnavailable(
            root.display().to_string(),
            e.to_string(),
        ));
    }

    let test_file = root.join("1").join(&config.score_attribute);
    match fs::read(&test_file) {
        Ok(_) => {
            info!("{} readable", test_file.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(ValidationError::InsufficientPermissions(format!(
                "{}: {}",
                test_file.display(),
                e
            )))
        }
        Err(e) => {
            warn!("Could not test {}: {}", test_file.display(), e);
            Ok(())
        }
    }
}

/// Writes [`SELF_OOM_SCORE_ADJ`] to the guard's own score attribute, so
/// neither the kernel OOM killer nor the guard's own scan picks the guard.
pub fn protect_self(config: &Config) -> io::Result<()> {
    let path = config
        .proc_root
        .join("self")
        .join(&config.score_attribute);
    let mut f = OpenOptions::new().write(true).open(&path)?;
    f.write_all(SELF_OOM_SCORE_ADJ.to_string().as_bytes())?;
    info!("Own {} set to {}", config.score_attribute, SELF_OOM_SCORE_ADJ);
    Ok(())
}
