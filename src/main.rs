//! oom-guard - version 0.2.0
//!
//! Last-resort low-memory guard daemon with tracing logging.
//! This is the main entry point: banner, logging, start-up checks, memory
//! pinning, then the polling loop, which never returns.

use anyhow::Context;
use oom_guard::{startup_checks, Config, Guard, SignalTerminator};
use tracing::{debug, error, info, warn, Level};

fn print_banner() {
    println!(
        "oom-guard {} ({})\n\
         License MIT OR Apache-2.0.\n\
         This is free software: you are free to change and redistribute it.\n\
         There is NO WARRANTY, to the extent permitted by law.\n",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown revision"),
    );
}

/// Initializes tracing logging subsystem.
fn setup_logging() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    print_banner();
    setup_logging()?;

    let config = Config::default();
    config.validate().context("Built-in configuration invalid")?;
    match config.render_yaml() {
        Ok(yaml) => debug!("Effective configuration:\n{}", yaml),
        Err(e) => debug!("Could not render configuration: {}", e),
    }

    if let Err(e) = startup_checks::validate_requirements(&config) {
        error!("Startup validation failed: {}", e);
        error!("   The guard will start but may not be able to terminate every process!");
    }

    if config.protect_self {
        if let Err(e) = startup_checks::protect_self(&config) {
            warn!("Could not lower own {}: {}", config.score_attribute, e);
        }
    }

    let mut guard = Guard::new(config, SignalTerminator)?;

    // Pin last, so that everything mapped during start-up is covered by
    // mlockall(MCL_CURRENT).
    if let Err(e) = guard.pin_memory() {
        error!("{}", e);
        error!("   Continuing unpinned; raise RLIMIT_MEMLOCK or grant CAP_IPC_LOCK");
    }

    info!(
        "Watching {}: scan below {} MB, hard-kill score above {}",
        guard.config().meminfo_path.display(),
        guard.config().low_memory_mb,
        guard.config().hard_kill_score
    );
    guard.run()
}
