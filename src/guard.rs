//! The polling loop.
//!
//! Each cycle resets the cycle arena, samples available memory and, only
//! when it is below the threshold, runs the scan-and-terminate procedure.
//! A cycle that intervened sleeps for the short pressure interval because
//! the offending process may still be allocating; every other cycle sleeps
//! for the idle interval. The loop never returns: the guard is stopped from
//! outside, by a signal.

use crate::arena::{Arenas, PinError};
use crate::config::{Config, ConfigError};
use crate::meminfo::MemoryPressureSampler;
use crate::process::{ProcessScanner, ScanOutcome, Terminator};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Strictly below the threshold means memory is low.
pub fn is_low_memory(available_mb: u32, threshold_mb: u32) -> bool {
    available_mb < threshold_mb
}

/// What one polling cycle observed and decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub available_mb: u32,
    pub scan: Option<ScanOutcome>,
    pub sleep: Duration,
}

pub struct Guard<T: Terminator> {
    config: Config,
    arenas: Arenas,
    sampler: MemoryPressureSampler,
    terminator: T,
}

impl<T: Terminator> Guard<T> {
    /// Validates `config` and allocates both arena regions. No further
    /// region memory is requested after this returns.
    pub fn new(config: Config, terminator: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let arenas = Arenas::new(config.outer_arena_bytes, config.inner_arena_bytes);
        let sampler = MemoryPressureSampler::new(&config.meminfo_path, config.meminfo_offset);
        Ok(Self {
            config,
            arenas,
            sampler,
            terminator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arenas(&self) -> &Arenas {
        &self.arenas
    }

    pub fn terminator(&self) -> &T {
        &self.terminator
    }

    /// Pins the arena regions and the rest of the current address space.
    pub fn pin_memory(&self) -> Result<(), PinError> {
        self.arenas.pin()
    }

    /// Runs one polling cycle and returns how long to sleep afterwards.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut cycle = self.arenas.begin_cycle();
        let mut sleep = self.config.idle_interval();

        let available_mb = self.sampler.sample(cycle.arena());
        let scan = if is_low_memory(available_mb, self.config.low_memory_mb) {
            warn!(
                "Low memory: {} MB available (threshold {} MB)",
                available_mb, self.config.low_memory_mb
            );
            let outcome = ProcessScanner::new(&self.config).scan(&mut cycle, &mut self.terminator);
            sleep = self.config.pressure_interval();
            Some(outcome)
        } else {
            trace!(available_mb, "Memory OK");
            None
        };
        drop(cycle);

        if scan.is_some() {
            debug!(
                outer_peak = self.arenas.outer().peak(),
                inner_peak = self.arenas.inner().peak(),
                "Arena high-water marks"
            );
        }

        CycleReport {
            available_mb,
            scan,
            sleep,
        }
    }

    /// Polls forever. The sleep is the loop's only suspension point.
    pub fn run(&mut self) -> ! {
        loop {
            let report = self.run_cycle();
            thread::sleep(report.sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_low_memory_is_strict() {
        assert!(is_low_memory(0, 750));
        assert!(is_low_memory(749, 750));
        assert!(!is_low_memory(750, 750));
        assert!(!is_low_memory(751, 750));
        assert!(!is_low_memory(u32::MAX, 750));
    }

    #[test]
    fn test_is_low_memory_is_monotonic() {
        let threshold = 750;
        let mut seen_high = false;
        for sample in 0..2000 {
            let low = is_low_memory(sample, threshold);
            // Once a sample is not low, no larger sample may be low again.
            assert!(!(seen_high && low), "sample {sample}");
            seen_high |= !low;
        }
    }

    #[test]
    fn test_guard_rejects_invalid_config() {
        struct Never;
        impl Terminator for Never {
            fn terminate(&mut self, pid: u32) {
                panic!("unexpected termination of {pid}");
            }
        }

        let mut cfg = Config::default();
        cfg.hard_kill_score = 0;
        assert!(Guard::new(cfg, Never).is_err());
    }
}
