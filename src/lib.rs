//! # comet-shenandoah
//!
//! Cycle bookkeeping and parallel root processing for a Shenandoah-style concurrent
//! collector. The crate does not own a heap: the surrounding runtime drives cycles and
//! hands in its root tables, and this crate decides how a cycle escalates, keeps the
//! cumulative statistics and divides root scanning among GC workers.
//!
//! # Layout
//! - [Collector policy](shenandoah::collector_policy): cycle counters, degeneration
//!   table, shutdown flag and metadata allocation recovery.
//! - [Cycles](shenandoah::cycle): per-cycle state machine
//!   (concurrent -> degenerated -> full).
//! - [Root processing](shenandoah::root_processor): strong, all, update-all and
//!   evacuation root scans claimed exactly once per phase.
//! - [Work gang](shenandoah::workgroup) and [phase timings](shenandoah::phase_timings)
//!   to run and account those phases.

use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

macro_rules! logln_if {
    ($cond: expr, $($t:tt)*) => {
        if $cond {
            log::info!($($t)*);
        }
    };
}

/// Checks a calling-protocol invariant. A failed guarantee is a bug in the caller, so
/// it is reported with a backtrace and the current thread panics.
#[macro_export]
macro_rules! guarantee {
    ($cond: expr, $($t:tt)*) => {
        if !$cond {
            $crate::error::report_fatal(format_args!($($t)*));
        }
    };
}

pub mod error;
pub mod globals;
pub mod shenandoah;
pub mod statistics;
pub mod visitor;

#[cfg(test)]
mod tests;

/// Configuration shared by the policy, heuristics and work gang.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of GC worker threads used for parallel phases.
    pub parallel_gc_threads: usize,
    /// Enables verbose cycle logging
    pub verbose: bool,
    /// Allow class unloading; metadata OOM is only reported to heuristics when set.
    pub class_unloading: bool,
    /// Run explicitly requested GCs as concurrent cycles instead of full STW collections.
    pub explicit_gc_invokes_concurrent: bool,
    /// Heuristics start a cycle when no cycle has finished for this long.
    pub guaranteed_gc_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel_gc_threads: globals::default_parallel_gc_threads(),
            verbose: false,
            class_unloading: true,
            explicit_gc_invokes_concurrent: false,
            guaranteed_gc_interval: globals::GUARANTEED_GC_INTERVAL,
        }
    }
}

/// Seconds elapsed since the GC clock was first read. All cycle timestamps use this clock.
pub fn elapsed_secs() -> f64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}
