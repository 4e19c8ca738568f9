use std::time::Duration;

use atomic::{Atomic, Ordering};

use super::shared_variables::SharedFlag;
use crate::{elapsed_secs, globals::MAX_GC_TIME_PENALTY, Config};

/// recover from penalties
pub const CONCURRENT_ADJUST: isize = -1;
/// how much to penalize average GC duration history on Degenerated GC
pub const DEGENERATE_PENALTY: isize = 10;
/// how much to penalize average GC duration history on Full GC
pub const FULL_PENALTY: isize = 20;

/// Bookkeeping every heuristics keeps about past cycles.
pub struct HeuristicsState {
    degenerated_cycles_in_a_row: Atomic<usize>,
    successful_cycles_in_a_row: Atomic<usize>,
    cycle_start: Atomic<f64>,
    last_cycle_end: Atomic<f64>,
    gc_times_learned: Atomic<usize>,
    gc_time_penalties: Atomic<isize>,
    metaspace_oom: SharedFlag,
    class_unloading: bool,
    guaranteed_interval: Duration,
}

impl HeuristicsState {
    pub fn new(config: &Config) -> Self {
        let now = elapsed_secs();
        Self {
            degenerated_cycles_in_a_row: Atomic::new(0),
            successful_cycles_in_a_row: Atomic::new(0),
            cycle_start: Atomic::new(now),
            last_cycle_end: Atomic::new(now),
            gc_times_learned: Atomic::new(0),
            gc_time_penalties: Atomic::new(0),
            metaspace_oom: SharedFlag::new(),
            class_unloading: config.class_unloading,
            guaranteed_interval: config.guaranteed_gc_interval,
        }
    }

    fn adjust_penalty(&self, step: isize) {
        let mut current = self.gc_time_penalties.load(Ordering::Acquire);
        loop {
            let new = (current + step).clamp(0, MAX_GC_TIME_PENALTY);
            match self.gc_time_penalties.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn record_cycle_end(&self) {
        self.last_cycle_end.store(elapsed_secs(), Ordering::Release);
    }
}

/// Decides when cycles start and learns from how they end.
///
/// The collector policy consults it on metadata OOM; the cycle state machine reports
/// every finished cycle.
pub trait ShenandoahHeuristics: Send + Sync {
    fn name(&self) -> &'static str;
    fn state(&self) -> &HeuristicsState;

    fn can_unload_classes(&self) -> bool {
        self.state().class_unloading
    }

    fn degenerated_cycles_in_a_row(&self) -> usize {
        self.state().degenerated_cycles_in_a_row.load(Ordering::Relaxed)
    }

    fn successful_cycles_in_a_row(&self) -> usize {
        self.state().successful_cycles_in_a_row.load(Ordering::Relaxed)
    }

    fn cycle_start(&self) -> f64 {
        self.state().cycle_start.load(Ordering::Acquire)
    }

    fn last_cycle_end(&self) -> f64 {
        self.state().last_cycle_end.load(Ordering::Acquire)
    }

    fn gc_times_learned(&self) -> usize {
        self.state().gc_times_learned.load(Ordering::Relaxed)
    }

    fn gc_time_penalties(&self) -> isize {
        self.state().gc_time_penalties.load(Ordering::Acquire)
    }

    fn time_since_last_gc(&self) -> f64 {
        elapsed_secs() - self.last_cycle_end()
    }

    fn record_cycle_start(&self) {
        let state = self.state();
        state.cycle_start.store(elapsed_secs(), Ordering::Release);
        if self.can_unload_classes() {
            // this cycle unloads classes, pending metaspace pressure is handled by it
            state.metaspace_oom.unset();
        }
    }

    fn record_success_concurrent(&self) {
        let state = self.state();
        state.degenerated_cycles_in_a_row.store(0, Ordering::Relaxed);
        state.successful_cycles_in_a_row.fetch_add(1, Ordering::Relaxed);
        state.gc_times_learned.fetch_add(1, Ordering::Relaxed);
        state.adjust_penalty(CONCURRENT_ADJUST);
        state.record_cycle_end();
    }

    fn record_success_degenerated(&self) {
        let state = self.state();
        state.degenerated_cycles_in_a_row.fetch_add(1, Ordering::Relaxed);
        state.successful_cycles_in_a_row.store(0, Ordering::Relaxed);
        state.adjust_penalty(DEGENERATE_PENALTY);
        state.record_cycle_end();
    }

    fn record_success_full(&self) {
        let state = self.state();
        state.degenerated_cycles_in_a_row.store(0, Ordering::Relaxed);
        state.successful_cycles_in_a_row.store(0, Ordering::Relaxed);
        state.adjust_penalty(FULL_PENALTY);
        state.record_cycle_end();
    }

    fn record_metaspace_oom(&self) {
        self.state().metaspace_oom.set();
    }

    fn has_metaspace_oom(&self) -> bool {
        self.state().metaspace_oom.is_set()
    }

    /// Default trigger: pending metaspace OOM that class unloading can relieve, or no
    /// cycle for longer than the guaranteed interval.
    fn should_start_gc(&self) -> bool {
        if self.has_metaspace_oom() && self.can_unload_classes() {
            log::info!("Trigger ({}): metadata space is exhausted", self.name());
            return true;
        }
        let interval = self.state().guaranteed_interval.as_secs_f64();
        let since_last = self.time_since_last_gc();
        if since_last > interval {
            log::info!(
                "Trigger ({}): time since last GC ({:.0} ms) is larger than guaranteed interval ({:.0} ms)",
                self.name(),
                since_last * 1000.0,
                interval * 1000.0
            );
            return true;
        }
        false
    }
}

/// Starts cycles only on the default triggers. Heap occupancy is owned by the runtime
/// and is expected to request cycles itself.
pub struct StaticHeuristics {
    state: HeuristicsState,
}

impl StaticHeuristics {
    pub fn new(config: &Config) -> Self {
        Self {
            state: HeuristicsState::new(config),
        }
    }
}

impl ShenandoahHeuristics for StaticHeuristics {
    fn name(&self) -> &'static str {
        "static"
    }

    fn state(&self) -> &HeuristicsState {
        &self.state
    }
}

/// Starts a cycle whenever asked and unloads classes every cycle. Stress testing only.
pub struct AggressiveHeuristics {
    state: HeuristicsState,
}

impl AggressiveHeuristics {
    pub fn new(config: &Config) -> Self {
        Self {
            state: HeuristicsState::new(config),
        }
    }
}

impl ShenandoahHeuristics for AggressiveHeuristics {
    fn name(&self) -> &'static str {
        "aggressive"
    }

    fn state(&self) -> &HeuristicsState {
        &self.state
    }

    fn can_unload_classes(&self) -> bool {
        true
    }

    fn should_start_gc(&self) -> bool {
        true
    }
}
