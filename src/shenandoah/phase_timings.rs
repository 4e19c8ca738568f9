use std::{
    fmt,
    time::{Duration, Instant},
};

use atomic::{Atomic, Ordering};
use enum_map::{Enum, EnumMap};
use parking_lot::Mutex;

/// GC phases that run a parallel root scan.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Phase {
    InitMarkRoots,
    ScanRoots,
    FinalMarkRoots,
    InitEvacRoots,
    UpdateRoots,
    FinalUpdateRefsRoots,
    DegenGcRoots,
    FullGcRoots,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitMarkRoots => "Pause Init Mark (Scan Roots)",
            Self::ScanRoots => "Concurrent Scan Roots",
            Self::FinalMarkRoots => "Pause Final Mark (Scan Roots)",
            Self::InitEvacRoots => "Pause Init Evac (Evacuate Roots)",
            Self::UpdateRoots => "Pause Final Mark (Update Roots)",
            Self::FinalUpdateRefsRoots => "Pause Final Update Refs (Update Roots)",
            Self::DegenGcRoots => "Pause Degenerated GC (Roots)",
            Self::FullGcRoots => "Pause Full GC (Roots)",
        }
    }
}

/// Root category timed per worker inside a phase.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ParPhase {
    ThreadRoots,
    CodeCacheRoots,
    UniverseRoots,
    JniRoots,
    JniWeakRoots,
    FlatProfilerRoots,
    ManagementRoots,
    SystemDictionaryRoots,
    CldgRoots,
    JvmtiRoots,
    SynchronizerRoots,
    CsetCodeRoots,
}

impl ParPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreadRoots => "Thread Roots",
            Self::CodeCacheRoots => "Code Cache Roots",
            Self::UniverseRoots => "Universe Roots",
            Self::JniRoots => "JNI Handles Roots",
            Self::JniWeakRoots => "JNI Weak Roots",
            Self::FlatProfilerRoots => "Flat Profiler Roots",
            Self::ManagementRoots => "Management Roots",
            Self::SystemDictionaryRoots => "System Dict Roots",
            Self::CldgRoots => "CLDG Roots",
            Self::JvmtiRoots => "JVMTI Roots",
            Self::SynchronizerRoots => "Synchronizer Roots",
            Self::CsetCodeRoots => "CSet Code Roots",
        }
    }
}

/// Receiver of phase and per-worker timings.
pub trait PhaseTimer: Sync {
    fn record_phase_time(&self, phase: Phase, elapsed: Duration);
    fn record_worker_time(
        &self,
        phase: Phase,
        par_phase: ParPhase,
        worker_id: usize,
        elapsed: Duration,
    );
}

/// Records the time a worker spends in one root category when dropped.
pub struct WorkerTimingsTracker<'a> {
    timer: &'a dyn PhaseTimer,
    phase: Phase,
    par_phase: ParPhase,
    worker_id: usize,
    start: Instant,
}

impl<'a> WorkerTimingsTracker<'a> {
    pub fn new(
        timer: &'a dyn PhaseTimer,
        phase: Phase,
        par_phase: ParPhase,
        worker_id: usize,
    ) -> Self {
        Self {
            timer,
            phase,
            par_phase,
            worker_id,
            start: Instant::now(),
        }
    }
}

impl Drop for WorkerTimingsTracker<'_> {
    fn drop(&mut self) {
        self.timer.record_worker_time(
            self.phase,
            self.par_phase,
            self.worker_id,
            self.start.elapsed(),
        );
    }
}

struct PhaseTime {
    nanos: Atomic<u64>,
    count: Atomic<usize>,
}

impl PhaseTime {
    fn new() -> Self {
        Self {
            nanos: Atomic::new(0),
            count: Atomic::new(0),
        }
    }
}

/// Per-worker accumulated nanoseconds, grown on demand.
#[derive(Default)]
struct WorkerTimes(Mutex<Vec<u64>>);

impl WorkerTimes {
    fn add(&self, worker_id: usize, nanos: u64) {
        let mut times = self.0.lock();
        if times.len() <= worker_id {
            times.resize(worker_id + 1, 0);
        }
        times[worker_id] += nanos;
    }

    fn snapshot(&self) -> Vec<u64> {
        self.0.lock().clone()
    }
}

/// In-process [`PhaseTimer`] accumulating totals across cycles.
pub struct ShenandoahPhaseTimings {
    phases: EnumMap<Phase, PhaseTime>,
    workers: EnumMap<Phase, EnumMap<ParPhase, WorkerTimes>>,
}

impl ShenandoahPhaseTimings {
    pub fn new() -> Self {
        Self {
            phases: EnumMap::from_fn(|_| PhaseTime::new()),
            workers: EnumMap::from_fn(|_| EnumMap::from_fn(|_| WorkerTimes::default())),
        }
    }

    /// Total wall time recorded for `phase` and how many times it ran.
    pub fn phase_time(&self, phase: Phase) -> (Duration, usize) {
        let p = &self.phases[phase];
        (
            Duration::from_nanos(p.nanos.load(Ordering::Relaxed)),
            p.count.load(Ordering::Relaxed),
        )
    }

    /// Time `worker_id` spent in `par_phase` during `phase`.
    pub fn worker_time(&self, phase: Phase, par_phase: ParPhase, worker_id: usize) -> Duration {
        let times = self.workers[phase][par_phase].snapshot();
        Duration::from_nanos(times.get(worker_id).copied().unwrap_or(0))
    }
}

impl Default for ShenandoahPhaseTimings {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer for ShenandoahPhaseTimings {
    fn record_phase_time(&self, phase: Phase, elapsed: Duration) {
        let p = &self.phases[phase];
        p.nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        p.count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_worker_time(
        &self,
        phase: Phase,
        par_phase: ParPhase,
        worker_id: usize,
        elapsed: Duration,
    ) {
        self.workers[phase][par_phase].add(worker_id, elapsed.as_nanos() as u64);
    }
}

impl fmt::Display for ShenandoahPhaseTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GC phase timings (ms):")?;
        for (phase, time) in self.phases.iter() {
            let count = time.count.load(Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            let total = time.nanos.load(Ordering::Relaxed) as f64 / 1e6;
            writeln!(
                f,
                "  {:<42} {:>10.3} total, {:>10.3} avg ({} times)",
                phase.as_str(),
                total,
                total / count as f64,
                count
            )?;
            for (par_phase, workers) in self.workers[phase].iter() {
                let times = workers.snapshot();
                if times.iter().all(|&t| t == 0) {
                    continue;
                }
                let min = times.iter().copied().min().unwrap_or(0) as f64 / 1e6;
                let max = times.iter().copied().max().unwrap_or(0) as f64 / 1e6;
                let sum: u64 = times.iter().sum();
                writeln!(
                    f,
                    "    {:<40} min {:.3}, avg {:.3}, max {:.3} ({} workers)",
                    par_phase.as_str(),
                    min,
                    sum as f64 / 1e6 / times.len() as f64,
                    max,
                    times.len()
                )?;
            }
        }
        Ok(())
    }
}
