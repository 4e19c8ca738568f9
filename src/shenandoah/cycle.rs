//! Per-cycle escalation state machine.
//!
//! A cycle starts concurrent (or, for some requests, directly as a full collection) and
//! may only get heavier: `Concurrent -> {Degenerated, Full}`, `Degenerated -> Full`.
//! Every state is its own type and each transition consumes the previous state, so a
//! cycle can't record two successes or step back to a lighter mode. The policy counters
//! are updated by the transitions themselves.

use std::fmt;

use enum_map::Enum;

use super::{collector_policy::ShenandoahCollectorPolicy, heuristics::ShenandoahHeuristics};
use crate::Config;

/// Phase at which a concurrent cycle was forced to finish under a stop-the-world pause.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DegenPoint {
    /// No phase entered yet. Never a valid point to record.
    Unset,
    OutsideCycle,
    InitMark,
    ConcurrentMark,
    FinalMark,
    ConcurrentEvacuation,
    ConcurrentUpdateRefs,
}

impl DegenPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "<UNSET>",
            Self::OutsideCycle => "Outside of Cycle",
            Self::InitMark => "Init Mark",
            Self::ConcurrentMark => "Concurrent Mark",
            Self::FinalMark => "Final Mark",
            Self::ConcurrentEvacuation => "Concurrent Evacuation",
            Self::ConcurrentUpdateRefs => "Concurrent Update Refs",
        }
    }
}

impl fmt::Display for DegenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GcCause {
    /// GC requested by the user or an administrative interface.
    UserRequested,
    /// A mutator allocation could not be satisfied while no cycle was running.
    AllocationFailure,
    /// Heuristics decided to start a concurrent cycle.
    Heuristics,
    /// Metadata space is exhausted; soft references are cleared.
    MetadataGcClearSoftRefs,
}

impl GcCause {
    pub fn is_user_requested(self) -> bool {
        matches!(self, Self::UserRequested)
    }

    /// Causes that can't be served by a concurrent cycle.
    pub fn requires_full(self) -> bool {
        matches!(self, Self::MetadataGcClearSoftRefs)
    }
}

impl fmt::Display for GcCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserRequested => "System.gc()",
            Self::AllocationFailure => "Allocation Failure",
            Self::Heuristics => "Concurrent GC",
            Self::MetadataGcClearSoftRefs => "Metadata GC Clear Soft References",
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CycleMode {
    Concurrent,
    Degenerated,
    Full,
}

/// Which success counter a finished cycle recorded.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CycleOutcome {
    Concurrent,
    Degenerated,
    Full,
    /// Degenerated cycle that had to run a Full GC. Counted as a degenerated success;
    /// the upgrade counter accounts for the full collection.
    DegeneratedUpgradedToFull,
}

struct CycleContext<'a> {
    policy: &'a ShenandoahCollectorPolicy,
    heuristics: &'a dyn ShenandoahHeuristics,
    id: usize,
    cause: GcCause,
    verbose: bool,
}

/// Starts a new cycle for `cause`, or returns `None` once the policy saw shutdown.
///
/// The cycle counter is advanced before anything else is recorded. User requests are
/// counted as explicit, all other causes as implicit. An allocation failure outside of
/// a cycle starts degenerated right away.
pub fn start_cycle<'a>(
    policy: &'a ShenandoahCollectorPolicy,
    heuristics: &'a dyn ShenandoahHeuristics,
    cause: GcCause,
    config: &Config,
) -> Option<GcCycle<'a>> {
    if policy.is_at_shutdown() {
        logln_if!(config.verbose, "GC request ({}) ignored, shutting down", cause);
        return None;
    }
    let id = policy.record_cycle_start();
    heuristics.record_cycle_start();

    let ctx = CycleContext {
        policy,
        heuristics,
        id,
        cause,
        verbose: config.verbose,
    };

    let cycle = if cause == GcCause::AllocationFailure {
        let concurrent = ConcurrentCycle {
            ctx,
            point: DegenPoint::Unset,
        };
        GcCycle::Degenerated(concurrent.degenerate_at(DegenPoint::OutsideCycle))
    } else if cause.is_user_requested() {
        if config.explicit_gc_invokes_concurrent {
            policy.record_explicit_to_concurrent();
            GcCycle::Concurrent(ConcurrentCycle::new(ctx))
        } else {
            policy.record_explicit_to_full();
            GcCycle::Full(FullCycle::new(ctx, false))
        }
    } else if cause.requires_full() {
        policy.record_implicit_to_full();
        GcCycle::Full(FullCycle::new(ctx, false))
    } else {
        policy.record_implicit_to_concurrent();
        GcCycle::Concurrent(ConcurrentCycle::new(ctx))
    };

    logln_if!(
        config.verbose,
        "GC({}) started: {:?} cycle, cause: {}",
        id,
        cycle.mode(),
        cause
    );
    Some(cycle)
}

#[must_use = "a started cycle must be finished or escalated"]
pub struct ConcurrentCycle<'a> {
    ctx: CycleContext<'a>,
    point: DegenPoint,
}

impl<'a> ConcurrentCycle<'a> {
    fn new(ctx: CycleContext<'a>) -> Self {
        Self {
            ctx,
            point: DegenPoint::Unset,
        }
    }

    pub fn cycle_id(&self) -> usize {
        self.ctx.id
    }

    pub fn cause(&self) -> GcCause {
        self.ctx.cause
    }

    /// Point this cycle would degenerate at if an allocation failed now.
    pub fn degen_point(&self) -> DegenPoint {
        self.point
    }

    /// Moves the cycle into the phase named by `point`.
    pub fn enter(&mut self, point: DegenPoint) {
        self.point = point;
    }

    pub fn finish(self) -> CycleOutcome {
        self.ctx.policy.record_success_concurrent();
        self.ctx.heuristics.record_success_concurrent();
        logln_if!(self.ctx.verbose, "GC({}) concurrent cycle finished", self.ctx.id);
        CycleOutcome::Concurrent
    }

    /// Allocation failed mid-cycle: finish under a pause, from the current phase.
    pub fn degenerate(self) -> DegeneratedCycle<'a> {
        let point = self.point;
        self.degenerate_at(point)
    }

    pub fn degenerate_at(self, point: DegenPoint) -> DegeneratedCycle<'a> {
        self.ctx.policy.record_alloc_failure_to_degenerated(point);
        DegeneratedCycle {
            ctx: self.ctx,
            point,
        }
    }

    /// Allocation failed and the cycle is abandoned for a Full GC.
    pub fn fail_to_full(self) -> FullCycle<'a> {
        self.ctx.policy.record_alloc_failure_to_full();
        FullCycle::new(self.ctx, false)
    }
}

#[must_use = "a started cycle must be finished or escalated"]
pub struct DegeneratedCycle<'a> {
    ctx: CycleContext<'a>,
    point: DegenPoint,
}

impl<'a> DegeneratedCycle<'a> {
    pub fn cycle_id(&self) -> usize {
        self.ctx.id
    }

    pub fn cause(&self) -> GcCause {
        self.ctx.cause
    }

    pub fn degen_point(&self) -> DegenPoint {
        self.point
    }

    pub fn finish(self) -> CycleOutcome {
        self.ctx.policy.record_success_degenerated();
        self.ctx.heuristics.record_success_degenerated();
        logln_if!(
            self.ctx.verbose,
            "GC({}) degenerated cycle finished ({})",
            self.ctx.id,
            self.point
        );
        CycleOutcome::Degenerated
    }

    /// Degenerated GC made no progress. This is the last escalation step.
    pub fn upgrade_to_full(self) -> FullCycle<'a> {
        self.ctx.policy.record_degenerated_upgrade_to_full();
        FullCycle::new(self.ctx, true)
    }
}

#[must_use = "a started cycle must be finished"]
pub struct FullCycle<'a> {
    ctx: CycleContext<'a>,
    upgraded: bool,
}

impl<'a> FullCycle<'a> {
    fn new(ctx: CycleContext<'a>, upgraded: bool) -> Self {
        Self { ctx, upgraded }
    }

    pub fn cycle_id(&self) -> usize {
        self.ctx.id
    }

    pub fn cause(&self) -> GcCause {
        self.ctx.cause
    }

    /// `true` when this Full GC came from an upgraded degenerated cycle.
    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    pub fn finish(self) -> CycleOutcome {
        self.ctx.heuristics.record_success_full();
        let outcome = if self.upgraded {
            self.ctx.policy.record_success_degenerated();
            CycleOutcome::DegeneratedUpgradedToFull
        } else {
            self.ctx.policy.record_success_full();
            CycleOutcome::Full
        };
        logln_if!(self.ctx.verbose, "GC({}) full cycle finished", self.ctx.id);
        outcome
    }
}

/// A cycle in any state, for drivers that keep the cycle across calls.
#[must_use = "a started cycle must be finished"]
pub enum GcCycle<'a> {
    Concurrent(ConcurrentCycle<'a>),
    Degenerated(DegeneratedCycle<'a>),
    Full(FullCycle<'a>),
}

impl<'a> GcCycle<'a> {
    pub fn mode(&self) -> CycleMode {
        match self {
            Self::Concurrent(_) => CycleMode::Concurrent,
            Self::Degenerated(_) => CycleMode::Degenerated,
            Self::Full(_) => CycleMode::Full,
        }
    }

    pub fn cycle_id(&self) -> usize {
        match self {
            Self::Concurrent(c) => c.cycle_id(),
            Self::Degenerated(c) => c.cycle_id(),
            Self::Full(c) => c.cycle_id(),
        }
    }

    pub fn cause(&self) -> GcCause {
        match self {
            Self::Concurrent(c) => c.cause(),
            Self::Degenerated(c) => c.cause(),
            Self::Full(c) => c.cause(),
        }
    }

    /// Records entering a concurrent phase. Ignored once the cycle left concurrent mode.
    pub fn enter(&mut self, point: DegenPoint) {
        if let Self::Concurrent(c) = self {
            c.enter(point);
        }
    }

    /// Escalates one step after an allocation failure.
    ///
    /// A concurrent cycle degenerates at its current phase, or goes straight to Full GC
    /// if it has not entered any phase yet. A degenerated cycle is upgraded to Full GC.
    /// A Full GC can't escalate further and is returned unchanged.
    pub fn handle_alloc_failure(self) -> Self {
        match self {
            Self::Concurrent(c) if c.degen_point() == DegenPoint::Unset => {
                Self::Full(c.fail_to_full())
            }
            Self::Concurrent(c) => Self::Degenerated(c.degenerate()),
            Self::Degenerated(c) => Self::Full(c.upgrade_to_full()),
            full @ Self::Full(_) => full,
        }
    }

    pub fn finish(self) -> CycleOutcome {
        match self {
            Self::Concurrent(c) => c.finish(),
            Self::Degenerated(c) => c.finish(),
            Self::Full(c) => c.finish(),
        }
    }
}
