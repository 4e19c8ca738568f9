use std::fmt;

use atomic::{Atomic, Ordering};
use enum_map::EnumMap;

use super::{
    cycle::{DegenPoint, GcCause},
    heuristics::ShenandoahHeuristics,
    metaspace::{CollectorHeap, MetaWord, MetadataType, MetaspaceAllocator},
    shared_variables::SharedFlag,
};
use crate::{
    error::ShenandoahError,
    globals::BYTES_PER_META_WORD,
    statistics::{formatted_size, GcStats},
};

/// Cumulative outcome counters for every GC cycle of one heap.
///
/// All recording operations are single relaxed increments: they are issued by the
/// thread driving the cycle while any thread may read them. Derived totals (e.g. the
/// number of full GCs, which includes degenerated cycles upgraded to full) are summed
/// when read and never stored.
pub struct ShenandoahCollectorPolicy {
    success_concurrent_gcs: Atomic<usize>,
    success_degenerated_gcs: Atomic<usize>,
    success_full_gcs: Atomic<usize>,
    alloc_failure_degenerated: Atomic<usize>,
    alloc_failure_full: Atomic<usize>,
    alloc_failure_degenerated_upgrade_to_full: Atomic<usize>,
    explicit_concurrent: Atomic<usize>,
    explicit_full: Atomic<usize>,
    implicit_concurrent: Atomic<usize>,
    implicit_full: Atomic<usize>,
    degen_points: EnumMap<DegenPoint, Atomic<usize>>,

    cycle_counter: Atomic<usize>,
    in_shutdown: SharedFlag,
}

impl ShenandoahCollectorPolicy {
    pub fn new() -> Self {
        Self {
            success_concurrent_gcs: Atomic::new(0),
            success_degenerated_gcs: Atomic::new(0),
            success_full_gcs: Atomic::new(0),
            alloc_failure_degenerated: Atomic::new(0),
            alloc_failure_full: Atomic::new(0),
            alloc_failure_degenerated_upgrade_to_full: Atomic::new(0),
            explicit_concurrent: Atomic::new(0),
            explicit_full: Atomic::new(0),
            implicit_concurrent: Atomic::new(0),
            implicit_full: Atomic::new(0),
            degen_points: EnumMap::from_fn(|_| Atomic::new(0)),
            cycle_counter: Atomic::new(0),
            in_shutdown: SharedFlag::new(),
        }
    }

    #[inline]
    fn bump(counter: &Atomic<usize>) -> usize {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_explicit_to_concurrent(&self) {
        let n = Self::bump(&self.explicit_concurrent);
        log::debug!("explicit GC request runs concurrently ({} so far)", n);
    }

    pub fn record_explicit_to_full(&self) {
        let n = Self::bump(&self.explicit_full);
        log::debug!("explicit GC request runs as Full GC ({} so far)", n);
    }

    pub fn record_implicit_to_concurrent(&self) {
        let n = Self::bump(&self.implicit_concurrent);
        log::debug!("implicit GC request runs concurrently ({} so far)", n);
    }

    pub fn record_implicit_to_full(&self) {
        let n = Self::bump(&self.implicit_full);
        log::debug!("implicit GC request runs as Full GC ({} so far)", n);
    }

    pub fn record_alloc_failure_to_full(&self) {
        let n = Self::bump(&self.alloc_failure_full);
        log::info!("allocation failure, cancelling to Full GC ({} so far)", n);
    }

    /// Records that a concurrent cycle degenerated at `point`.
    ///
    /// # Panics
    ///
    /// `point` must name a real phase; [`DegenPoint::Unset`] is a protocol violation.
    pub fn record_alloc_failure_to_degenerated(&self, point: DegenPoint) {
        crate::guarantee!(
            point != DegenPoint::Unset,
            "degeneration point must be set before degenerating"
        );
        Self::bump(&self.alloc_failure_degenerated);
        let n = Self::bump(&self.degen_points[point]);
        log::info!(
            "allocation failure, degenerating at {} ({} so far at this point)",
            point,
            n
        );
    }

    pub fn record_degenerated_upgrade_to_full(&self) {
        let n = Self::bump(&self.alloc_failure_degenerated_upgrade_to_full);
        log::info!("Degenerated GC made no progress, upgrading to Full GC ({} so far)", n);
    }

    pub fn record_success_concurrent(&self) {
        Self::bump(&self.success_concurrent_gcs);
    }

    pub fn record_success_degenerated(&self) {
        Self::bump(&self.success_degenerated_gcs);
    }

    pub fn record_success_full(&self) {
        Self::bump(&self.success_full_gcs);
    }

    /// Generation stamp of the current cycle. Never decreases.
    pub fn cycle_counter(&self) -> usize {
        self.cycle_counter.load(Ordering::Acquire)
    }

    /// Advances the generation stamp. Must precede every other recording for the cycle.
    pub fn record_cycle_start(&self) -> usize {
        self.cycle_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_shutdown(&self) {
        if self.in_shutdown.try_set() {
            log::info!("GC policy observed shutdown after {} cycles", self.cycle_counter());
        }
    }

    pub fn is_at_shutdown(&self) -> bool {
        self.in_shutdown.is_set()
    }

    /// Point-in-time copy of all counters.
    pub fn stats(&self) -> GcStats {
        let load = |c: &Atomic<usize>| c.load(Ordering::Relaxed);
        GcStats {
            success_concurrent: load(&self.success_concurrent_gcs),
            success_degenerated: load(&self.success_degenerated_gcs),
            success_full: load(&self.success_full_gcs),
            alloc_failure_degenerated: load(&self.alloc_failure_degenerated),
            alloc_failure_full: load(&self.alloc_failure_full),
            degenerated_upgrade_to_full: load(&self.alloc_failure_degenerated_upgrade_to_full),
            explicit_concurrent: load(&self.explicit_concurrent),
            explicit_full: load(&self.explicit_full),
            implicit_concurrent: load(&self.implicit_concurrent),
            implicit_full: load(&self.implicit_full),
            degen_points: EnumMap::from_fn(|point| load(&self.degen_points[point])),
            cycles: self.cycle_counter(),
        }
    }

    /// Writes the human readable cycle summary. Reads counters only.
    pub fn print_gc_stats(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{}", self.stats())
    }

    /// Recovers from a failed metadata allocation.
    ///
    /// Tells the heuristics about the OOM when class unloading could help, then tries
    /// expand-and-allocate, a Full GC that clears soft references, a plain retry and one
    /// last expand-and-allocate. The first step that yields memory ends the sequence.
    pub fn satisfy_failed_metadata_allocation(
        &self,
        heap: &dyn CollectorHeap,
        metaspace: &dyn MetaspaceAllocator,
        size_words: usize,
        mdtype: MetadataType,
    ) -> Result<MetaWord, ShenandoahError> {
        let heuristics: &dyn ShenandoahHeuristics = heap.heuristics();
        if heuristics.can_unload_classes() {
            heuristics.record_metaspace_oom();
        }

        if let Some(result) = metaspace.expand_and_allocate(size_words, mdtype) {
            return Ok(result);
        }

        log::info!(
            "{} metadata allocation of {} failed, running Full GC",
            mdtype,
            formatted_size(size_words.saturating_mul(BYTES_PER_META_WORD))
        );
        heap.collect(GcCause::MetadataGcClearSoftRefs);

        if let Some(result) = metaspace.allocate(size_words, mdtype) {
            return Ok(result);
        }

        if let Some(result) = metaspace.expand_and_allocate(size_words, mdtype) {
            return Ok(result);
        }

        log::error!(
            "Metaspace exhausted: {} metadata allocation of {} failed after Full GC",
            mdtype,
            formatted_size(size_words.saturating_mul(BYTES_PER_META_WORD))
        );
        Err(ShenandoahError::MetaspaceExhausted { size_words, mdtype })
    }
}

impl Default for ShenandoahCollectorPolicy {
    fn default() -> Self {
        Self::new()
    }
}
