use std::fmt;

use enum_map::EnumMap;

use crate::shenandoah::cycle::DegenPoint;

/// Snapshot of the collector policy counters. See
/// [`ShenandoahCollectorPolicy::stats`](crate::shenandoah::collector_policy::ShenandoahCollectorPolicy::stats).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcStats {
    pub success_concurrent: usize,
    pub success_degenerated: usize,
    pub success_full: usize,
    pub alloc_failure_degenerated: usize,
    pub alloc_failure_full: usize,
    pub degenerated_upgrade_to_full: usize,
    pub explicit_concurrent: usize,
    pub explicit_full: usize,
    pub implicit_concurrent: usize,
    pub implicit_full: usize,
    pub degen_points: EnumMap<DegenPoint, usize>,
    pub cycles: usize,
}

impl GcStats {
    /// Full GCs run, including degenerated cycles upgraded to a Full GC.
    pub fn total_full(&self) -> usize {
        self.success_full + self.degenerated_upgrade_to_full
    }

    pub fn degenerations_at(&self, point: DegenPoint) -> usize {
        self.degen_points[point]
    }
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Under allocation pressure, concurrent cycles may cancel, and either continue cycle"
        )?;
        writeln!(
            f,
            "under stop-the-world pause or result in stop-the-world Full GC. Increase heap size,"
        )?;
        writeln!(
            f,
            "tune GC heuristics, set more aggressive pacing delay, or lower allocation rate"
        )?;
        writeln!(f, "to avoid Degenerated and Full GC cycles.")?;
        writeln!(f)?;

        writeln!(f, "{:5} successful concurrent GCs", self.success_concurrent)?;
        writeln!(f, "  {:5} invoked explicitly", self.explicit_concurrent)?;
        writeln!(f, "  {:5} invoked implicitly", self.implicit_concurrent)?;
        writeln!(f)?;

        writeln!(f, "{:5} Degenerated GCs", self.success_degenerated)?;
        writeln!(f, "  {:5} caused by allocation failure", self.alloc_failure_degenerated)?;
        for (point, &count) in self.degen_points.iter() {
            if count > 0 {
                writeln!(f, "    {:5} happened at {}", count, point)?;
            }
        }
        writeln!(f, "  {:5} upgraded to Full GC", self.degenerated_upgrade_to_full)?;
        writeln!(f)?;

        writeln!(f, "{:5} Full GCs", self.total_full())?;
        writeln!(f, "  {:5} invoked explicitly", self.explicit_full)?;
        writeln!(f, "  {:5} invoked implicitly", self.implicit_full)?;
        writeln!(f, "  {:5} caused by allocation failure", self.alloc_failure_full)?;
        writeln!(f, "  {:5} upgraded from Degenerated GC", self.degenerated_upgrade_to_full)?;
        Ok(())
    }
}

pub(crate) struct FormattedSize {
    pub size: usize,
}

impl fmt::Display for FormattedSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ksize = (self.size as f64) / 1024f64;

        if ksize < 1f64 {
            return write!(f, "{}B", self.size);
        }

        let msize = ksize / 1024f64;

        if msize < 1f64 {
            return write!(f, "{:.1}K", ksize);
        }

        let gsize = msize / 1024f64;

        if gsize < 1f64 {
            write!(f, "{:.1}M", msize)
        } else {
            write!(f, "{:.1}G", gsize)
        }
    }
}

pub(crate) fn formatted_size(size: usize) -> FormattedSize {
    FormattedSize { size }
}
