use std::time::Duration;

pub const GUARANTEED_GC_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Claim slots are tracked in a `usize` bitmask, so a task enumeration can't be larger.
pub const MAX_SUB_TASKS: usize = usize::BITS as usize;
/// GC time penalties are kept in `0..=MAX_GC_TIME_PENALTY`.
pub const MAX_GC_TIME_PENALTY: isize = 100;
/// Bytes in a metadata word; metaspace sizes are requested in words.
pub const BYTES_PER_META_WORD: usize = std::mem::size_of::<usize>();

pub fn default_parallel_gc_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
