use std::fmt;

use crate::shenandoah::metaspace::MetadataType;

/// Error raised by a root visitor. Scanning never inspects it, it is handed back to the
/// caller of the scan as-is.
pub type VisitError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type VisitResult = Result<(), VisitError>;

#[derive(Debug, thiserror::Error)]
pub enum ShenandoahError {
    /// Expansion, a full GC and both retries failed to find metadata space.
    #[error("Metaspace exhausted: failed to allocate {size_words} words of {mdtype} metadata")]
    MetaspaceExhausted {
        size_words: usize,
        mdtype: MetadataType,
    },
}

/// Reports a broken invariant and unwinds the current thread.
/// Used through [`guarantee!`](crate::guarantee).
#[cold]
#[inline(never)]
pub fn report_fatal(args: fmt::Arguments<'_>) -> ! {
    let trace = backtrace::Backtrace::new();
    log::error!("guarantee failed: {}\n{:?}", args, trace);
    panic!("guarantee failed: {}", args);
}
