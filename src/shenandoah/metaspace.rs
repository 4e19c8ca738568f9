//! Collaborators consulted when metadata space runs out.

use std::{fmt, ptr::NonNull};

use super::{cycle::GcCause, heuristics::ShenandoahHeuristics};

/// Start of a metadata block handed out by the metaspace.
pub type MetaWord = NonNull<u8>;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetadataType {
    Class,
    NonClass,
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Class => "class",
            Self::NonClass => "non-class",
        })
    }
}

/// Metaspace of one class loader.
pub trait MetaspaceAllocator {
    fn allocate(&self, size_words: usize, mdtype: MetadataType) -> Option<MetaWord>;
    /// Grows the metaspace capacity, then allocates.
    fn expand_and_allocate(&self, size_words: usize, mdtype: MetadataType) -> Option<MetaWord>;
}

/// The heap as seen by the collector policy.
pub trait CollectorHeap {
    fn heuristics(&self) -> &dyn ShenandoahHeuristics;
    /// Runs a stop-the-world collection for `cause` and returns when it is done.
    fn collect(&self, cause: GcCause);
}
