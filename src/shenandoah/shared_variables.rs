use atomic::{Atomic, Ordering};

/// Boolean flag shared between GC and mutator threads.
///
/// Used for one-way switches like shutdown: once [`SharedFlag::set`] is observed it stays
/// set unless the owner explicitly unsets it.
pub struct SharedFlag {
    value: Atomic<bool>,
}

impl SharedFlag {
    pub const fn new() -> Self {
        Self {
            value: Atomic::new(false),
        }
    }

    pub fn set(&self) {
        self.value.store(true, Ordering::Release);
    }

    pub fn unset(&self) {
        self.value.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    /// Sets the flag and returns `true` if this call changed it.
    pub fn try_set(&self) -> bool {
        self.value
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for SharedFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedFlag({})", self.is_set())
    }
}
