use std::{any::Any, panic};

use parking_lot::Mutex;

use crate::{
    error::{VisitError, VisitResult},
    Config,
};

/// Work executed by every worker of a gang during one parallel phase.
pub trait GangTask: Sync {
    fn name(&self) -> &str;
    fn work(&self, worker_id: usize) -> VisitResult;
}

/// Fixed-size set of GC workers. Every call to [`ShenandoahWorkGang::run_task`] spawns
/// scoped threads that may borrow from the caller's stack and joins them before
/// returning.
pub struct ShenandoahWorkGang {
    name: String,
    active_workers: usize,
}

impl ShenandoahWorkGang {
    pub fn new(name: impl Into<String>, n_workers: usize) -> Self {
        crate::guarantee!(n_workers > 0, "work gang needs at least one worker");
        Self {
            name: name.into(),
            active_workers: n_workers,
        }
    }

    /// Gang sized by [`Config::parallel_gc_threads`].
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self::new(name, config.parallel_gc_threads)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers
    }

    /// Runs `task` on all workers and waits for them.
    ///
    /// Returns the first error any worker reported. A panic in a worker is re-raised
    /// on the calling thread once every worker has stopped.
    pub fn run_task(&self, task: &dyn GangTask) -> VisitResult {
        log::debug!(
            "{}: running {} with {} workers",
            self.name,
            task.name(),
            self.active_workers
        );
        let first_error: Mutex<Option<VisitError>> = Mutex::new(None);
        let result = crossbeam_utils::thread::scope(|scope| {
            for worker_id in 0..self.active_workers {
                let first_error = &first_error;
                scope.spawn(move |_| {
                    if let Err(error) = task.work(worker_id) {
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(error);
                        }
                    }
                });
            }
        });

        if let Err(payload) = result {
            let payload = match payload.downcast::<Vec<Box<dyn Any + Send + 'static>>>() {
                Ok(panics) => (*panics).into_iter().next().unwrap_or_else(|| {
                    Box::new("work gang worker panicked") as Box<dyn Any + Send>
                }),
                Err(payload) => payload,
            };
            panic::resume_unwind(payload);
        }

        match first_error.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
