use std::{
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

use crossbeam_utils::CachePadded;
use enum_map::Enum;

use crate::globals::MAX_SUB_TASKS;

const UNCLAIMED: usize = 0;

/// Claim table for a fixed set of subtasks shared by `n_threads` workers.
///
/// Each worker walks the whole task list and tries to claim every task; a single CAS
/// decides the winner, so each task of a round runs on exactly one worker. After its
/// last claim every worker calls [`SubTasksDone::all_tasks_completed`] with the tasks
/// the round had to cover. The last one to arrive checks that all of them were claimed
/// and resets the table so it can be reused for the next round.
pub struct SubTasksDone<T: Enum> {
    /// `0` when unclaimed, otherwise `worker_id + 1` of the claimer.
    tasks: Box<[CachePadded<AtomicUsize>]>,
    n_threads: usize,
    threads_completed: CachePadded<AtomicUsize>,
    marker: PhantomData<fn(T)>,
}

impl<T: Enum + Copy> SubTasksDone<T> {
    pub fn new(n_threads: usize) -> Self {
        crate::guarantee!(n_threads > 0, "subtask table needs at least one worker");
        crate::guarantee!(
            T::LENGTH <= MAX_SUB_TASKS,
            "too many subtasks: {} > {}",
            T::LENGTH,
            MAX_SUB_TASKS
        );
        let tasks = (0..T::LENGTH)
            .map(|_| CachePadded::new(AtomicUsize::new(UNCLAIMED)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            tasks,
            n_threads,
            threads_completed: CachePadded::new(AtomicUsize::new(0)),
            marker: PhantomData,
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Returns `true` if `worker_id` won `task`. Losing to another worker is normal;
    /// finding a task already claimed by `worker_id` itself is a fatal error.
    pub fn try_claim_task(&self, task: T, worker_id: usize) -> bool {
        let slot = &self.tasks[task.into_usize()];
        if slot.load(Ordering::Relaxed) != UNCLAIMED {
            let owner = slot.load(Ordering::Acquire);
            crate::guarantee!(
                owner != worker_id + 1,
                "worker {} claimed subtask {} twice",
                worker_id,
                task.into_usize()
            );
            return false;
        }
        match slot.compare_exchange(
            UNCLAIMED,
            worker_id + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(owner) => {
                crate::guarantee!(
                    owner != worker_id + 1,
                    "worker {} claimed subtask {} twice",
                    worker_id,
                    task.into_usize()
                );
                false
            }
        }
    }

    /// Worker that claimed `task` this round, if any.
    pub fn claimed_by(&self, task: T) -> Option<usize> {
        match self.tasks[task.into_usize()].load(Ordering::Acquire) {
            UNCLAIMED => None,
            owner => Some(owner - 1),
        }
    }

    pub fn claimed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|slot| slot.load(Ordering::Acquire) != UNCLAIMED)
            .count()
    }

    /// Signals that `worker_id` is done claiming for this round. Returns `true` for the
    /// last of the `n_threads` workers, after checking that every task in `required`
    /// was claimed and resetting the table.
    pub fn all_tasks_completed(&self, worker_id: usize, required: &[T]) -> bool {
        let completed = self.threads_completed.fetch_add(1, Ordering::AcqRel) + 1;
        crate::guarantee!(
            completed <= self.n_threads,
            "worker {} completed a round that already had all {} workers",
            worker_id,
            self.n_threads
        );
        if completed < self.n_threads {
            return false;
        }

        let mut claimed = 0usize;
        for (index, slot) in self.tasks.iter().enumerate() {
            if slot.load(Ordering::Acquire) != UNCLAIMED {
                claimed |= 1 << index;
            }
        }
        let required = required
            .iter()
            .fold(0usize, |mask, task| mask | (1 << task.into_usize()));
        let skipped = required & !claimed;
        crate::guarantee!(
            skipped == 0,
            "subtasks not claimed in this round: {:#b}",
            skipped
        );

        for slot in self.tasks.iter() {
            slot.store(UNCLAIMED, Ordering::Release);
        }
        self.threads_completed.store(0, Ordering::Release);
        true
    }
}
