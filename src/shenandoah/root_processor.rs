//! Parallel root scanning.
//!
//! A coordinator lives for exactly one parallel phase. Every GC worker of the phase
//! calls one of its `process_*` methods with its own closures; the coordinator makes
//! sure each root category is visited by exactly one worker and hands out thread
//! stacks one at a time. Workers beyond the number of categories simply find nothing
//! left to claim.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use crossbeam_utils::CachePadded;
use enum_map::Enum;

use super::{
    phase_timings::{ParPhase, Phase, PhaseTimer, WorkerTimingsTracker},
    sub_tasks::SubTasksDone,
};
use crate::{
    error::VisitResult,
    visitor::{
        AlwaysTrueClosure, CldClosure, CodeBlobClosure, IsAliveClosure, IsAliveFilter,
        JavaThread, LiveCldFilter, OopClosure, ThreadClosure,
    },
};

/// A table of root slots owned by the runtime (handle blocks, dictionaries, ...).
pub trait RootTable: Sync {
    fn oops_do(&self, cl: &mut dyn OopClosure) -> VisitResult;
}

pub trait ClassLoaderDataGraph: Sync {
    /// Applies `strong` to class loader data that is always alive and `weak` to the
    /// data kept alive only by its holder. A `None` closure skips that group.
    fn roots_cld_do(
        &self,
        strong: Option<&mut dyn CldClosure>,
        weak: Option<&mut dyn CldClosure>,
    ) -> VisitResult;
}

pub trait CodeRootsIterator: Sync {
    fn blobs_do(&self, cl: &mut dyn CodeBlobClosure) -> VisitResult;
}

/// Oops held by monitors.
pub trait SynchronizerIterator: Sync {
    fn oops_do(&self, cl: &mut dyn OopClosure) -> VisitResult;
}

pub trait ThreadList: Sync {
    fn len(&self) -> usize;
    fn thread_at(&self, index: usize) -> JavaThread;
    /// Visits the stack and handle area of `thread`. When `blobs` is given, code blobs
    /// of compiled frames are visited too.
    fn oops_do(
        &self,
        thread: JavaThread,
        oops: &mut dyn OopClosure,
        blobs: Option<&mut dyn CodeBlobClosure>,
    ) -> VisitResult;
}

/// All root enumerators of the runtime.
#[derive(Copy, Clone)]
pub struct RootSet<'a> {
    pub universe: &'a dyn RootTable,
    pub jni_handles: &'a dyn RootTable,
    pub jni_weak_handles: &'a dyn RootTable,
    pub flat_profiler: &'a dyn RootTable,
    pub management: &'a dyn RootTable,
    pub system_dictionary: &'a dyn RootTable,
    pub jvmti: &'a dyn RootTable,
    pub class_loader_data: &'a dyn ClassLoaderDataGraph,
    pub all_code_roots: &'a dyn CodeRootsIterator,
    pub cset_code_roots: &'a dyn CodeRootsIterator,
    pub synchronizers: &'a dyn SynchronizerIterator,
    pub threads: &'a dyn ThreadList,
}

#[derive(Enum, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RootTask {
    Universe,
    JniHandles,
    JniWeakHandles,
    FlatProfiler,
    Management,
    SystemDictionary,
    Jvmti,
    ClassLoaderData,
    CodeCache,
    Synchronizers,
}

impl RootTask {
    /// Tasks claimed when scanning strong roots only.
    pub const STRONG: [RootTask; 8] = [
        RootTask::Universe,
        RootTask::JniHandles,
        RootTask::FlatProfiler,
        RootTask::Management,
        RootTask::SystemDictionary,
        RootTask::Jvmti,
        RootTask::ClassLoaderData,
        RootTask::Synchronizers,
    ];

    pub const ALL: [RootTask; 10] = [
        RootTask::Universe,
        RootTask::JniHandles,
        RootTask::JniWeakHandles,
        RootTask::FlatProfiler,
        RootTask::Management,
        RootTask::SystemDictionary,
        RootTask::Jvmti,
        RootTask::ClassLoaderData,
        RootTask::CodeCache,
        RootTask::Synchronizers,
    ];
}

#[derive(Enum, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EvacuationTask {
    Universe,
    JniHandles,
    JniWeakHandles,
    FlatProfiler,
    Management,
    SystemDictionary,
    Jvmti,
    CsetCodeRoots,
    Synchronizers,
}

impl EvacuationTask {
    pub const ALL: [EvacuationTask; 9] = [
        EvacuationTask::Universe,
        EvacuationTask::JniHandles,
        EvacuationTask::JniWeakHandles,
        EvacuationTask::FlatProfiler,
        EvacuationTask::Management,
        EvacuationTask::SystemDictionary,
        EvacuationTask::Jvmti,
        EvacuationTask::CsetCodeRoots,
        EvacuationTask::Synchronizers,
    ];
}

/// How weak JNI handles and weak class loader data are treated in a scan.
#[derive(Copy, Clone)]
enum WeakRoots<'a> {
    Skip,
    All,
    Live(&'a dyn IsAliveClosure),
}

/// State shared by both coordinators: claim table, thread cursor and timing.
struct ParallelRoots<'a, T: Enum> {
    roots: RootSet<'a>,
    tasks: SubTasksDone<T>,
    thread_cursor: CachePadded<AtomicUsize>,
    phase: Phase,
    timer: &'a dyn PhaseTimer,
    start: Instant,
}

impl<'a, T: Enum + Copy> ParallelRoots<'a, T> {
    fn new(roots: RootSet<'a>, n_workers: usize, phase: Phase, timer: &'a dyn PhaseTimer) -> Self {
        Self {
            roots,
            tasks: SubTasksDone::new(n_workers),
            thread_cursor: CachePadded::new(AtomicUsize::new(0)),
            phase,
            timer,
            start: Instant::now(),
        }
    }

    /// Runs `f` if `worker_id` wins `task`, timing it under `par_phase`.
    fn run_claimed(
        &self,
        task: T,
        par_phase: ParPhase,
        worker_id: usize,
        f: impl FnOnce() -> VisitResult,
    ) -> VisitResult {
        if !self.tasks.try_claim_task(task, worker_id) {
            return Ok(());
        }
        let _timer = WorkerTimingsTracker::new(self.timer, self.phase, par_phase, worker_id);
        f()
    }

    fn tables_do(
        &self,
        tables: &[(T, ParPhase, &dyn RootTable)],
        oops: &mut dyn OopClosure,
        worker_id: usize,
    ) -> VisitResult {
        for &(task, par_phase, table) in tables {
            self.run_claimed(task, par_phase, worker_id, || table.oops_do(&mut *oops))?;
        }
        Ok(())
    }

    fn weak_jni_do(
        &self,
        task: T,
        weak: WeakRoots<'_>,
        oops: &mut dyn OopClosure,
        worker_id: usize,
    ) -> VisitResult {
        let table = self.roots.jni_weak_handles;
        match weak {
            WeakRoots::Skip => Ok(()),
            WeakRoots::All => self.run_claimed(task, ParPhase::JniWeakRoots, worker_id, || {
                table.oops_do(&mut *oops)
            }),
            WeakRoots::Live(is_alive) => {
                self.run_claimed(task, ParPhase::JniWeakRoots, worker_id, || {
                    let mut live = IsAliveFilter::new(is_alive, &mut *oops);
                    table.oops_do(&mut live)
                })
            }
        }
    }

    fn synchronizers_do(
        &self,
        task: T,
        oops: &mut dyn OopClosure,
        worker_id: usize,
    ) -> VisitResult {
        let synchronizers = self.roots.synchronizers;
        self.run_claimed(task, ParPhase::SynchronizerRoots, worker_id, || {
            synchronizers.oops_do(&mut *oops)
        })
    }

    fn claim_thread(&self) -> Option<JavaThread> {
        let threads = self.roots.threads;
        let index = self.thread_cursor.fetch_add(1, Ordering::AcqRel);
        if index < threads.len() {
            Some(threads.thread_at(index))
        } else {
            None
        }
    }

    /// Visits thread stacks until no thread is left unclaimed.
    fn threads_do(
        &self,
        oops: &mut dyn OopClosure,
        mut blobs: Option<&mut dyn CodeBlobClosure>,
        mut thread_cl: Option<&mut dyn ThreadClosure>,
        worker_id: usize,
    ) -> VisitResult {
        let _timer =
            WorkerTimingsTracker::new(self.timer, self.phase, ParPhase::ThreadRoots, worker_id);
        while let Some(thread) = self.claim_thread() {
            if let Some(cl) = thread_cl.as_mut() {
                cl.do_thread(thread)?;
            }
            let blobs = match blobs.as_mut() {
                Some(b) => Some(&mut **b as &mut dyn CodeBlobClosure),
                None => None,
            };
            self.roots.threads.oops_do(thread, &mut *oops, blobs)?;
        }
        Ok(())
    }

    fn complete(&self, worker_id: usize, required: &[T]) {
        if self.tasks.all_tasks_completed(worker_id, required) {
            self.thread_cursor.store(0, Ordering::Release);
        }
    }
}

impl<T: Enum> Drop for ParallelRoots<'_, T> {
    fn drop(&mut self) {
        self.timer.record_phase_time(self.phase, self.start.elapsed());
    }
}

/// Coordinates a strong, full or updating scan of all root categories for one phase.
pub struct ShenandoahRootProcessor<'a> {
    inner: ParallelRoots<'a, RootTask>,
}

impl<'a> ShenandoahRootProcessor<'a> {
    pub fn new(
        roots: RootSet<'a>,
        n_workers: usize,
        phase: Phase,
        timer: &'a dyn PhaseTimer,
    ) -> Self {
        Self {
            inner: ParallelRoots::new(roots, n_workers, phase, timer),
        }
    }

    pub fn n_workers(&self) -> usize {
        self.inner.tasks.n_threads()
    }

    /// Scans strong roots only. Weak JNI handles, weak class loader data and the code
    /// cache are left alone; code blobs are reached through thread frames.
    pub fn process_strong_roots(
        &self,
        oops: &mut dyn OopClosure,
        clds: &mut dyn CldClosure,
        blobs: &mut dyn CodeBlobClosure,
        thread_cl: Option<&mut dyn ThreadClosure>,
        worker_id: usize,
    ) -> VisitResult {
        self.process_java_roots(oops, clds, WeakRoots::Skip, blobs, thread_cl, worker_id)?;
        self.process_vm_roots(oops, WeakRoots::Skip, worker_id)?;
        self.inner.complete(worker_id, &RootTask::STRONG);
        Ok(())
    }

    /// Scans strong and weak roots with the same closures, including the whole code
    /// cache.
    pub fn process_all_roots(
        &self,
        oops: &mut dyn OopClosure,
        clds: &mut dyn CldClosure,
        blobs: &mut dyn CodeBlobClosure,
        thread_cl: Option<&mut dyn ThreadClosure>,
        worker_id: usize,
    ) -> VisitResult {
        self.process_all(oops, clds, blobs, thread_cl, WeakRoots::All, worker_id)
    }

    /// Like [`Self::process_all_roots`], but weak roots go through `is_alive` first.
    /// Weak JNI slots with a dead referent are cleared and never shown to `oops`; weak
    /// class loader data with a dead holder is skipped.
    pub fn update_all_roots<A: IsAliveClosure>(
        &self,
        oops: &mut dyn OopClosure,
        clds: &mut dyn CldClosure,
        blobs: &mut dyn CodeBlobClosure,
        thread_cl: Option<&mut dyn ThreadClosure>,
        is_alive: &A,
        worker_id: usize,
    ) -> VisitResult {
        self.process_all(oops, clds, blobs, thread_cl, WeakRoots::Live(is_alive), worker_id)
    }

    fn process_all(
        &self,
        oops: &mut dyn OopClosure,
        clds: &mut dyn CldClosure,
        blobs: &mut dyn CodeBlobClosure,
        thread_cl: Option<&mut dyn ThreadClosure>,
        weak: WeakRoots<'_>,
        worker_id: usize,
    ) -> VisitResult {
        let code_roots = self.inner.roots.all_code_roots;
        self.inner.run_claimed(RootTask::CodeCache, ParPhase::CodeCacheRoots, worker_id, || {
            code_roots.blobs_do(&mut *blobs)
        })?;
        self.process_java_roots(oops, clds, weak, blobs, thread_cl, worker_id)?;
        self.process_vm_roots(oops, weak, worker_id)?;
        self.inner.complete(worker_id, &RootTask::ALL);
        Ok(())
    }

    fn process_java_roots(
        &self,
        oops: &mut dyn OopClosure,
        clds: &mut dyn CldClosure,
        weak: WeakRoots<'_>,
        blobs: &mut dyn CodeBlobClosure,
        thread_cl: Option<&mut dyn ThreadClosure>,
        worker_id: usize,
    ) -> VisitResult {
        let graph = self.inner.roots.class_loader_data;
        self.inner.run_claimed(RootTask::ClassLoaderData, ParPhase::CldgRoots, worker_id, || {
            let strong: &mut dyn CldClosure = &mut *clds;
            graph.roots_cld_do(Some(strong), None)?;
            match weak {
                WeakRoots::Skip => Ok(()),
                WeakRoots::All => {
                    let weak: &mut dyn CldClosure = &mut *clds;
                    graph.roots_cld_do(None, Some(weak))
                }
                WeakRoots::Live(is_alive) => {
                    let mut live = LiveCldFilter::new(is_alive, &mut *clds);
                    let live: &mut dyn CldClosure = &mut live;
                    graph.roots_cld_do(None, Some(live))
                }
            }
        })?;
        self.inner.threads_do(oops, Some(blobs), thread_cl, worker_id)
    }

    fn process_vm_roots(
        &self,
        oops: &mut dyn OopClosure,
        weak: WeakRoots<'_>,
        worker_id: usize,
    ) -> VisitResult {
        let roots = &self.inner.roots;
        self.inner.tables_do(
            &[
                (RootTask::Universe, ParPhase::UniverseRoots, roots.universe),
                (RootTask::JniHandles, ParPhase::JniRoots, roots.jni_handles),
                (RootTask::FlatProfiler, ParPhase::FlatProfilerRoots, roots.flat_profiler),
                (RootTask::Management, ParPhase::ManagementRoots, roots.management),
                (RootTask::Jvmti, ParPhase::JvmtiRoots, roots.jvmti),
                (
                    RootTask::SystemDictionary,
                    ParPhase::SystemDictionaryRoots,
                    roots.system_dictionary,
                ),
            ],
            oops,
            worker_id,
        )?;
        self.inner.weak_jni_do(RootTask::JniWeakHandles, weak, oops, worker_id)?;
        self.inner.synchronizers_do(RootTask::Synchronizers, oops, worker_id)
    }
}

/// Coordinates evacuation of roots that point into the collection set.
pub struct ShenandoahRootEvacuator<'a> {
    inner: ParallelRoots<'a, EvacuationTask>,
}

impl<'a> ShenandoahRootEvacuator<'a> {
    pub fn new(
        roots: RootSet<'a>,
        n_workers: usize,
        phase: Phase,
        timer: &'a dyn PhaseTimer,
    ) -> Self {
        Self {
            inner: ParallelRoots::new(roots, n_workers, phase, timer),
        }
    }

    pub fn n_workers(&self) -> usize {
        self.inner.tasks.n_threads()
    }

    /// Applies `oops` to thread stacks and every root table, and `blobs` to the code
    /// roots of the collection set only. Null weak JNI slots are not visited.
    pub fn process_evacuate_roots(
        &self,
        oops: &mut dyn OopClosure,
        blobs: &mut dyn CodeBlobClosure,
        worker_id: usize,
    ) -> VisitResult {
        let inner = &self.inner;
        let roots = &inner.roots;

        inner.threads_do(oops, None, None, worker_id)?;
        inner.run_claimed(
            EvacuationTask::CsetCodeRoots,
            ParPhase::CsetCodeRoots,
            worker_id,
            || roots.cset_code_roots.blobs_do(&mut *blobs),
        )?;
        inner.tables_do(
            &[
                (EvacuationTask::Universe, ParPhase::UniverseRoots, roots.universe),
                (EvacuationTask::JniHandles, ParPhase::JniRoots, roots.jni_handles),
                (
                    EvacuationTask::FlatProfiler,
                    ParPhase::FlatProfilerRoots,
                    roots.flat_profiler,
                ),
                (EvacuationTask::Management, ParPhase::ManagementRoots, roots.management),
                (EvacuationTask::Jvmti, ParPhase::JvmtiRoots, roots.jvmti),
                (
                    EvacuationTask::SystemDictionary,
                    ParPhase::SystemDictionaryRoots,
                    roots.system_dictionary,
                ),
            ],
            oops,
            worker_id,
        )?;
        inner.weak_jni_do(
            EvacuationTask::JniWeakHandles,
            WeakRoots::Live(&AlwaysTrueClosure),
            oops,
            worker_id,
        )?;
        inner.synchronizers_do(EvacuationTask::Synchronizers, oops, worker_id)?;
        inner.complete(worker_id, &EvacuationTask::ALL);
        Ok(())
    }
}
