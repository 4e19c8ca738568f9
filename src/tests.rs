use std::{
    cell::Cell,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    error::{ShenandoahError, VisitResult},
    shenandoah::{
        collector_policy::ShenandoahCollectorPolicy,
        cycle::{start_cycle, CycleMode, CycleOutcome, DegenPoint, GcCause, GcCycle},
        heuristics::{AggressiveHeuristics, ShenandoahHeuristics, StaticHeuristics},
        metaspace::{CollectorHeap, MetaWord, MetadataType, MetaspaceAllocator},
        phase_timings::{ParPhase, Phase, ShenandoahPhaseTimings},
        root_processor::{
            ClassLoaderDataGraph, CodeRootsIterator, RootSet, RootTable, ShenandoahRootEvacuator,
            ShenandoahRootProcessor, SynchronizerIterator, ThreadList,
        },
        sub_tasks::SubTasksDone,
        workgroup::{GangTask, ShenandoahWorkGang},
    },
    visitor::{
        CldClosure, ClassLoaderData, CodeBlob, CodeBlobClosure, JavaThread, ObjectReference,
        OopClosure,
    },
    Config,
};

fn oop(addr: usize) -> ObjectReference {
    ObjectReference::from_raw_address(addr)
}

#[derive(Default)]
struct Table {
    slots: Mutex<Vec<ObjectReference>>,
    visits: AtomicUsize,
}

impl Table {
    fn with(slots: &[usize]) -> Self {
        Self {
            slots: Mutex::new(slots.iter().map(|&a| oop(a)).collect()),
            visits: AtomicUsize::new(0),
        }
    }

    fn visits(&self) -> usize {
        self.visits.load(Ordering::Relaxed)
    }
}

impl RootTable for Table {
    fn oops_do(&self, cl: &mut dyn OopClosure) -> VisitResult {
        self.visits.fetch_add(1, Ordering::Relaxed);
        for slot in self.slots.lock().iter_mut() {
            cl.do_oop(slot)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Monitors(Table);

impl SynchronizerIterator for Monitors {
    fn oops_do(&self, cl: &mut dyn OopClosure) -> VisitResult {
        self.0.oops_do(cl)
    }
}

#[derive(Default)]
struct Cldg {
    strong: Vec<ClassLoaderData>,
    weak: Vec<ClassLoaderData>,
    visits: AtomicUsize,
}

impl ClassLoaderDataGraph for Cldg {
    fn roots_cld_do(
        &self,
        strong: Option<&mut dyn CldClosure>,
        weak: Option<&mut dyn CldClosure>,
    ) -> VisitResult {
        self.visits.fetch_add(1, Ordering::Relaxed);
        if let Some(cl) = strong {
            for cld in &self.strong {
                cl.do_cld(*cld)?;
            }
        }
        if let Some(cl) = weak {
            for cld in &self.weak {
                cl.do_cld(*cld)?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct CodeRoots {
    blobs: Vec<CodeBlob>,
    visits: AtomicUsize,
}

impl CodeRootsIterator for CodeRoots {
    fn blobs_do(&self, cl: &mut dyn CodeBlobClosure) -> VisitResult {
        self.visits.fetch_add(1, Ordering::Relaxed);
        for blob in &self.blobs {
            cl.do_code_blob(*blob)?;
        }
        Ok(())
    }
}

/// Every thread has one stack slot and one compiled frame with a code blob of the
/// same id.
struct Threads {
    stacks: Vec<Mutex<ObjectReference>>,
    visits: Vec<AtomicUsize>,
}

impl Threads {
    fn new(n: usize) -> Self {
        Self {
            stacks: (0..n).map(|i| Mutex::new(oop(0x9000 + i * 8))).collect(),
            visits: (0..n).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn visits(&self) -> Vec<usize> {
        self.visits.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }
}

impl ThreadList for Threads {
    fn len(&self) -> usize {
        self.stacks.len()
    }

    fn thread_at(&self, index: usize) -> JavaThread {
        JavaThread { id: index }
    }

    fn oops_do(
        &self,
        thread: JavaThread,
        oops: &mut dyn OopClosure,
        blobs: Option<&mut dyn CodeBlobClosure>,
    ) -> VisitResult {
        self.visits[thread.id].fetch_add(1, Ordering::Relaxed);
        oops.do_oop(&mut self.stacks[thread.id].lock())?;
        if let Some(blobs) = blobs {
            blobs.do_code_blob(CodeBlob { id: thread.id })?;
        }
        Ok(())
    }
}

struct Runtime {
    universe: Table,
    jni_handles: Table,
    jni_weak_handles: Table,
    flat_profiler: Table,
    management: Table,
    system_dictionary: Table,
    jvmti: Table,
    cldg: Cldg,
    all_code: CodeRoots,
    cset_code: CodeRoots,
    monitors: Monitors,
    threads: Threads,
}

impl Runtime {
    fn new(n_threads: usize) -> Self {
        Self {
            universe: Table::with(&[0x100, 0x108]),
            jni_handles: Table::with(&[0x200]),
            jni_weak_handles: Table::with(&[0x300]),
            flat_profiler: Table::default(),
            management: Table::with(&[0x400]),
            system_dictionary: Table::with(&[0x500, 0x508, 0x510]),
            jvmti: Table::default(),
            cldg: Cldg {
                strong: vec![ClassLoaderData {
                    id: 0,
                    holder: ObjectReference::NULL,
                }],
                weak: vec![ClassLoaderData {
                    id: 1,
                    holder: oop(0x600),
                }],
                visits: AtomicUsize::new(0),
            },
            all_code: CodeRoots {
                blobs: vec![CodeBlob { id: 100 }, CodeBlob { id: 101 }],
                visits: AtomicUsize::new(0),
            },
            cset_code: CodeRoots {
                blobs: vec![CodeBlob { id: 101 }],
                visits: AtomicUsize::new(0),
            },
            monitors: Monitors(Table::with(&[0x700])),
            threads: Threads::new(n_threads),
        }
    }

    fn roots(&self) -> RootSet<'_> {
        RootSet {
            universe: &self.universe,
            jni_handles: &self.jni_handles,
            jni_weak_handles: &self.jni_weak_handles,
            flat_profiler: &self.flat_profiler,
            management: &self.management,
            system_dictionary: &self.system_dictionary,
            jvmti: &self.jvmti,
            class_loader_data: &self.cldg,
            all_code_roots: &self.all_code,
            cset_code_roots: &self.cset_code,
            synchronizers: &self.monitors,
            threads: &self.threads,
        }
    }

    fn strong_table_visits(&self) -> [usize; 6] {
        [
            self.universe.visits(),
            self.jni_handles.visits(),
            self.flat_profiler.visits(),
            self.management.visits(),
            self.system_dictionary.visits(),
            self.jvmti.visits(),
        ]
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum ScanMode {
    Strong,
    All,
    Update,
}

/// Runs one root processor round and collects what the workers saw.
struct ScanTask<'a> {
    rp: &'a ShenandoahRootProcessor<'a>,
    mode: ScanMode,
    dead: ObjectReference,
    oops: Mutex<Vec<ObjectReference>>,
    clds: Mutex<Vec<usize>>,
    blobs: Mutex<Vec<usize>>,
}

impl<'a> ScanTask<'a> {
    fn new(rp: &'a ShenandoahRootProcessor<'a>, mode: ScanMode) -> Self {
        Self {
            rp,
            mode,
            dead: ObjectReference::NULL,
            oops: Mutex::new(vec![]),
            clds: Mutex::new(vec![]),
            blobs: Mutex::new(vec![]),
        }
    }
}

impl GangTask for ScanTask<'_> {
    fn name(&self) -> &str {
        "root scan"
    }

    fn work(&self, worker_id: usize) -> VisitResult {
        let mut oops = |slot: &mut ObjectReference| -> VisitResult {
            self.oops.lock().push(*slot);
            Ok(())
        };
        let mut clds = |cld: ClassLoaderData| -> VisitResult {
            self.clds.lock().push(cld.id);
            Ok(())
        };
        let mut blobs = |blob: CodeBlob| -> VisitResult {
            self.blobs.lock().push(blob.id);
            Ok(())
        };
        match self.mode {
            ScanMode::Strong => {
                self.rp
                    .process_strong_roots(&mut oops, &mut clds, &mut blobs, None, worker_id)
            }
            ScanMode::All => self
                .rp
                .process_all_roots(&mut oops, &mut clds, &mut blobs, None, worker_id),
            ScanMode::Update => {
                let dead = self.dead;
                let is_alive = move |o: ObjectReference| o != dead;
                self.rp.update_all_roots(
                    &mut oops,
                    &mut clds,
                    &mut blobs,
                    None,
                    &is_alive,
                    worker_id,
                )
            }
        }
    }
}

#[test]
pub fn test_explicit_concurrent_cycle_degenerates_at_concurrent_mark() {
    let config = Config {
        explicit_gc_invokes_concurrent: true,
        ..Config::default()
    };
    let policy = ShenandoahCollectorPolicy::new();
    let heuristics = StaticHeuristics::new(&config);

    let mut cycle = start_cycle(&policy, &heuristics, GcCause::UserRequested, &config).unwrap();
    assert_eq!(cycle.mode(), CycleMode::Concurrent);
    assert_eq!(cycle.cycle_id(), 1);
    cycle.enter(DegenPoint::InitMark);
    cycle.enter(DegenPoint::ConcurrentMark);

    let cycle = cycle.handle_alloc_failure();
    assert_eq!(cycle.mode(), CycleMode::Degenerated);
    match &cycle {
        GcCycle::Degenerated(degen) => {
            assert_eq!(degen.degen_point(), DegenPoint::ConcurrentMark)
        }
        _ => unreachable!(),
    }
    assert_eq!(cycle.finish(), CycleOutcome::Degenerated);

    let stats = policy.stats();
    assert_eq!(stats.explicit_concurrent, 1);
    assert_eq!(stats.alloc_failure_degenerated, 1);
    assert_eq!(stats.degenerations_at(DegenPoint::ConcurrentMark), 1);
    assert_eq!(stats.success_degenerated, 1);
    assert_eq!(stats.success_concurrent, 0);
    assert_eq!(heuristics.degenerated_cycles_in_a_row(), 1);

    let mut out = String::new();
    policy.print_gc_stats(&mut out).unwrap();
    assert!(out.starts_with("Under allocation pressure"));
    assert!(out.contains("\n        1 happened at Concurrent Mark\n"));
    assert!(!out.contains("happened at Init Mark"));
    assert!(out.contains("\n    1 Degenerated GCs\n"));
    assert!(out.contains("\n    0 Full GCs\n"));
}

#[test]
pub fn test_degenerated_upgrade_counts_as_full() {
    let config = Config::default();
    let policy = ShenandoahCollectorPolicy::new();
    let heuristics = StaticHeuristics::new(&config);

    let mut cycle = start_cycle(&policy, &heuristics, GcCause::Heuristics, &config).unwrap();
    cycle.enter(DegenPoint::FinalMark);
    let cycle = cycle.handle_alloc_failure().handle_alloc_failure();
    assert_eq!(cycle.mode(), CycleMode::Full);
    match &cycle {
        GcCycle::Full(full) => assert!(full.is_upgraded()),
        _ => unreachable!(),
    }
    assert_eq!(cycle.finish(), CycleOutcome::DegeneratedUpgradedToFull);

    let stats = policy.stats();
    assert_eq!(stats.implicit_concurrent, 1);
    assert_eq!(stats.degenerated_upgrade_to_full, 1);
    assert_eq!(stats.success_full, 0);
    assert_eq!(stats.total_full(), 1);
    assert!(stats.total_full() >= stats.degenerated_upgrade_to_full);
    assert_eq!(heuristics.gc_time_penalties(), 20);

    let out = stats.to_string();
    assert!(out.contains("\n    1 Full GCs\n"));
    assert!(out.contains("\n      1 upgraded from Degenerated GC\n"));
}

#[test]
pub fn test_cycle_start_classification() {
    let config = Config::default();
    let policy = ShenandoahCollectorPolicy::new();
    let heuristics = StaticHeuristics::new(&config);

    let full = start_cycle(&policy, &heuristics, GcCause::UserRequested, &config).unwrap();
    assert_eq!(full.mode(), CycleMode::Full);
    assert_eq!(full.finish(), CycleOutcome::Full);

    let meta =
        start_cycle(&policy, &heuristics, GcCause::MetadataGcClearSoftRefs, &config).unwrap();
    assert_eq!(meta.mode(), CycleMode::Full);
    meta.finish();

    let degen = start_cycle(&policy, &heuristics, GcCause::AllocationFailure, &config).unwrap();
    assert_eq!(degen.mode(), CycleMode::Degenerated);
    degen.finish();

    // failing before the first phase goes straight to Full GC
    let cycle = start_cycle(&policy, &heuristics, GcCause::Heuristics, &config).unwrap();
    let cycle = cycle.handle_alloc_failure();
    assert_eq!(cycle.mode(), CycleMode::Full);
    match &cycle {
        GcCycle::Full(full) => assert!(!full.is_upgraded()),
        _ => unreachable!(),
    }
    assert_eq!(cycle.finish(), CycleOutcome::Full);

    let stats = policy.stats();
    assert_eq!(stats.cycles, 4);
    assert_eq!(policy.cycle_counter(), 4);
    assert_eq!(stats.explicit_full, 1);
    assert_eq!(stats.implicit_full, 1);
    assert_eq!(stats.implicit_concurrent, 1);
    assert_eq!(stats.alloc_failure_full, 1);
    assert_eq!(stats.success_full, 3);
    assert_eq!(stats.degenerations_at(DegenPoint::OutsideCycle), 1);
    let points: usize = stats.degen_points.values().sum();
    assert_eq!(points, stats.alloc_failure_degenerated);
}

#[test]
pub fn test_shutdown_is_visible_to_other_threads() {
    let config = Config::default();
    let policy = ShenandoahCollectorPolicy::new();
    let heuristics = StaticHeuristics::new(&config);
    std::thread::scope(|s| {
        s.spawn(|| policy.record_shutdown());
    });
    let seen = std::thread::scope(|s| s.spawn(|| policy.is_at_shutdown()).join().unwrap());
    assert!(seen);

    assert!(start_cycle(&policy, &heuristics, GcCause::Heuristics, &config).is_none());
    assert_eq!(policy.cycle_counter(), 0);
}

struct TestHeap<H> {
    heuristics: H,
    collections: Cell<usize>,
}

impl<H: ShenandoahHeuristics> CollectorHeap for TestHeap<H> {
    fn heuristics(&self) -> &dyn ShenandoahHeuristics {
        &self.heuristics
    }

    fn collect(&self, cause: GcCause) {
        assert_eq!(cause, GcCause::MetadataGcClearSoftRefs);
        self.collections.set(self.collections.get() + 1);
    }
}

/// Fails every request until `succeed_at` attempts have been made.
struct TestMetaspace {
    attempts: Cell<usize>,
    succeed_at: usize,
    log: Mutex<Vec<&'static str>>,
}

impl TestMetaspace {
    fn attempt(&self, what: &'static str) -> Option<MetaWord> {
        self.log.lock().push(what);
        self.attempts.set(self.attempts.get() + 1);
        if self.attempts.get() == self.succeed_at {
            NonNull::new(0x1000 as *mut u8)
        } else {
            None
        }
    }
}

impl MetaspaceAllocator for TestMetaspace {
    fn allocate(&self, _size_words: usize, _mdtype: MetadataType) -> Option<MetaWord> {
        self.attempt("allocate")
    }

    fn expand_and_allocate(&self, _size_words: usize, _mdtype: MetadataType) -> Option<MetaWord> {
        self.attempt("expand")
    }
}

#[test]
pub fn test_metaspace_retry_after_full_gc() {
    let config = Config::default();
    let policy = ShenandoahCollectorPolicy::new();
    let heap = TestHeap {
        heuristics: StaticHeuristics::new(&config),
        collections: Cell::new(0),
    };
    let metaspace = TestMetaspace {
        attempts: Cell::new(0),
        succeed_at: 2,
        log: Mutex::new(vec![]),
    };

    let result =
        policy.satisfy_failed_metadata_allocation(&heap, &metaspace, 16, MetadataType::Class);
    assert!(result.is_ok());
    assert_eq!(heap.collections.get(), 1);
    assert_eq!(*metaspace.log.lock(), vec!["expand", "allocate"]);
    assert!(heap.heuristics.has_metaspace_oom());
}

#[test]
pub fn test_metaspace_exhausted() {
    let config = Config {
        class_unloading: false,
        ..Config::default()
    };
    let policy = ShenandoahCollectorPolicy::new();
    let heap = TestHeap {
        heuristics: StaticHeuristics::new(&config),
        collections: Cell::new(0),
    };
    let metaspace = TestMetaspace {
        attempts: Cell::new(0),
        succeed_at: usize::MAX,
        log: Mutex::new(vec![]),
    };

    let err = policy
        .satisfy_failed_metadata_allocation(&heap, &metaspace, 4, MetadataType::NonClass)
        .unwrap_err();
    assert!(matches!(
        err,
        ShenandoahError::MetaspaceExhausted {
            size_words: 4,
            mdtype: MetadataType::NonClass
        }
    ));
    assert_eq!(
        err.to_string(),
        "Metaspace exhausted: failed to allocate 4 words of non-class metadata"
    );
    assert_eq!(*metaspace.log.lock(), vec!["expand", "allocate", "expand"]);
    assert!(!heap.heuristics.has_metaspace_oom());
}

#[test]
pub fn test_metaspace_huge_request_is_logged() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
    log::set_max_level(log::LevelFilter::Info);

    let config = Config::default();
    let policy = ShenandoahCollectorPolicy::new();
    let heap = TestHeap {
        heuristics: StaticHeuristics::new(&config),
        collections: Cell::new(0),
    };
    let metaspace = TestMetaspace {
        attempts: Cell::new(0),
        succeed_at: 2,
        log: Mutex::new(vec![]),
    };
    let result = policy.satisfy_failed_metadata_allocation(
        &heap,
        &metaspace,
        usize::MAX / 2,
        MetadataType::Class,
    );
    assert!(result.is_ok());
    assert_eq!(heap.collections.get(), 1);

    let metaspace = TestMetaspace {
        attempts: Cell::new(0),
        succeed_at: usize::MAX,
        log: Mutex::new(vec![]),
    };
    let err = policy
        .satisfy_failed_metadata_allocation(&heap, &metaspace, usize::MAX, MetadataType::NonClass)
        .unwrap_err();
    assert!(matches!(
        err,
        ShenandoahError::MetaspaceExhausted {
            size_words: usize::MAX,
            ..
        }
    ));
}

#[test]
pub fn test_aggressive_heuristics_record_metaspace_oom() {
    let config = Config {
        class_unloading: false,
        ..Config::default()
    };
    let policy = ShenandoahCollectorPolicy::new();
    let heap = TestHeap {
        heuristics: AggressiveHeuristics::new(&config),
        collections: Cell::new(0),
    };
    let metaspace = TestMetaspace {
        attempts: Cell::new(0),
        succeed_at: 1,
        log: Mutex::new(vec![]),
    };

    let result =
        policy.satisfy_failed_metadata_allocation(&heap, &metaspace, 8, MetadataType::Class);
    assert!(result.is_ok());
    assert_eq!(heap.collections.get(), 0);
    assert!(heap.heuristics.has_metaspace_oom());
}

#[test]
pub fn test_strong_roots_claimed_once() {
    let runtime = Runtime::new(5);
    let timings = ShenandoahPhaseTimings::new();
    let gang = ShenandoahWorkGang::new("Shenandoah GC Threads", 3);
    {
        let rp = ShenandoahRootProcessor::new(
            runtime.roots(),
            gang.active_workers(),
            Phase::InitMarkRoots,
            &timings,
        );
        let task = ScanTask::new(&rp, ScanMode::Strong);
        gang.run_task(&task).unwrap();

        // strong CLD only, thread frames carry the code blobs
        assert_eq!(*task.clds.lock(), vec![0]);
        let mut blobs = task.blobs.lock().clone();
        blobs.sort_unstable();
        assert_eq!(blobs, vec![0, 1, 2, 3, 4]);
        assert!(!task.oops.lock().contains(&oop(0x300)));
        // 2 + 1 + 1 + 3 table slots, 1 monitor, 5 stacks
        assert_eq!(task.oops.lock().len(), 13);
    }
    assert_eq!(runtime.strong_table_visits(), [1; 6]);
    assert_eq!(runtime.jni_weak_handles.visits(), 0);
    assert_eq!(runtime.all_code.visits.load(Ordering::Relaxed), 0);
    assert_eq!(runtime.cldg.visits.load(Ordering::Relaxed), 1);
    assert_eq!(runtime.monitors.0.visits(), 1);
    assert_eq!(runtime.threads.visits(), vec![1; 5]);
    assert_eq!(timings.phase_time(Phase::InitMarkRoots).1, 1);
}

#[test]
pub fn test_more_workers_than_tasks() {
    let runtime = Runtime::new(2);
    let timings = ShenandoahPhaseTimings::new();
    let gang = ShenandoahWorkGang::new("Shenandoah GC Threads", 16);
    let rp = ShenandoahRootProcessor::new(
        runtime.roots(),
        gang.active_workers(),
        Phase::FinalMarkRoots,
        &timings,
    );
    let task = ScanTask::new(&rp, ScanMode::All);
    gang.run_task(&task).unwrap();

    assert_eq!(runtime.strong_table_visits(), [1; 6]);
    assert_eq!(runtime.jni_weak_handles.visits(), 1);
    assert_eq!(runtime.all_code.visits.load(Ordering::Relaxed), 1);
    assert_eq!(runtime.threads.visits(), vec![1, 1]);
    let mut clds = task.clds.lock().clone();
    clds.sort_unstable();
    assert_eq!(clds, vec![0, 1]);
}

#[test]
pub fn test_coordinator_rounds_are_reusable() {
    let runtime = Runtime::new(3);
    let timings = ShenandoahPhaseTimings::new();
    let gang = ShenandoahWorkGang::new("Shenandoah GC Threads", 2);
    let rp = ShenandoahRootProcessor::new(
        runtime.roots(),
        gang.active_workers(),
        Phase::DegenGcRoots,
        &timings,
    );
    for _ in 0..2 {
        gang.run_task(&ScanTask::new(&rp, ScanMode::All)).unwrap();
    }
    assert_eq!(runtime.universe.visits(), 2);
    assert_eq!(runtime.threads.visits(), vec![2, 2, 2]);
}

#[test]
pub fn test_update_roots_clears_dead_weak_slots() {
    let runtime = Runtime::new(1);
    runtime.jni_weak_handles.slots.lock().push(oop(0x308));
    let timings = ShenandoahPhaseTimings::new();
    let rp = ShenandoahRootProcessor::new(runtime.roots(), 1, Phase::UpdateRoots, &timings);
    let task = ScanTask {
        dead: oop(0x300),
        ..ScanTask::new(&rp, ScanMode::Update)
    };
    task.work(0).unwrap();

    assert_eq!(
        *runtime.jni_weak_handles.slots.lock(),
        vec![ObjectReference::NULL, oop(0x308)]
    );
    let oops = task.oops.lock();
    assert!(!oops.contains(&oop(0x300)));
    assert!(oops.contains(&oop(0x308)));
    // the weak CLD holder is live
    assert_eq!(*task.clds.lock(), vec![0, 1]);
    drop(oops);

    let task = ScanTask {
        dead: oop(0x600),
        ..ScanTask::new(&rp, ScanMode::Update)
    };
    task.work(0).unwrap();
    assert_eq!(*task.clds.lock(), vec![0]);
}

#[test]
pub fn test_visitor_error_is_propagated() {
    let runtime = Runtime::new(4);
    let timings = ShenandoahPhaseTimings::new();
    {
        let rp = ShenandoahRootEvacuator::new(runtime.roots(), 1, Phase::InitEvacRoots, &timings);
        let mut oops = |slot: &mut ObjectReference| -> VisitResult {
            if *slot == oop(0x9008) {
                return Err("evacuation failed".into());
            }
            Ok(())
        };
        let mut blobs = |_: CodeBlob| -> VisitResult { Ok(()) };
        let err = rp
            .process_evacuate_roots(&mut oops, &mut blobs, 0)
            .unwrap_err();
        assert_eq!(err.to_string(), "evacuation failed");
    }
    assert_eq!(runtime.threads.visits(), vec![1, 1, 0, 0]);
    assert_eq!(runtime.universe.visits(), 0);
    assert_eq!(timings.phase_time(Phase::InitEvacRoots).1, 1);
}

struct EvacTask<'a> {
    evac: &'a ShenandoahRootEvacuator<'a>,
    blobs: Mutex<Vec<usize>>,
    oops: AtomicUsize,
}

impl GangTask for EvacTask<'_> {
    fn name(&self) -> &str {
        "evacuate roots"
    }

    fn work(&self, worker_id: usize) -> VisitResult {
        let mut oops = |_: &mut ObjectReference| -> VisitResult {
            self.oops.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };
        let mut blobs = |blob: CodeBlob| -> VisitResult {
            self.blobs.lock().push(blob.id);
            Ok(())
        };
        self.evac.process_evacuate_roots(&mut oops, &mut blobs, worker_id)
    }
}

#[test]
pub fn test_evacuator_uses_cset_code_roots() {
    let runtime = Runtime::new(3);
    let timings = ShenandoahPhaseTimings::new();
    let gang = ShenandoahWorkGang::new("Shenandoah GC Threads", 4);
    let evac = ShenandoahRootEvacuator::new(
        runtime.roots(),
        gang.active_workers(),
        Phase::InitEvacRoots,
        &timings,
    );
    let task = EvacTask {
        evac: &evac,
        blobs: Mutex::new(vec![]),
        oops: AtomicUsize::new(0),
    };
    gang.run_task(&task).unwrap();

    assert_eq!(*task.blobs.lock(), vec![101]);
    assert_eq!(runtime.cset_code.visits.load(Ordering::Relaxed), 1);
    assert_eq!(runtime.all_code.visits.load(Ordering::Relaxed), 0);
    assert_eq!(runtime.cldg.visits.load(Ordering::Relaxed), 0);
    assert_eq!(runtime.threads.visits(), vec![1, 1, 1]);
    // 7 table slots, 1 weak JNI slot, 1 monitor, 3 stacks
    assert_eq!(task.oops.load(Ordering::Relaxed), 12);
    assert_eq!(evac.n_workers(), 4);
}

struct DoubleClaim {
    tasks: SubTasksDone<DegenPoint>,
}

impl GangTask for DoubleClaim {
    fn name(&self) -> &str {
        "double claim"
    }

    fn work(&self, worker_id: usize) -> VisitResult {
        if worker_id == 1 {
            self.tasks.try_claim_task(DegenPoint::InitMark, worker_id);
            self.tasks.try_claim_task(DegenPoint::InitMark, worker_id);
        }
        Ok(())
    }
}

#[test]
#[should_panic(expected = "guarantee failed: worker 1 claimed subtask")]
pub fn test_worker_guarantee_failure_reaches_caller() {
    let gang = ShenandoahWorkGang::new("Shenandoah GC Threads", 2);
    let _ = gang.run_task(&DoubleClaim {
        tasks: SubTasksDone::new(2),
    });
}

#[test]
pub fn test_worker_timings_are_recorded() {
    let runtime = Runtime::new(1);
    let timings = ShenandoahPhaseTimings::new();
    {
        let rp = ShenandoahRootProcessor::new(runtime.roots(), 1, Phase::ScanRoots, &timings);
        let task = ScanTask::new(&rp, ScanMode::Strong);
        task.work(0).unwrap();
    }
    let report = timings.to_string();
    assert!(report.contains(Phase::ScanRoots.as_str()));
    assert_eq!(
        timings.worker_time(Phase::ScanRoots, ParPhase::JniWeakRoots, 0),
        Duration::ZERO
    );
}
