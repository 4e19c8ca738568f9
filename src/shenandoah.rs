//! Shenandoah cycle policy and parallel root processing.

pub mod collector_policy;
pub mod cycle;
pub mod heuristics;
pub mod metaspace;
pub mod phase_timings;
pub mod root_processor;
pub mod shared_variables;
pub mod sub_tasks;
pub mod workgroup;
