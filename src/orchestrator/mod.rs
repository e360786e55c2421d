//! Application-level orchestration.
//!
//! `launcher` submits an expanded sweep to an execution backend; `lifecycle`
//! rediscovers and cancels jobs through the batch-compute API. CLI layers call
//! into this module and only handle presentation.

mod launcher;
mod lifecycle;

pub(crate) use launcher::{launch_sweep, LaunchReport};
pub(crate) use lifecycle::{list, terminate_all, TerminationReport, DEFAULT_TERMINATE_CONCURRENCY};
