//! Execution backends: the systems that actually run a training program.

mod local;

pub use local::LocalProcessBackend;

use crate::error::LaunchError;
use crate::model::{RunSpec, SubmittedJob};
use std::path::PathBuf;

/// Where a detached run's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Send output to the null device.
    #[default]
    Discard,
    /// Append output to `<dir>/<run label>.log`.
    Directory(PathBuf),
}

/// Starts runs without waiting for them.
///
/// `submit` must return as soon as the run has been handed off; the run itself
/// keeps going after the orchestrator exits.
pub trait ExecutionBackend: Send + Sync {
    fn submit(&self, spec: &RunSpec) -> Result<SubmittedJob, LaunchError>;

    /// Rendering of what `submit` would execute, for dry runs.
    fn describe(&self, spec: &RunSpec) -> String;
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
