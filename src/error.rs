//! Typed failures for launching runs and talking to the batch-compute API.
//!
//! Launch and termination errors are per-item: callers collect them and keep
//! going. A query error aborts only the listing it belongs to.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

fn fmt_duration(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

/// A run could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executor `{program}` not found")]
    MissingExecutor { program: String },

    #[error("invalid argument for {label}: {reason}")]
    InvalidArgument { label: String, reason: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log sink {}: {source}", .path.display())]
    LogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("launch task for {label} did not complete: {message}")]
    Join { label: String, message: String },
}

/// Listing jobs failed.
#[derive(Debug, Error)]
pub enum BackendQueryError {
    #[error("batch client `{program}` could not be started: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("list-jobs failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("list-jobs timed out after {}", fmt_duration(.0))]
    Timeout(Duration),

    #[error("malformed list-jobs response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A single job could not be cancelled.
#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("job {job_id} rejected termination: {message}")]
    Rejected { job_id: String, message: String },

    #[error("job {job_id}: batch client could not be started: {source}")]
    Unavailable {
        job_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job {job_id}: terminate-job timed out after {}", fmt_duration(.timeout))]
    Timeout { job_id: String, timeout: Duration },
}

/// The sweep definition is unusable; nothing has been launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("axis `{axis}`: {reason}")]
    InvalidAxis { axis: String, reason: String },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}
