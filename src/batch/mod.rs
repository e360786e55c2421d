//! Batch-compute API surface used by the lifecycle commands.

mod aws_cli;

pub use aws_cli::{AwsCliBatch, DEFAULT_PAGE_SIZE};

use crate::error::{BackendQueryError, TerminationError};
use crate::model::{JobStatus, JobSummary};
use futures::future::BoxFuture;

/// One page of a job listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    /// Continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

/// Queue-level job operations. Every call reflects the service's current state.
pub trait BatchApi: Send + Sync {
    fn list_jobs<'a>(
        &'a self,
        queue: &'a str,
        status: JobStatus,
        next_token: Option<String>,
    ) -> BoxFuture<'a, Result<JobPage, BackendQueryError>>;

    fn terminate_job<'a>(
        &'a self,
        job_id: &'a str,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), TerminationError>>;
}
