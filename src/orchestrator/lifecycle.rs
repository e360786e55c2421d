//! Listing and bulk termination of queued jobs.

use crate::batch::BatchApi;
use crate::error::{BackendQueryError, TerminationError};
use crate::model::{JobFilter, JobSummary};
use futures::{future, stream, Stream, StreamExt, TryStreamExt};

pub const DEFAULT_TERMINATE_CONCURRENCY: usize = 8;

enum PageCursor {
    First,
    Next(String),
    Done,
}

/// Lazily stream every job matching `filter`, following continuation tokens.
pub(crate) fn list<'a>(
    api: &'a dyn BatchApi,
    filter: &'a JobFilter,
) -> impl Stream<Item = Result<JobSummary, BackendQueryError>> + 'a {
    stream::try_unfold(PageCursor::First, move |cursor| async move {
        let token = match cursor {
            PageCursor::Done => return Ok(None),
            PageCursor::First => None,
            PageCursor::Next(t) => Some(t),
        };
        let page = api.list_jobs(&filter.queue, filter.status, token).await?;
        let next = match page.next_token {
            Some(t) => PageCursor::Next(t),
            None => PageCursor::Done,
        };
        Ok::<_, BackendQueryError>(Some((
            stream::iter(page.jobs.into_iter().map(Ok::<_, BackendQueryError>)),
            next,
        )))
    })
    .try_flatten()
    .try_filter(move |job| future::ready(filter.matches_name(&job.job_name)))
}

pub(crate) async fn terminate(
    api: &dyn BatchApi,
    job_id: &str,
    reason: &str,
) -> Result<(), TerminationError> {
    api.terminate_job(job_id, reason).await
}

#[derive(Debug)]
pub(crate) struct TerminationOutcome {
    pub job: JobSummary,
    pub result: Result<(), TerminationError>,
}

#[derive(Debug, Default)]
pub(crate) struct TerminationReport {
    pub outcomes: Vec<TerminationOutcome>,
}

impl TerminationReport {
    pub(crate) fn listed(&self) -> usize {
        self.outcomes.len()
    }

    pub(crate) fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub(crate) fn failed(&self) -> usize {
        self.listed() - self.succeeded()
    }
}

/// Terminate every job matching `filter`, at most `concurrency` at a time.
///
/// Listing failures abort the call. Individual termination failures are
/// recorded in the report and passed to `on_outcome` as they happen.
pub(crate) async fn terminate_all<F>(
    api: &dyn BatchApi,
    filter: &JobFilter,
    reason: &str,
    concurrency: usize,
    mut on_outcome: F,
) -> Result<TerminationReport, BackendQueryError>
where
    F: FnMut(&TerminationOutcome),
{
    let jobs: Vec<JobSummary> = list(api, filter).try_collect().await?;
    tracing::info!(
        queue = %filter.queue,
        status = %filter.status,
        count = jobs.len(),
        "terminating matching jobs"
    );

    let outcomes: Vec<TerminationOutcome> = stream::iter(jobs)
        .map(|job| async move {
            let result = terminate(api, &job.job_id, reason).await;
            if let Err(e) = &result {
                // The job may have left the status between listing and now.
                tracing::warn!(job_id = %job.job_id, error = %e, "termination failed");
            }
            TerminationOutcome { job, result }
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|outcome| on_outcome(outcome))
        .collect()
        .await;

    Ok(TerminationReport { outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::JobPage;
    use crate::model::JobStatus;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory queue: terminated jobs move to FAILED, like the real service.
    #[derive(Default)]
    struct FakeQueue {
        jobs: Mutex<Vec<(JobSummary, JobStatus)>>,
        page_size: usize,
        reject: Vec<String>,
        list_error: bool,
        terminate_calls: Mutex<Vec<String>>,
    }

    impl FakeQueue {
        fn with_jobs(n: usize, status: JobStatus, page_size: usize) -> Self {
            let jobs = (0..n)
                .map(|i| {
                    (
                        JobSummary {
                            job_id: format!("job-{i}"),
                            job_name: format!("sweep-{}__seed={i}", i % 2),
                            status: Some(status),
                        },
                        status,
                    )
                })
                .collect();
            Self {
                jobs: Mutex::new(jobs),
                page_size,
                ..Default::default()
            }
        }
    }

    impl BatchApi for FakeQueue {
        fn list_jobs<'a>(
            &'a self,
            _queue: &'a str,
            status: JobStatus,
            next_token: Option<String>,
        ) -> BoxFuture<'a, Result<JobPage, BackendQueryError>> {
            async move {
                if self.list_error {
                    return Err(BackendQueryError::Failed {
                        status: "exit status: 255".into(),
                        stderr: "Unable to locate credentials".into(),
                    });
                }
                let matching: Vec<JobSummary> = self
                    .jobs
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(_, s)| *s == status)
                    .map(|(j, _)| j.clone())
                    .collect();
                let start: usize = next_token.map_or(0, |t| t.parse().unwrap());
                let end = (start + self.page_size).min(matching.len());
                let next_token = (end < matching.len()).then(|| end.to_string());
                Ok(JobPage {
                    jobs: matching[start..end].to_vec(),
                    next_token,
                })
            }
            .boxed()
        }

        fn terminate_job<'a>(
            &'a self,
            job_id: &'a str,
            _reason: &'a str,
        ) -> BoxFuture<'a, Result<(), TerminationError>> {
            async move {
                self.terminate_calls.lock().unwrap().push(job_id.to_string());
                if self.reject.iter().any(|r| r == job_id) {
                    return Err(TerminationError::Rejected {
                        job_id: job_id.to_string(),
                        message: "AccessDeniedException".into(),
                    });
                }
                for (job, status) in self.jobs.lock().unwrap().iter_mut() {
                    if job.job_id == job_id {
                        *status = JobStatus::Failed;
                    }
                }
                Ok(())
            }
            .boxed()
        }
    }

    fn filter() -> JobFilter {
        JobFilter::new("gpu-queue", JobStatus::Runnable)
    }

    #[tokio::test]
    async fn list_follows_pagination() {
        let api = FakeQueue::with_jobs(7, JobStatus::Runnable, 3);
        let f = filter();
        let jobs: Vec<JobSummary> = list(&api, &f).try_collect().await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["job-0", "job-1", "job-2", "job-3", "job-4", "job-5", "job-6"]
        );
    }

    #[tokio::test]
    async fn list_with_no_matches_is_empty() {
        let api = FakeQueue::with_jobs(3, JobStatus::Succeeded, 10);
        let f = filter();
        let jobs: Vec<JobSummary> = list(&api, &f).try_collect().await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn list_applies_name_prefix() {
        let api = FakeQueue::with_jobs(6, JobStatus::Runnable, 4);
        let mut f = filter();
        f.name_prefix = Some("sweep-1".into());
        let jobs: Vec<JobSummary> = list(&api, &f).try_collect().await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job-1", "job-3", "job-5"]);
    }

    #[tokio::test]
    async fn one_terminate_call_per_listed_job_despite_failures() {
        let mut api = FakeQueue::with_jobs(5, JobStatus::Runnable, 2);
        api.reject = vec!["job-1".into(), "job-3".into()];
        let mut seen = 0;
        let report = terminate_all(&api, &filter(), "sweep cancelled", 2, |_| seen += 1)
            .await
            .unwrap();

        let mut calls = api.terminate_calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["job-0", "job-1", "job-2", "job-3", "job-4"]);
        assert_eq!(seen, 5);
        assert_eq!(report.listed(), 5);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 2);

        let failed: HashMap<&str, bool> = report
            .outcomes
            .iter()
            .map(|o| (o.job.job_id.as_str(), o.result.is_err()))
            .collect();
        assert!(failed["job-1"]);
        assert!(failed["job-3"]);
        assert!(!failed["job-0"]);
    }

    #[tokio::test]
    async fn terminate_all_twice_is_idempotent() {
        let api = FakeQueue::with_jobs(4, JobStatus::Runnable, 10);
        let first = terminate_all(&api, &filter(), "cleanup", 4, |_| {})
            .await
            .unwrap();
        assert_eq!(first.succeeded(), 4);

        api.terminate_calls.lock().unwrap().clear();
        let second = terminate_all(&api, &filter(), "cleanup", 4, |_| {})
            .await
            .unwrap();
        assert_eq!(second.listed(), 0);
        assert!(api.terminate_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_aborts_without_terminating() {
        let mut api = FakeQueue::with_jobs(2, JobStatus::Runnable, 10);
        api.list_error = true;
        let err = terminate_all(&api, &filter(), "cleanup", 4, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, BackendQueryError::Failed { .. }));
        assert!(api.terminate_calls.lock().unwrap().is_empty());
    }
}
