//! `BatchApi` backed by the AWS command-line client.
//!
//! Pagination is driven explicitly with `--max-items` / `--starting-token` so
//! callers can stream pages instead of waiting for the whole queue.

use crate::batch::{BatchApi, JobPage};
use crate::error::{BackendQueryError, TerminationError};
use crate::model::{JobStatus, JobSummary};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct AwsCliBatch {
    program: String,
    region: Option<String>,
    profile: Option<String>,
    page_size: u32,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListJobsResponse {
    #[serde(default)]
    job_summary_list: Vec<AwsJobSummary>,
    #[serde(default, rename = "NextToken", alias = "nextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsJobSummary {
    job_id: String,
    #[serde(default)]
    job_name: String,
    #[serde(default)]
    status: Option<JobStatus>,
}

impl From<AwsJobSummary> for JobSummary {
    fn from(j: AwsJobSummary) -> Self {
        JobSummary {
            job_id: j.job_id,
            job_name: j.job_name,
            status: j.status,
        }
    }
}

fn parse_list_output(stdout: &[u8]) -> Result<JobPage, BackendQueryError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(JobPage::default());
    }
    let resp: ListJobsResponse = serde_json::from_slice(stdout)?;
    Ok(JobPage {
        jobs: resp.job_summary_list.into_iter().map(Into::into).collect(),
        next_token: resp.next_token.filter(|t| !t.is_empty()),
    })
}

fn stderr_message(output: &Output) -> String {
    let msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if msg.is_empty() {
        format!("exited with {}", output.status)
    } else {
        msg
    }
}

impl AwsCliBatch {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: None,
            profile: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(region) = &self.region {
            cmd.arg("--region").arg(region);
        }
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.args(args)
            .args(["--output", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn list_args(&self, queue: &str, status: JobStatus, next_token: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "batch".to_string(),
            "list-jobs".into(),
            "--job-queue".into(),
            queue.to_string(),
            "--job-status".into(),
            status.as_api_str().into(),
            "--max-items".into(),
            self.page_size.to_string(),
        ];
        if let Some(token) = next_token {
            args.push("--starting-token".into());
            args.push(token.to_string());
        }
        args
    }

    async fn list_page(
        &self,
        queue: &str,
        status: JobStatus,
        next_token: Option<String>,
    ) -> Result<JobPage, BackendQueryError> {
        let args = self.list_args(queue, status, next_token.as_deref());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(queue, %status, token = ?next_token, "listing jobs");

        let output = tokio::time::timeout(self.timeout, self.command(&args).output())
            .await
            .map_err(|_| BackendQueryError::Timeout(self.timeout))?
            .map_err(|source| BackendQueryError::Unavailable {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendQueryError::Failed {
                status: output.status.to_string(),
                stderr: stderr_message(&output),
            });
        }
        parse_list_output(&output.stdout)
    }

    async fn terminate(&self, job_id: &str, reason: &str) -> Result<(), TerminationError> {
        let args = [
            "batch",
            "terminate-job",
            "--job-id",
            job_id,
            "--reason",
            reason,
        ];
        tracing::debug!(job_id, reason, "terminating job");

        let output = tokio::time::timeout(self.timeout, self.command(&args).output())
            .await
            .map_err(|_| TerminationError::Timeout {
                job_id: job_id.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| TerminationError::Unavailable {
                job_id: job_id.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TerminationError::Rejected {
                job_id: job_id.to_string(),
                message: stderr_message(&output),
            })
        }
    }
}

impl BatchApi for AwsCliBatch {
    fn list_jobs<'a>(
        &'a self,
        queue: &'a str,
        status: JobStatus,
        next_token: Option<String>,
    ) -> BoxFuture<'a, Result<JobPage, BackendQueryError>> {
        self.list_page(queue, status, next_token).boxed()
    }

    fn terminate_job<'a>(
        &'a self,
        job_id: &'a str,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), TerminationError>> {
        self.terminate(job_id, reason).boxed()
    }
}
