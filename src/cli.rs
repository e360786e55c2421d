use crate::batch::AwsCliBatch;
use crate::config::{merge_axes, SweepFile, UserDefaults};
use crate::engine::{ExecutionBackend, LocalProcessBackend, LogSink};
use crate::error::ConfigError;
use crate::model::{
    Device, InvariantParams, JobFilter, JobStatus, RunSpec, SubmittedJob, SweepAxis, SweepEvent,
};
use crate::orchestrator::{self, LaunchReport, TerminationReport, DEFAULT_TERMINATE_CONCURRENCY};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::TryStreamExt;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Step budget when neither the CLI nor the sweep file sets one.
const DEFAULT_TOTAL_TIMESTEPS: u64 = 500_000;
const DEFAULT_STAGGER: Duration = Duration::from_millis(200);
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Close the writer channel and wait until everything queued has been written.
async fn finish_output(tx: mpsc::UnboundedSender<OutputLine>, handle: tokio::task::JoinHandle<()>) {
    drop(tx);
    let _ = handle.await;
}

#[derive(Debug, Parser)]
#[command(
    name = "sweeprun",
    version,
    about = "Launch training sweeps and bulk-manage their batch jobs"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug); SWEEPRUN_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// User defaults file (default: <config dir>/sweeprun/config.toml)
    #[arg(long, global = true)]
    pub defaults: Option<PathBuf>,

    /// Region for batch-compute calls
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Credentials profile for batch-compute calls
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Path to the AWS command-line client
    #[arg(long, global = true)]
    pub aws_bin: Option<String>,

    /// Timeout for each batch-compute call
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Jobs requested per list-jobs page
    #[arg(long, global = true, default_value_t = crate::batch::DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand a sweep and launch one detached run per combination
    Launch(LaunchArgs),
    /// List jobs on a batch queue by status
    List(ListArgs),
    /// Terminate every job on a batch queue with the given status
    Terminate(TerminateArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct LaunchArgs {
    /// Sweep definition file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sweep axis, repeatable; replaces a same-named axis from the file
    #[arg(long = "axis", value_name = "NAME=V1,V2,...", value_parser = parse_axis)]
    pub axes: Vec<SweepAxis>,

    /// Training script to run
    #[arg(long)]
    pub program: Option<PathBuf>,

    /// Interpreter for the training script (e.g. python)
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Experiment name passed as --exp-name (default: script file stem)
    #[arg(long)]
    pub exp_name: Option<String>,

    /// Step budget passed as --total-timesteps
    #[arg(long)]
    pub total_timesteps: Option<u64>,

    /// Capture videos of the agent; use --capture-video false to override the file
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub capture_video: Option<bool>,

    /// Track the runs with the metrics service
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub track: Option<bool>,

    #[arg(long)]
    pub wandb_project_name: Option<String>,

    #[arg(long)]
    pub wandb_entity: Option<String>,

    /// Compute device: cpu, gpu or gpu:N
    #[arg(long)]
    pub device: Option<Device>,

    /// Run under a virtual display server
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub headless: Option<bool>,

    /// Delay between successive submissions (0s disables)
    #[arg(long)]
    pub stagger: Option<humantime::Duration>,

    /// Write each run's output to <DIR>/<index>__<label>.log instead of discarding it
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Sweep tag attached to every run (default: <exp-name>-<random hex>)
    #[arg(long)]
    pub tag: Option<String>,

    /// Print the commands that would run and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Print each submitted run as a JSON line instead of tab-separated fields
    #[arg(long)]
    pub json: bool,

    /// Extra arguments passed verbatim to every run
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Print JSON instead of tab-separated lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TerminateArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Reason recorded with every termination
    #[arg(long)]
    pub reason: String,

    /// Maximum termination requests in flight
    #[arg(long, default_value_t = DEFAULT_TERMINATE_CONCURRENCY)]
    pub concurrency: usize,

    /// List the jobs that would be terminated and exit
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct FilterArgs {
    /// Job queue name (falls back to the defaults file)
    #[arg(long)]
    pub queue: Option<String>,

    /// Job status to match
    #[arg(long, value_enum, ignore_case = true)]
    pub status: JobStatus,

    /// Only jobs whose name starts with this prefix. Launch exports the sweep
    /// tag as SWEEPRUN_TAG but names no batch jobs itself, so a tag only
    /// matches when the training program puts it in its job names.
    #[arg(long)]
    pub name_prefix: Option<String>,
}

/// Overall result of a command that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    PartialFailure,
}

impl Outcome {
    fn from_success(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::PartialFailure
        }
    }

    /// Process exit code; per-item failures have already been printed.
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::PartialFailure => 1,
        }
    }
}

fn launch_outcome(report: &LaunchReport) -> Outcome {
    Outcome::from_success(report.is_success())
}

fn termination_outcome(report: &TerminationReport) -> Outcome {
    Outcome::from_success(report.failed() == 0)
}

/// Progress and failures share the 1-based `[i/N]` numbering.
fn event_line(ev: SweepEvent, total: usize, json: bool) -> OutputLine {
    match ev {
        SweepEvent::Submitting { index, total, label } => {
            OutputLine::Stderr(format!("[{}/{}] {}", index + 1, total, label))
        }
        SweepEvent::Submitted(job) => match submitted_line(&job, json) {
            Ok(line) => OutputLine::Stdout(line),
            Err(e) => OutputLine::Stderr(format!("failed to encode run {}: {e}", job.id)),
        },
        SweepEvent::LaunchFailed {
            index,
            label,
            error,
        } => OutputLine::Stderr(format!("FAILED [{}/{}] {label}: {error}", index + 1, total)),
        SweepEvent::Info(msg) => OutputLine::Stderr(msg),
    }
}

/// Stdout line for a started run: JSON, or `id<TAB>submitted_at<TAB>label`.
fn submitted_line(job: &SubmittedJob, json: bool) -> Result<String, serde_json::Error> {
    if json {
        serde_json::to_string(job)
    } else {
        Ok(format!("{}\t{}\t{}", job.id, job.submitted_at, job.spec.label()))
    }
}

fn parse_axis(s: &str) -> Result<SweepAxis, String> {
    let (name, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=V1,V2,... but got `{s}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("axis name is empty".into());
    }
    let values: Vec<&str> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(format!("axis `{name}` has no values"));
    }
    Ok(SweepAxis::new(name, values))
}

/// Generate a random sweep tag from the experiment name.
fn gen_sweep_tag(exp_name: &str) -> String {
    let mut b = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{exp_name}-{:08x}", u32::from_le_bytes(b))
}

pub async fn run(args: Cli) -> Result<Outcome> {
    let defaults_path = args
        .global
        .defaults
        .clone()
        .or_else(UserDefaults::default_path);
    let defaults =
        UserDefaults::load(defaults_path.as_deref()).context("failed to load user defaults")?;

    match args.command {
        Command::Launch(launch) => run_launch(launch, &defaults).await,
        Command::List(list) => run_list(&args.global, list, &defaults).await,
        Command::Terminate(term) => run_terminate(&args.global, term, &defaults).await,
    }
}

/// Everything needed to launch an expanded sweep.
pub struct LaunchPlan {
    pub specs: Vec<RunSpec>,
    pub tag: String,
    pub stagger: Duration,
    pub backend: LocalProcessBackend,
}

/// Build a `LaunchPlan` from CLI arguments, the sweep file and user defaults.
pub fn build_launch_plan(args: &LaunchArgs, defaults: &UserDefaults) -> Result<LaunchPlan> {
    let file = match &args.config {
        Some(path) => SweepFile::load(path)?,
        None => SweepFile::default(),
    };
    let axes = merge_axes(file.axes()?, args.axes.clone());

    let program = args
        .program
        .clone()
        .or_else(|| file.program.clone())
        .ok_or(ConfigError::Missing("program"))?;
    let exp_name = args
        .exp_name
        .clone()
        .or_else(|| file.exp_name.clone())
        .or_else(|| {
            program
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .ok_or(ConfigError::Missing("exp_name"))?;
    let extra_args = if args.extra_args.is_empty() {
        file.extra_args.clone()
    } else {
        args.extra_args.clone()
    };

    let invariants = InvariantParams {
        program,
        interpreter: args.interpreter.clone().or_else(|| file.interpreter.clone()),
        exp_name,
        total_timesteps: args
            .total_timesteps
            .or(file.total_timesteps)
            .unwrap_or(DEFAULT_TOTAL_TIMESTEPS),
        capture_video: args.capture_video.or(file.capture_video).unwrap_or(false),
        track: args.track.or(file.track).unwrap_or(false),
        wandb_project_name: args
            .wandb_project_name
            .clone()
            .or_else(|| file.wandb_project_name.clone()),
        wandb_entity: args.wandb_entity.clone().or_else(|| file.wandb_entity.clone()),
        device: args.device.or(file.device).unwrap_or_default(),
        headless: args.headless.or(file.headless).unwrap_or(false),
        extra_args,
    };

    let tag = args
        .tag
        .clone()
        .or_else(|| file.tag.clone())
        .unwrap_or_else(|| gen_sweep_tag(&invariants.exp_name));
    let specs = crate::sweep::expand(&axes, invariants, &tag)?;

    let stagger = args
        .stagger
        .map(Duration::from)
        .or(file.stagger)
        .unwrap_or(DEFAULT_STAGGER);
    let log_sink = match args
        .log_dir
        .clone()
        .or_else(|| file.log_dir.clone())
        .or_else(|| defaults.log_dir.clone())
    {
        Some(dir) => LogSink::Directory(dir),
        None => LogSink::Discard,
    };
    let mut backend = LocalProcessBackend::new(log_sink).with_working_dir(file.working_dir.clone());
    if let Some(wrapper) = file.display_wrapper.clone() {
        backend = backend.with_display_wrapper(wrapper);
    }

    Ok(LaunchPlan {
        specs,
        tag,
        stagger,
        backend,
    })
}

/// Resolves once the operator presses Ctrl-C.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        futures::future::pending::<()>().await;
    }
}

async fn run_launch(args: LaunchArgs, defaults: &UserDefaults) -> Result<Outcome> {
    let plan = build_launch_plan(&args, defaults)?;
    let total = plan.specs.len();
    let (out_tx, out_handle) = spawn_output_writer();

    if args.dry_run {
        for spec in &plan.specs {
            let _ = out_tx.send(OutputLine::Stdout(plan.backend.describe(spec)));
        }
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "{total} run(s), tag {}, stagger {}",
            plan.tag,
            humantime::format_duration(plan.stagger)
        )));
        finish_output(out_tx, out_handle).await;
        return Ok(Outcome::Success);
    }

    tracing::info!(runs = total, tag = %plan.tag, "launching sweep");
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SweepEvent>();
    let backend: Arc<dyn ExecutionBackend> = Arc::new(plan.backend);
    let handle = tokio::spawn(orchestrator::launch_sweep(
        backend,
        plan.specs,
        plan.stagger,
        evt_tx,
        interrupted(),
    ));

    while let Some(ev) = evt_rx.recv().await {
        let _ = out_tx.send(event_line(ev, total, args.json));
    }

    let report = handle.await.context("sweep launch task failed")?;
    for failure in &report.failed {
        tracing::debug!(index = failure.index, label = %failure.label, error = ?failure.error, "launch failure");
    }
    tracing::info!(attempted = report.attempted(), "sweep launch finished");

    let summary = crate::text_summary::build_launch_summary(&report, total, &plan.tag);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
    finish_output(out_tx, out_handle).await;
    Ok(launch_outcome(&report))
}

fn build_batch_client(global: &GlobalArgs, defaults: &UserDefaults) -> AwsCliBatch {
    let program = global
        .aws_bin
        .clone()
        .or_else(|| defaults.aws_bin.clone())
        .unwrap_or_else(|| "aws".into());
    AwsCliBatch::new(program)
        .with_region(global.region.clone().or_else(|| defaults.region.clone()))
        .with_profile(global.profile.clone().or_else(|| defaults.profile.clone()))
        .with_timeout(
            global
                .timeout
                .map(Duration::from)
                .or(defaults.timeout)
                .unwrap_or(DEFAULT_BATCH_TIMEOUT),
        )
        .with_page_size(global.page_size)
}

fn build_filter(args: &FilterArgs, defaults: &UserDefaults) -> Result<JobFilter> {
    let queue = args
        .queue
        .clone()
        .or_else(|| defaults.queue.clone())
        .ok_or(ConfigError::Missing("queue"))?;
    let mut filter = JobFilter::new(queue, args.status);
    filter.name_prefix = args.name_prefix.clone();
    Ok(filter)
}

async fn run_list(global: &GlobalArgs, args: ListArgs, defaults: &UserDefaults) -> Result<Outcome> {
    let api = build_batch_client(global, defaults);
    let filter = build_filter(&args.filter, defaults)?;
    let (out_tx, out_handle) = spawn_output_writer();

    let mut jobs = Vec::new();
    let mut count = 0usize;
    let mut stream = std::pin::pin!(orchestrator::list(&api, &filter));
    loop {
        match stream.try_next().await {
            Ok(Some(job)) => {
                count += 1;
                if args.json {
                    jobs.push(job);
                } else {
                    let status = job.status.unwrap_or(filter.status);
                    let _ = out_tx.send(OutputLine::Stdout(format!(
                        "{}\t{}\t{}",
                        job.job_id, job.job_name, status
                    )));
                }
            }
            Ok(None) => break,
            Err(e) => {
                finish_output(out_tx, out_handle).await;
                return Err(e).with_context(|| {
                    format!("failed to list {} jobs on {}", filter.status, filter.queue)
                });
            }
        }
    }

    if args.json {
        let out = serde_json::to_string_pretty(&jobs)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    }
    let _ = out_tx.send(OutputLine::Stderr(format!(
        "{count} {} job(s) on {}",
        filter.status, filter.queue
    )));
    finish_output(out_tx, out_handle).await;
    Ok(Outcome::Success)
}

async fn run_terminate(
    global: &GlobalArgs,
    args: TerminateArgs,
    defaults: &UserDefaults,
) -> Result<Outcome> {
    anyhow::ensure!(!args.reason.trim().is_empty(), "--reason must not be empty");
    let api = build_batch_client(global, defaults);
    let filter = build_filter(&args.filter, defaults)?;
    let (out_tx, out_handle) = spawn_output_writer();

    if args.dry_run {
        let listed: Result<Vec<_>, _> = orchestrator::list(&api, &filter).try_collect().await;
        let listed = match listed {
            Ok(jobs) => jobs,
            Err(e) => {
                finish_output(out_tx, out_handle).await;
                return Err(e).context("failed to list jobs");
            }
        };
        for job in &listed {
            let _ = out_tx.send(OutputLine::Stdout(format!(
                "would terminate {}\t{}",
                job.job_id, job.job_name
            )));
        }
        let _ = out_tx.send(OutputLine::Stderr(format!("{} job(s) matched", listed.len())));
        finish_output(out_tx, out_handle).await;
        return Ok(Outcome::Success);
    }

    let result = orchestrator::terminate_all(
        &api,
        &filter,
        &args.reason,
        args.concurrency,
        |outcome| {
            let line = match &outcome.result {
                Ok(()) => OutputLine::Stdout(format!(
                    "terminated {}\t{}",
                    outcome.job.job_id, outcome.job.job_name
                )),
                Err(e) => OutputLine::Stderr(format!("FAILED {e}")),
            };
            let _ = out_tx.send(line);
        },
    )
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            finish_output(out_tx, out_handle).await;
            return Err(e).with_context(|| {
                format!("failed to list {} jobs on {}", filter.status, filter.queue)
            });
        }
    };

    let summary = crate::text_summary::build_termination_summary(&report);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
    finish_output(out_tx, out_handle).await;
    Ok(termination_outcome(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchApi, JobPage};
    use crate::error::{BackendQueryError, LaunchError, TerminationError};
    use crate::model::JobSummary;
    use clap::CommandFactory;
    use futures::future::BoxFuture;

    /// Backend whose second run fails to start.
    struct SecondRunFails;

    impl ExecutionBackend for SecondRunFails {
        fn submit(&self, spec: &RunSpec) -> Result<SubmittedJob, LaunchError> {
            if spec.index == 1 {
                return Err(LaunchError::MissingExecutor {
                    program: "python".into(),
                });
            }
            Ok(SubmittedJob {
                id: spec.index.to_string(),
                spec: spec.clone(),
                submitted_at: "now".into(),
            })
        }

        fn describe(&self, spec: &RunSpec) -> String {
            spec.label()
        }
    }

    /// Queue with two jobs; terminating `job-b` is rejected.
    struct OneRejection;

    impl BatchApi for OneRejection {
        fn list_jobs<'a>(
            &'a self,
            _queue: &'a str,
            status: JobStatus,
            _next_token: Option<String>,
        ) -> BoxFuture<'a, Result<JobPage, BackendQueryError>> {
            Box::pin(async move {
                let jobs = ["job-a", "job-b"]
                    .into_iter()
                    .map(|id| JobSummary {
                        job_id: id.into(),
                        job_name: format!("sweep__{id}"),
                        status: Some(status),
                    })
                    .collect();
                Ok(JobPage {
                    jobs,
                    next_token: None,
                })
            })
        }

        fn terminate_job<'a>(
            &'a self,
            job_id: &'a str,
            _reason: &'a str,
        ) -> BoxFuture<'a, Result<(), TerminationError>> {
            Box::pin(async move {
                if job_id == "job-b" {
                    Err(TerminationError::Rejected {
                        job_id: job_id.into(),
                        message: "job already finished".into(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn failed_launch_exits_with_code_one() {
        let args = LaunchArgs {
            program: Some(PathBuf::from("train.py")),
            axes: vec![SweepAxis::new("seed", ["1", "2", "3"])],
            tag: Some("t".into()),
            ..Default::default()
        };
        let plan = build_launch_plan(&args, &UserDefaults::default()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let report = orchestrator::launch_sweep(
            Arc::new(SecondRunFails),
            plan.specs,
            Duration::ZERO,
            tx,
            futures::future::pending(),
        )
        .await;
        assert_eq!(report.submitted.len(), 2);
        assert_eq!(report.failed.len(), 1);

        let outcome = launch_outcome(&report);
        assert_eq!(outcome, Outcome::PartialFailure);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(launch_outcome(&LaunchReport::default()).exit_code(), 0);
    }

    #[tokio::test]
    async fn rejected_termination_exits_with_code_one() {
        let filter = JobFilter::new("gpu-queue", JobStatus::Runnable);
        let report = orchestrator::terminate_all(&OneRejection, &filter, "cleanup", 2, |_| {})
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);

        let outcome = termination_outcome(&report);
        assert_eq!(outcome, Outcome::PartialFailure);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(termination_outcome(&TerminationReport::default()).exit_code(), 0);
    }

    fn stderr_text(line: OutputLine) -> String {
        match line {
            OutputLine::Stderr(s) => s,
            OutputLine::Stdout(s) => panic!("expected stderr, got stdout: {s}"),
        }
    }

    #[test]
    fn progress_and_failure_lines_share_numbering() {
        let progress = event_line(
            SweepEvent::Submitting {
                index: 2,
                total: 6,
                label: "t__seed=3".into(),
            },
            6,
            false,
        );
        let failure = event_line(
            SweepEvent::LaunchFailed {
                index: 2,
                label: "t__seed=3".into(),
                error: "executor not found".into(),
            },
            6,
            false,
        );
        assert_eq!(stderr_text(progress), "[3/6] t__seed=3");
        assert_eq!(
            stderr_text(failure),
            "FAILED [3/6] t__seed=3: executor not found"
        );
    }

    #[test]
    fn submitted_line_formats() {
        let args = LaunchArgs {
            program: Some(PathBuf::from("train.py")),
            axes: vec![SweepAxis::new("seed", ["7"])],
            tag: Some("t".into()),
            ..Default::default()
        };
        let spec = build_launch_plan(&args, &UserDefaults::default())
            .unwrap()
            .specs
            .remove(0);
        let job = SubmittedJob {
            id: "123".into(),
            spec,
            submitted_at: "2024-01-01T00:00:00Z".into(),
        };
        assert_eq!(
            submitted_line(&job, false).unwrap(),
            "123\t2024-01-01T00:00:00Z\tt__seed=7"
        );
        let v: serde_json::Value = serde_json::from_str(&submitted_line(&job, true).unwrap()).unwrap();
        assert_eq!(v["id"], "123");
        assert_eq!(v["spec"]["tag"], "t");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_launch_with_axes_and_extra_args() {
        let cli = Cli::try_parse_from([
            "sweeprun",
            "launch",
            "--program",
            "cleanrl/sdm_rl.py",
            "--axis",
            "seed=1,2",
            "--axis",
            "env-id=CartPole-v1, Acrobot-v1",
            "--capture-video",
            "--device",
            "gpu:0",
            "--stagger",
            "500ms",
            "--",
            "--architecture",
            "SDM",
        ])
        .unwrap();
        let Command::Launch(args) = cli.command else {
            panic!("expected launch");
        };
        assert_eq!(args.axes.len(), 2);
        assert_eq!(args.axes[1].values, vec!["CartPole-v1", "Acrobot-v1"]);
        assert_eq!(args.capture_video, Some(true));
        assert_eq!(args.track, None);
        assert_eq!(args.device, Some(Device::GpuIndex(0)));
        assert_eq!(args.extra_args, vec!["--architecture", "SDM"]);
    }

    #[test]
    fn parses_terminate_status_case_insensitively() {
        let cli = Cli::try_parse_from([
            "sweeprun",
            "terminate",
            "--queue",
            "gpu-queue",
            "--status",
            "runnable",
            "--reason",
            "sweep cancelled",
            "--region",
            "us-west-2",
        ])
        .unwrap();
        assert_eq!(cli.global.region.as_deref(), Some("us-west-2"));
        let Command::Terminate(args) = cli.command else {
            panic!("expected terminate");
        };
        assert_eq!(args.filter.status, JobStatus::Runnable);
        assert_eq!(args.concurrency, DEFAULT_TERMINATE_CONCURRENCY);
    }

    #[test]
    fn terminate_requires_reason() {
        let res = Cli::try_parse_from([
            "sweeprun", "terminate", "--queue", "q", "--status", "RUNNING",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn axis_parsing_errors() {
        assert!(parse_axis("seed").is_err());
        assert!(parse_axis("=1,2").is_err());
        assert!(parse_axis("seed=,").is_err());
        assert_eq!(parse_axis("seed=1, 2").unwrap().values, vec!["1", "2"]);
    }

    #[test]
    fn plan_from_cli_only() {
        let args = LaunchArgs {
            program: Some(PathBuf::from("cleanrl/sdm_rl.py")),
            axes: vec![
                SweepAxis::new("seed", ["1", "2"]),
                SweepAxis::new("env-id", ["A", "B", "C"]),
            ],
            tag: Some("sweep-x".into()),
            ..Default::default()
        };
        let plan = build_launch_plan(&args, &UserDefaults::default()).unwrap();
        assert_eq!(plan.specs.len(), 6);
        assert_eq!(plan.tag, "sweep-x");
        assert_eq!(plan.stagger, DEFAULT_STAGGER);
        let first = &plan.specs[0];
        assert_eq!(first.invariants.exp_name, "sdm_rl");
        assert_eq!(first.invariants.total_timesteps, DEFAULT_TOTAL_TIMESTEPS);
        assert_eq!(first.label(), "sweep-x__seed=1__env-id=A");
    }

    #[test]
    fn plan_requires_program() {
        let err = build_launch_plan(&LaunchArgs::default(), &UserDefaults::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("program"));
    }

    #[test]
    fn generated_tag_uses_exp_name() {
        let tag = gen_sweep_tag("sdm_rl");
        assert!(tag.starts_with("sdm_rl-"));
        assert_eq!(tag.len(), "sdm_rl-".len() + 8);
    }

    #[test]
    fn filter_falls_back_to_default_queue() {
        let args = FilterArgs {
            queue: None,
            status: JobStatus::Pending,
            name_prefix: None,
        };
        assert!(build_filter(&args, &UserDefaults::default()).is_err());
        let defaults = UserDefaults {
            queue: Some("default-q".into()),
            ..Default::default()
        };
        assert_eq!(build_filter(&args, &defaults).unwrap().queue, "default-q");
    }
}
