use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// One varying dimension of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl SweepAxis {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Command-line flag the training program expects for this axis.
    pub fn flag(&self) -> String {
        axis_flag(&self.name)
    }
}

pub(crate) fn axis_flag(name: &str) -> String {
    format!("--{}", name.trim_start_matches('-').replace('_', "-"))
}

/// Compute device requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    Cpu,
    /// Any GPU the host exposes; the environment is left untouched.
    #[default]
    Gpu,
    GpuIndex(u32),
}

impl Device {
    /// Value for `CUDA_VISIBLE_DEVICES`, if the device pins one.
    pub fn visible_devices(self) -> Option<String> {
        match self {
            Device::Cpu => Some(String::new()),
            Device::Gpu => None,
            Device::GpuIndex(i) => Some(i.to_string()),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" => Ok(Device::Gpu),
            other => {
                let idx = other
                    .strip_prefix("gpu:")
                    .or_else(|| other.strip_prefix("cuda:"))
                    .ok_or_else(|| format!("unknown device `{other}` (expected cpu, gpu or gpu:N)"))?;
                idx.parse::<u32>()
                    .map(Device::GpuIndex)
                    .map_err(|_| format!("invalid GPU index `{idx}`"))
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
            Device::GpuIndex(i) => write!(f, "gpu:{i}"),
        }
    }
}

impl Serialize for Device {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parameters shared by every run of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantParams {
    pub program: PathBuf,
    pub interpreter: Option<String>,
    pub exp_name: String,
    pub total_timesteps: u64,
    pub capture_video: bool,
    pub track: bool,
    pub wandb_project_name: Option<String>,
    pub wandb_entity: Option<String>,
    pub device: Device,
    pub headless: bool,
    pub extra_args: Vec<String>,
}

impl InvariantParams {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--exp-name".to_string(),
            self.exp_name.clone(),
            "--total-timesteps".to_string(),
            self.total_timesteps.to_string(),
        ];
        if self.capture_video {
            args.push("--capture-video".into());
        }
        if self.track {
            args.push("--track".into());
        }
        if let Some(project) = &self.wandb_project_name {
            args.push("--wandb-project-name".into());
            args.push(project.clone());
        }
        if let Some(entity) = &self.wandb_entity {
            args.push("--wandb-entity".into());
            args.push(entity.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// One concrete combination of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSpec {
    /// Position in sweep order, starting at 0.
    pub index: usize,
    pub tag: String,
    pub axis_values: Vec<(String, String)>,
    pub invariants: Arc<InvariantParams>,
}

impl RunSpec {
    /// Arguments for the training program, excluding the program itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.axis_values.len() * 2 + 8);
        for (axis, value) in &self.axis_values {
            args.push(axis_flag(axis));
            args.push(value.clone());
        }
        args.extend(self.invariants.args());
        args
    }

    /// Human-readable identity used in logs, reports and log file names.
    pub fn label(&self) -> String {
        let mut label = self.tag.clone();
        for (axis, value) in &self.axis_values {
            label.push_str("__");
            label.push_str(axis.trim_start_matches('-'));
            label.push('=');
            label.push_str(value);
        }
        label
    }

    /// Full command line (wrapper, interpreter, program and arguments) for display.
    pub fn command_line(&self, display_wrapper: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.invariants.headless {
            if let Some(wrapper) = display_wrapper {
                parts.push(wrapper.to_string());
            }
        }
        if let Some(interp) = &self.invariants.interpreter {
            parts.push(interp.clone());
        }
        parts.push(self.invariants.program.display().to_string());
        parts.extend(self.args().into_iter().map(|a| shell_quote(&a)));
        parts.join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/=+@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Handle returned by an execution backend once a run has been started.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedJob {
    pub id: String,
    pub spec: RunSpec,
    pub submitted_at: String,
}

/// Events emitted while a sweep is being launched.
#[derive(Debug, Clone)]
pub enum SweepEvent {
    Submitting { index: usize, total: usize, label: String },
    Submitted(Box<SubmittedJob>),
    LaunchFailed { index: usize, label: String, error: String },
    Info(String),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_api_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Runnable => "RUNNABLE",
            JobStatus::Starting => "STARTING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Selects a population of jobs on the batch-compute queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub queue: String,
    pub status: JobStatus,
    /// Only jobs whose name starts with this prefix.
    pub name_prefix: Option<String>,
}

impl JobFilter {
    pub fn new(queue: impl Into<String>, status: JobStatus) -> Self {
        Self {
            queue: queue.into(),
            status,
            name_prefix: None,
        }
    }

    pub fn matches_name(&self, job_name: &str) -> bool {
        self.name_prefix
            .as_deref()
            .map_or(true, |prefix| job_name.starts_with(prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub job_name: String,
    pub status: Option<JobStatus>,
}
