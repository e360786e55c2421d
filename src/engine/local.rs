use crate::engine::{now_rfc3339, ExecutionBackend, LogSink};
use crate::error::LaunchError;
use crate::model::{RunSpec, SubmittedJob};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Default virtual display wrapper for headless rendering.
pub const DEFAULT_DISPLAY_WRAPPER: &[&str] = &["xvfb-run", "-a"];

/// Runs each sweep run as a detached OS process on this host.
#[derive(Debug, Clone)]
pub struct LocalProcessBackend {
    display_wrapper: Vec<String>,
    log_sink: LogSink,
    working_dir: Option<PathBuf>,
}

impl Default for LocalProcessBackend {
    fn default() -> Self {
        Self {
            display_wrapper: DEFAULT_DISPLAY_WRAPPER.iter().map(|s| s.to_string()).collect(),
            log_sink: LogSink::Discard,
            working_dir: None,
        }
    }
}

impl LocalProcessBackend {
    pub fn new(log_sink: LogSink) -> Self {
        Self {
            log_sink,
            ..Default::default()
        }
    }

    pub fn with_display_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.display_wrapper = wrapper;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Program plus arguments: display wrapper, interpreter, script, run args.
    fn argv(&self, spec: &RunSpec) -> Vec<String> {
        let inv = &spec.invariants;
        let mut argv = Vec::new();
        if inv.headless {
            argv.extend(self.display_wrapper.iter().cloned());
        }
        if let Some(interp) = &inv.interpreter {
            argv.push(interp.clone());
        }
        argv.push(inv.program.display().to_string());
        argv.extend(spec.args());
        argv
    }

    fn open_sink(&self, spec: &RunSpec) -> Result<(Stdio, Stdio), LaunchError> {
        match &self.log_sink {
            LogSink::Discard => Ok((Stdio::null(), Stdio::null())),
            LogSink::Directory(dir) => {
                let path = dir.join(log_file_name(spec));
                let file = open_log(dir, &path).map_err(|source| LaunchError::LogSink {
                    path: path.clone(),
                    source,
                })?;
                let err = file
                    .try_clone()
                    .map_err(|source| LaunchError::LogSink { path, source })?;
                Ok((Stdio::from(file), Stdio::from(err)))
            }
        }
    }
}

fn open_log(dir: &Path, path: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// `<index>__<label>.log`; the index keeps runs apart when sanitised labels collide.
fn log_file_name(spec: &RunSpec) -> String {
    format!("{:04}__{}.log", spec.index, file_safe(&spec.label()))
}

/// Replace characters that are awkward in file names.
fn file_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "-_.=".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ExecutionBackend for LocalProcessBackend {
    fn submit(&self, spec: &RunSpec) -> Result<SubmittedJob, LaunchError> {
        let label = spec.label();
        let argv = self.argv(spec);
        if let Some(bad) = argv.iter().find(|a| a.contains('\0')) {
            return Err(LaunchError::InvalidArgument {
                label,
                reason: format!("argument {bad:?} contains a NUL byte"),
            });
        }
        let Some((program, args)) = argv.split_first() else {
            return Err(LaunchError::InvalidArgument {
                label,
                reason: "empty command".into(),
            });
        };
        if program.is_empty() {
            return Err(LaunchError::InvalidArgument {
                label,
                reason: "program path is empty".into(),
            });
        }

        let (stdout, stderr) = self.open_sink(spec)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .env("SWEEPRUN_TAG", &spec.tag)
            .env("SWEEPRUN_RUN_LABEL", &label)
            // Never tie the run's lifetime to ours.
            .kill_on_drop(false);
        if let Some(devices) = spec.invariants.device.visible_devices() {
            cmd.env("CUDA_VISIBLE_DEVICES", devices);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group: a Ctrl-C aimed at the orchestrator does not reach the run.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LaunchError::MissingExecutor {
                    program: program.clone(),
                }
            } else {
                LaunchError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;
        let id = child
            .id()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "exited".into());
        tracing::debug!(%label, pid = %id, "spawned detached run");
        drop(child);

        Ok(SubmittedJob {
            id,
            spec: spec.clone(),
            submitted_at: now_rfc3339(),
        })
    }

    fn describe(&self, spec: &RunSpec) -> String {
        let wrapper = self.display_wrapper.join(" ");
        let mut line = spec.command_line(Some(wrapper.as_str()));
        if let Some(devices) = spec.invariants.device.visible_devices() {
            line = format!("CUDA_VISIBLE_DEVICES={devices:?} {line}");
        }
        line
    }
}
