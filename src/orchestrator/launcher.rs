//! Staggered sweep submission.
//!
//! Each run is handed to the backend on its own blocking task so a launch
//! failure comes back as a typed result. Results are reported in sweep order.

use crate::engine::ExecutionBackend;
use crate::error::LaunchError;
use crate::model::{RunSpec, SubmittedJob, SweepEvent};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Interval, MissedTickBehavior};

/// Rate limit between successive submissions. The first tick is immediate.
pub(crate) struct Stagger {
    interval: Option<Interval>,
}

impl Stagger {
    pub(crate) fn new(delay: Duration) -> Self {
        let interval = (!delay.is_zero()).then(|| {
            let mut i = tokio::time::interval(delay);
            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
            i
        });
        Self { interval }
    }

    pub(crate) async fn ready(&mut self) {
        if let Some(i) = self.interval.as_mut() {
            i.tick().await;
        }
    }
}

#[derive(Debug)]
pub(crate) struct LaunchFailure {
    pub index: usize,
    pub label: String,
    pub error: LaunchError,
}

#[derive(Debug, Default)]
pub(crate) struct LaunchReport {
    pub submitted: Vec<SubmittedJob>,
    pub failed: Vec<LaunchFailure>,
    /// Runs never attempted because the sweep was interrupted.
    pub skipped: usize,
}

impl LaunchReport {
    pub(crate) fn attempted(&self) -> usize {
        self.submitted.len() + self.failed.len()
    }

    pub(crate) fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }

    fn record(
        &mut self,
        index: usize,
        label: String,
        result: Result<SubmittedJob, LaunchError>,
        event_tx: &UnboundedSender<SweepEvent>,
    ) {
        match result {
            Ok(job) => {
                tracing::info!(%label, id = %job.id, "run submitted");
                let _ = event_tx.send(SweepEvent::Submitted(Box::new(job.clone())));
                self.submitted.push(job);
            }
            Err(error) => {
                tracing::warn!(%label, error = %error, "run failed to launch");
                let _ = event_tx.send(SweepEvent::LaunchFailed {
                    index,
                    label: label.clone(),
                    error: error.to_string(),
                });
                self.failed.push(LaunchFailure {
                    index,
                    label,
                    error,
                });
            }
        }
    }
}

struct InFlight {
    index: usize,
    label: String,
    handle: JoinHandle<Result<SubmittedJob, LaunchError>>,
}

impl InFlight {
    async fn join(self) -> (usize, String, Result<SubmittedJob, LaunchError>) {
        let result = match self.handle.await {
            Ok(r) => r,
            Err(e) => Err(LaunchError::Join {
                label: self.label.clone(),
                message: e.to_string(),
            }),
        };
        (self.index, self.label, result)
    }
}

/// Submit every run in order, separated by `stagger`.
///
/// A failed launch never stops the sweep. When `interrupt` resolves, no further
/// runs are submitted; runs already started keep going.
pub(crate) async fn launch_sweep<F>(
    backend: Arc<dyn ExecutionBackend>,
    specs: Vec<RunSpec>,
    stagger: Duration,
    event_tx: UnboundedSender<SweepEvent>,
    interrupt: F,
) -> LaunchReport
where
    F: Future<Output = ()>,
{
    let total = specs.len();
    let mut report = LaunchReport::default();
    let mut ticker = Stagger::new(stagger);
    let mut in_flight: VecDeque<InFlight> = VecDeque::new();
    let mut queue = specs.into_iter();
    let mut interrupt = std::pin::pin!(interrupt);

    while let Some(spec) = queue.next() {
        tokio::select! {
            biased;
            _ = &mut interrupt => {
                report.skipped = 1 + queue.len();
                let _ = event_tx.send(SweepEvent::Info(format!(
                    "Interrupted: {} run(s) not submitted",
                    report.skipped
                )));
                break;
            }
            _ = ticker.ready() => {}
        }

        // Report finished launches before starting the next one.
        while in_flight.front().is_some_and(|f| f.handle.is_finished()) {
            if let Some(done) = in_flight.pop_front() {
                let (index, label, result) = done.join().await;
                report.record(index, label, result, &event_tx);
            }
        }

        let index = spec.index;
        let label = spec.label();
        let _ = event_tx.send(SweepEvent::Submitting {
            index,
            total,
            label: label.clone(),
        });
        let backend = backend.clone();
        let handle = tokio::task::spawn_blocking(move || backend.submit(&spec));
        in_flight.push_back(InFlight {
            index,
            label,
            handle,
        });
    }

    for pending in in_flight {
        let (index, label, result) = pending.join().await;
        report.record(index, label, result, &event_tx);
    }
    report
}
