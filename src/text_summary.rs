//! Text summaries for CLI output.
//!
//! Aggregate lines printed after a launch or termination batch. Per-item
//! results are printed as they happen by the CLI.

use crate::orchestrator::{LaunchReport, TerminationReport};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_launch_summary(report: &LaunchReport, total: usize, tag: &str) -> TextSummary {
    let lines = vec![
        format!(
            "Launched {} of {} run(s): {} failed, {} skipped",
            report.submitted.len(),
            total,
            report.failed.len(),
            report.skipped
        ),
        format!("Sweep tag: {tag}"),
    ];
    TextSummary { lines }
}

pub(crate) fn build_termination_summary(report: &TerminationReport) -> TextSummary {
    TextSummary {
        lines: vec![format!(
            "Terminated {} of {} job(s): {} failed",
            report.succeeded(),
            report.listed(),
            report.failed()
        )],
    }
}
