//! Run summary.
//!
//! [`BuildReport::aggregate`] is a pure reduction over build and push
//! results: same inputs, same report.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BuildOutcome, BuildResult, PushOutcome, PushResult};

/// Overall status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Build result paired with its push result, if a push was attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    pub build: BuildResult,
    pub push: Option<PushResult>,
}

impl ReportEntry {
    /// Whether this recipe made it all the way into the registry.
    pub fn succeeded(&self) -> bool {
        self.build.is_built() && self.push.as_ref().is_some_and(PushResult::is_pushed)
    }
}

/// Per-outcome counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportCounts {
    pub built: usize,
    pub build_failed: usize,
    pub pushed: usize,
    pub push_failed: usize,
}

/// Aggregated, immutable view of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReport {
    entries: Vec<ReportEntry>,
    counts: ReportCounts,
    status: RunStatus,
}

impl BuildReport {
    /// Pair every build with the push for the same recipe and derive the
    /// overall status. Success requires every build to be `Built` and every
    /// built image to be `Pushed`.
    pub fn aggregate(builds: &[BuildResult], pushes: &[PushResult]) -> Self {
        let entries: Vec<ReportEntry> = builds
            .iter()
            .map(|build| ReportEntry {
                build: build.clone(),
                push: pushes.iter().find(|p| p.recipe == build.recipe).cloned(),
            })
            .collect();

        let mut counts = ReportCounts::default();
        for entry in &entries {
            match entry.build.outcome {
                BuildOutcome::Built => counts.built += 1,
                BuildOutcome::BuildFailed => counts.build_failed += 1,
            }
            match entry.push.as_ref().map(|p| p.outcome) {
                Some(PushOutcome::Pushed) => counts.pushed += 1,
                Some(PushOutcome::PushFailed) => counts.push_failed += 1,
                None => {}
            }
        }

        let status = if entries.iter().all(ReportEntry::succeeded) {
            RunStatus::Success
        } else {
            RunStatus::Failure
        };

        Self {
            entries,
            counts,
            status,
        }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn counts(&self) -> ReportCounts {
        self.counts
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }

    /// Human-readable summary, one line per recipe followed by the counts.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();

        if self.entries.is_empty() {
            out.push_str("No changed recipes; nothing to build.\n");
        }

        for entry in &self.entries {
            let build = &entry.build;
            let line = match (&build.outcome, &entry.push) {
                (BuildOutcome::BuildFailed, _) if build.timed_out => {
                    format!("build timed out (log: {})", build.log_path.display())
                }
                (BuildOutcome::BuildFailed, _) => format!(
                    "build failed, exit code {} (log: {})",
                    build.exit_code,
                    build.log_path.display()
                ),
                (BuildOutcome::Built, None) => "built, push not attempted".to_string(),
                (BuildOutcome::Built, Some(push)) if push.is_pushed() => {
                    format!("built and pushed as {}", push.tag)
                }
                (BuildOutcome::Built, Some(push)) if push.timed_out => {
                    format!("built, push of {} timed out", push.tag)
                }
                (BuildOutcome::Built, Some(push)) => format!(
                    "built, push of {} failed with exit code {} after {} attempt(s)",
                    push.tag, push.exit_code, push.attempts
                ),
            };
            let mark = if entry.succeeded() { "✓" } else { "✗" };
            let _ = writeln!(out, "  {} {}: {}", mark, build.recipe.tag(), line);
        }

        let c = &self.counts;
        let _ = writeln!(
            out,
            "\nSummary: {} built, {} build failed, {} pushed, {} push failed",
            c.built, c.build_failed, c.pushed, c.push_failed
        );
        let _ = writeln!(
            out,
            "Status: {}",
            match self.status {
                RunStatus::Success => "SUCCESS",
                RunStatus::Failure => "FAILURE",
            }
        );
        out
    }
}

/// Report artifact written for CI collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub report: BuildReport,
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &BuildReport) -> Result<()> {
    let artifact = ReportArtifact {
        schema_version: "1.0".to_string(),
        generated_at: Utc::now(),
        report: report.clone(),
    };
    let content = serde_json::to_string_pretty(&artifact).context("serialize build report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
