use std::{fmt, time::Duration};

use crate::target::Target;

/// Result of running one job. Produced exactly once per job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobOutcome {
    Success,
    /// The orchestrator stopped waiting; the worker may still be running.
    Timeout,
    Cancelled,
    Error(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Timeout => "timeout",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Error(_) => "error",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Error(reason) => write!(f, "error: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Per-target entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobReport {
    /// Position of the target in the submitted job list.
    pub index: usize,
    pub target: Target,
    pub outcome: JobOutcome,
    /// Jitter delay drawn for this job before it was dispatched.
    pub start_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutcomeSummary {
    pub success: usize,
    pub timeout: usize,
    pub cancelled: usize,
    pub error: usize,
}

impl OutcomeSummary {
    pub fn total(&self) -> usize {
        self.success + self.timeout + self.cancelled + self.error
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} timed out, {} cancelled, {} failed",
            self.success, self.timeout, self.cancelled, self.error
        )
    }
}

/// Outcome of a whole run, one entry per submitted job in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    /// Set when the run ended through the global cancellation path.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// First outcome recorded for `target`.
    pub fn outcome_for(&self, target: &str) -> Option<&JobOutcome> {
        self.jobs
            .iter()
            .find(|job| job.target.as_str() == target)
            .map(|job| &job.outcome)
    }

    pub fn summary(&self) -> OutcomeSummary {
        self.jobs
            .iter()
            .fold(OutcomeSummary::default(), |mut acc, job| {
                match job.outcome {
                    JobOutcome::Success => acc.success += 1,
                    JobOutcome::Timeout => acc.timeout += 1,
                    JobOutcome::Cancelled => acc.cancelled += 1,
                    JobOutcome::Error(_) => acc.error += 1,
                }
                acc
            })
    }
}
