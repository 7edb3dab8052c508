use std::collections::BTreeMap;
use std::time::Duration;

use etl_model::{ErrorKind, EtlError};
use thiserror::Error;

/// Result of a task that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: String,
    pub target: String,
    pub records: usize,
    /// Rows stored per table, every schema table included.
    pub rows: BTreeMap<String, usize>,
    pub lookup_rows: usize,
    pub views: usize,
    /// Recovered record problems, already logged.
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl TaskReport {
    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Why a task stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task `{task}` failed: {message}")]
pub struct TaskFailure {
    pub task: String,
    pub kind: ErrorKind,
    /// Full error text, location included.
    pub message: String,
    pub table: Option<String>,
    pub batch: Option<usize>,
}

impl TaskFailure {
    pub fn new(task: &str, error: &EtlError) -> Self {
        Self {
            task: task.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            table: error.table().map(str::to_string),
            batch: error.batch(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(TaskReport),
    Failed(TaskFailure),
    /// Not run because an earlier dependent task failed.
    Skipped { after: String },
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded(_) => "succeeded",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub workflow: String,
    /// `(task name, outcome)` in run order.
    pub outcomes: Vec<(String, TaskOutcome)>,
}

impl WorkflowReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, TaskOutcome::Succeeded(_)))
    }

    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.outcomes.iter().filter_map(|(_, outcome)| match outcome {
            TaskOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }
}
