use tracing::{info, info_span, warn};

use crate::report::{TaskOutcome, WorkflowReport};
use crate::task::Task;

/// An ordered list of tasks.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub tasks: Vec<Task>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

/// Runs the tasks of a workflow in order.
///
/// A failed task stops every later task that is not marked independent;
/// those are reported as skipped. Failures of independent tasks stop
/// nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowRunner;

impl WorkflowRunner {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, workflow: &Workflow) -> WorkflowReport {
        let span = info_span!("workflow", workflow = %workflow.name);
        let _guard = span.enter();
        info!(tasks = workflow.tasks.len(), "starting workflow");

        let mut aborted_by: Option<String> = None;
        let mut outcomes = Vec::with_capacity(workflow.tasks.len());
        for task in &workflow.tasks {
            if let Some(failed) = &aborted_by {
                if !task.independent {
                    warn!(task = %task.name, after = %failed, "skipping task");
                    outcomes.push((
                        task.name.clone(),
                        TaskOutcome::Skipped {
                            after: failed.clone(),
                        },
                    ));
                    continue;
                }
            }
            let outcome = match task.run() {
                Ok(report) => TaskOutcome::Succeeded(report),
                Err(failure) => {
                    if !task.independent && aborted_by.is_none() {
                        aborted_by = Some(task.name.clone());
                    }
                    TaskOutcome::Failed(failure)
                }
            };
            outcomes.push((task.name.clone(), outcome));
        }

        let report = WorkflowReport {
            workflow: workflow.name.clone(),
            outcomes,
        };
        info!(
            succeeded = report.count("succeeded"),
            failed = report.count("failed"),
            skipped = report.count("skipped"),
            "workflow finished"
        );
        report
    }
}
