//! Tasks and workflows.
//!
//! A [`Task`] takes one source through rules, schema and transformer into
//! one storage target. A [`Workflow`] runs tasks in order.

pub mod config;
pub mod report;
pub mod task;
pub mod workflow;

pub use config::{WorkflowConfig, load_workflow};
pub use report::{TaskFailure, TaskOutcome, TaskReport, WorkflowReport};
pub use task::{RulesSpec, SourceSpec, TargetSpec, Task, TaskPlan};
pub use workflow::{Workflow, WorkflowRunner};
