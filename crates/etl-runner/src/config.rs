//! Workflow files.
//!
//! ```toml
//! [workflow]
//! name = "nightly"
//!
//! [[tasks]]
//! name = "visits"
//! rules_file = "rules.txt"
//!
//! [tasks.source]
//! dir = "export"
//! format = "csv"
//!
//! [tasks.target]
//! kind = "sqlite"
//! connection = "out/visits.db"
//!
//! [tasks.options]
//! batch_size = 100
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use etl_ingest::RecordFormat;
use etl_model::{EtlError, LoadOptions, Result};
use etl_storage::Dialect;
use serde::Deserialize;
use tracing::info;

use crate::task::{RulesSpec, SourceSpec, TargetSpec, Task};
use crate::workflow::Workflow;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSection {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub independent: bool,
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub options: LoadOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub kind: String,
    pub connection: String,
    #[serde(default)]
    pub script: Option<PathBuf>,
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl WorkflowConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|error| EtlError::config(format!("invalid workflow file: {error}")))
    }

    /// Check the settings and build the workflow, resolving paths against
    /// `base`.
    pub fn into_workflow(self, base: &Path) -> Result<Workflow> {
        if self.workflow.name.trim().is_empty() {
            return Err(EtlError::config("workflow name is empty"));
        }
        if self.tasks.is_empty() {
            return Err(EtlError::config(format!(
                "workflow `{}` declares no tasks",
                self.workflow.name
            )));
        }
        let mut names = BTreeSet::new();
        let mut workflow = Workflow::new(self.workflow.name);
        for task in self.tasks {
            if task.name.trim().is_empty() {
                return Err(EtlError::config("task name is empty"));
            }
            if !names.insert(task.name.clone()) {
                return Err(EtlError::config(format!(
                    "duplicate task name `{}`",
                    task.name
                )));
            }
            workflow = workflow.with_task(task.into_task(base)?);
        }
        Ok(workflow)
    }
}

impl TaskConfig {
    fn into_task(self, base: &Path) -> Result<Task> {
        let context = |error: EtlError| {
            EtlError::config(format!("task `{}`: {}", self.name, error.message()))
        };
        if self.options.batch_size == 0 {
            return Err(context(EtlError::config("batch_size must be at least 1")));
        }
        let format = self
            .source
            .format
            .as_deref()
            .map(str::parse::<RecordFormat>)
            .transpose()
            .map_err(context)?;
        let dialect = self.target.kind.parse::<Dialect>().map_err(context)?;
        let connection = if dialect.is_server() || self.target.connection == ":memory:" {
            self.target.connection.clone()
        } else {
            resolve(base, Path::new(&self.target.connection))
                .display()
                .to_string()
        };
        let script = self.target.script.as_deref().map(|path| resolve(base, path));
        if script.is_some() && !dialect.is_server() {
            return Err(context(EtlError::config(format!(
                "{dialect} targets do not take a script path"
            ))));
        }
        let rules = match &self.rules_file {
            Some(path) => RulesSpec::File(resolve(base, path)),
            None => RulesSpec::Generate,
        };
        Ok(Task::new(
            self.name.clone(),
            SourceSpec::ExportDir {
                dir: resolve(base, &self.source.dir),
                format,
            },
            TargetSpec::new(dialect, connection).with_script(script),
        )
        .with_rules(rules)
        .with_options(self.options)
        .with_independent(self.independent))
    }
}

/// Load a workflow file.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let text = std::fs::read_to_string(path).map_err(|error| {
        EtlError::config(format!("cannot read workflow file {}: {error}", path.display()))
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let workflow = WorkflowConfig::parse(&text)?.into_workflow(base)?;
    info!(
        path = %path.display(),
        workflow = %workflow.name,
        tasks = workflow.tasks.len(),
        "loaded workflow"
    );
    Ok(workflow)
}
