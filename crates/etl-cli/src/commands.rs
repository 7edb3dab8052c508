use anyhow::{Context, Result};
use etl_ingest::{ExportDirSource, RecordSource};
use etl_model::{EmptyRowPolicy, LoadOptions, Schema};
use etl_rules::RuleCompiler;
use etl_runner::{
    RulesSpec, SourceSpec, TargetSpec, Task, Workflow, WorkflowReport, WorkflowRunner,
    load_workflow,
};
use etl_storage::Dialect;
use tracing::{info, info_span};

use crate::cli::{LoadArgs, RulesArgs, RunArgs, SchemaArgs, SourceArgs};

/// Name of the single task built by `load`.
pub const LOAD_TASK: &str = "load";

pub fn run_workflow(args: &RunArgs) -> Result<WorkflowReport> {
    let workflow = load_workflow(&args.config)
        .with_context(|| format!("load workflow {}", args.config.display()))?;
    Ok(WorkflowRunner::new().run(&workflow))
}

pub fn run_load(args: &LoadArgs) -> Result<WorkflowReport> {
    let workflow = Workflow::new(LOAD_TASK).with_task(load_task(args));
    Ok(WorkflowRunner::new().run(&workflow))
}

/// Translate `load` flags into a task.
pub fn load_task(args: &LoadArgs) -> Task {
    let empty_rows = if args.keep_empty_rows {
        EmptyRowPolicy::Keep
    } else {
        EmptyRowPolicy::Skip
    };
    let options = LoadOptions::new()
        .with_batch_size(args.batch_size)
        .with_empty_rows(empty_rows)
        .with_strict(args.strict)
        .with_label_views(!args.no_label_views)
        .with_lookup_table(args.lookup_table.clone());
    let rules = args
        .rules
        .clone()
        .map_or(RulesSpec::Generate, RulesSpec::File);
    Task::new(
        LOAD_TASK,
        source_spec(&args.source),
        TargetSpec::new(args.target, args.connection.clone()).with_script(args.script.clone()),
    )
    .with_rules(rules)
    .with_options(options)
}

/// Generated rules in rule-file syntax.
pub fn run_rules(args: &RulesArgs) -> Result<String> {
    let span = info_span!("rules", source = %args.source.source.display());
    let _guard = span.enter();
    let mut source = open_source(&args.source)?;
    let metadata = source.metadata().context("read project metadata")?;
    let options = LoadOptions::new().with_complete_fields(args.complete_fields);
    let rules = RuleCompiler::new(&metadata)
        .generate(&options)
        .context("generate rules")?;
    Ok(rules.to_rules_text())
}

pub fn run_schema(args: &SchemaArgs) -> Result<Schema> {
    let span = info_span!("schema", source = %args.source.source.display());
    let _guard = span.enter();
    let rules = args
        .rules
        .clone()
        .map_or(RulesSpec::Generate, RulesSpec::File);
    // Planning never opens the target.
    let task = Task::new(
        "schema",
        source_spec(&args.source),
        TargetSpec::new(Dialect::Sqlite, ":memory:"),
    )
    .with_rules(rules);
    let plan = task.plan().context("build schema")?;
    info!(tables = plan.schema.tables().len(), "built schema");
    Ok(plan.schema)
}

fn source_spec(args: &SourceArgs) -> SourceSpec {
    SourceSpec::ExportDir {
        dir: args.source.clone(),
        format: args.format,
    }
}

fn open_source(args: &SourceArgs) -> Result<ExportDirSource> {
    match args.format {
        Some(format) => Ok(ExportDirSource::new(args.source.clone(), format)),
        None => ExportDirSource::detect(args.source.clone())
            .with_context(|| format!("open export {}", args.source.display())),
    }
}
