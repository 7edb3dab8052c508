//! One extract, transform and load run.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use etl_ingest::{ExportDirSource, MemorySource, RecordFormat, RecordSource};
use etl_model::{EtlError, LoadOptions, ProjectMetadata, Result, Schema};
use etl_rules::{RuleCompiler, RuleSet};
use etl_schema::{SchemaBuilder, lookup_rows, lookup_table_definition};
use etl_storage::{Dialect, StorageDriver, TargetOptions, open_driver};
use etl_transform::{RecordTransformer, RowBuffers, TransformOutcome};
use tracing::{debug, info, info_span, warn};

use crate::report::{TaskFailure, TaskReport};

/// Where a task reads metadata and records from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Export directory; the format is detected when not given.
    ExportDir {
        dir: PathBuf,
        format: Option<RecordFormat>,
    },
    Memory(MemorySource),
}

impl SourceSpec {
    fn open(&self) -> Result<Box<dyn RecordSource>> {
        match self {
            SourceSpec::ExportDir {
                dir,
                format: Some(format),
            } => Ok(Box::new(ExportDirSource::new(dir.clone(), *format))),
            SourceSpec::ExportDir { dir, format: None } => {
                Ok(Box::new(ExportDirSource::detect(dir.clone())?))
            }
            SourceSpec::Memory(source) => Ok(Box::new(source.clone())),
        }
    }
}

/// Transformation rules of a task.
#[derive(Debug, Clone, Default)]
pub enum RulesSpec {
    /// Derive the rules from the project metadata.
    #[default]
    Generate,
    File(PathBuf),
    Text(String),
}

impl RulesSpec {
    fn text(&self) -> Result<Option<String>> {
        match self {
            RulesSpec::Generate => Ok(None),
            RulesSpec::Text(text) => Ok(Some(text.clone())),
            RulesSpec::File(path) => fs::read_to_string(path).map(Some).map_err(|error| {
                EtlError::config(format!("cannot read rules file {}: {error}", path.display()))
            }),
        }
    }
}

/// Storage target of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub dialect: Dialect,
    pub connection: String,
    /// Write server-dialect SQL here instead of connecting.
    pub script: Option<PathBuf>,
}

impl TargetSpec {
    pub fn new(dialect: Dialect, connection: impl Into<String>) -> Self {
        Self {
            dialect,
            connection: connection.into(),
            script: None,
        }
    }

    #[must_use]
    pub fn with_script(mut self, script: Option<PathBuf>) -> Self {
        self.script = script;
        self
    }
}

/// Metadata, rules and schema of a task, computed without touching storage.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub metadata: ProjectMetadata,
    pub rules: RuleSet,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub source: SourceSpec,
    pub target: TargetSpec,
    pub rules: RulesSpec,
    pub options: LoadOptions,
    /// A failure of this task does not stop the tasks after it.
    pub independent: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, source: SourceSpec, target: TargetSpec) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            rules: RulesSpec::Generate,
            options: LoadOptions::default(),
            independent: false,
        }
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RulesSpec) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_independent(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    /// Fetch metadata, compile the rules and build the schema.
    pub fn plan(&self) -> Result<TaskPlan> {
        let mut source = self.source.open()?;
        self.plan_from(source.as_mut())
    }

    fn plan_from(&self, source: &mut dyn RecordSource) -> Result<TaskPlan> {
        let metadata = source.metadata()?;
        let text = self.rules.text()?;
        let rules = RuleCompiler::new(&metadata).compile_or_generate(text.as_deref(), &self.options)?;
        let schema = SchemaBuilder::new(&metadata).build(&rules)?;
        if let Some(name) = &self.options.lookup_table {
            if schema.table(name).is_some() {
                return Err(EtlError::config(format!(
                    "lookup table `{name}` collides with a schema table"
                )));
            }
        }
        Ok(TaskPlan {
            metadata,
            rules,
            schema,
        })
    }

    /// Run the task. Storage is released on every exit path.
    pub fn run(&self) -> std::result::Result<TaskReport, TaskFailure> {
        let span = info_span!("task", task = %self.name, target = %self.target.dialect);
        let _guard = span.enter();
        let started = Instant::now();
        match self.execute() {
            Ok(mut report) => {
                report.duration = started.elapsed();
                info!(
                    records = report.records,
                    rows = report.total_rows(),
                    warnings = report.warnings.len(),
                    elapsed_ms = report.duration.as_millis() as u64,
                    "task finished"
                );
                Ok(report)
            }
            Err(error) => {
                let failure = TaskFailure::new(&self.name, &error);
                warn!(kind = %failure.kind, "{}", failure.message);
                Err(failure)
            }
        }
    }

    fn execute(&self) -> Result<TaskReport> {
        if self.options.batch_size == 0 {
            return Err(EtlError::config("batch_size must be at least 1"));
        }

        // =====================================================================
        // Stage 1: Metadata, rules and schema
        // =====================================================================
        let mut source = self.source.open()?;
        let plan = info_span!("plan").in_scope(|| self.plan_from(source.as_mut()))?;

        // =====================================================================
        // Stage 2: Open the target
        // =====================================================================
        let mut driver = open_driver(
            self.target.dialect,
            &self.target.connection,
            self.target.script.as_deref(),
            TargetOptions::from(&self.options),
        )?;

        let loaded = self.load(&plan.schema, source.as_mut(), driver.as_mut());
        let closed = driver.close();
        match (loaded, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), closed) => {
                if let Err(close_error) = closed {
                    warn!(error = %close_error, "closing target after failure");
                }
                Err(error)
            }
        }
    }

    fn load(
        &self,
        schema: &Schema,
        source: &mut dyn RecordSource,
        driver: &mut dyn StorageDriver,
    ) -> Result<TaskReport> {
        let options = &self.options;
        let mut report = TaskReport {
            task: self.name.clone(),
            target: driver.name().to_string(),
            records: 0,
            rows: schema
                .tables()
                .iter()
                .map(|table| (table.name.clone(), 0))
                .collect(),
            lookup_rows: 0,
            views: 0,
            warnings: Vec::new(),
            duration: Default::default(),
        };

        // =====================================================================
        // Stage 3: Tables
        // =====================================================================
        info_span!("tables").in_scope(|| -> Result<()> {
            for table in schema.drop_order() {
                driver.drop_table(table, true)?;
            }
            for table in schema.tables() {
                driver.create_table(table, false)?;
            }
            if let Some(name) = &options.lookup_table {
                let definition = lookup_table_definition(name);
                driver.drop_table(&definition, true)?;
                driver.create_table(&definition, false)?;
                let mut rows = lookup_rows(&definition, schema.lookup());
                report.lookup_rows = driver.store_rows(&definition, &mut rows)?;
                info!(table = %name, rows = report.lookup_rows, "stored lookup table");
            }
            Ok(())
        })?;

        // =====================================================================
        // Stage 4: Records
        // =====================================================================
        let mut transformer = RecordTransformer::new(schema, options);
        let mut buffers = RowBuffers::new();
        let mut outcome = TransformOutcome::default();
        while let Some(records) = source.next_batch(options.batch_size)? {
            outcome.merge(transformer.transform_batch(&records, &mut buffers)?);
            flush(schema, driver, &mut buffers, &mut report.rows, Some(options.batch_size))?;
            debug!(records = outcome.records, pending = buffers.total_pending(), "processed batch");
        }
        flush(schema, driver, &mut buffers, &mut report.rows, None)?;
        report.records = outcome.records;
        report.warnings = outcome.issues.iter().map(ToString::to_string).collect();

        // =====================================================================
        // Stage 5: Label views
        // =====================================================================
        if options.label_views {
            for table in schema.tables() {
                if schema.lookup().has_table(&table.name) {
                    driver.replace_lookup_view(table, schema.lookup())?;
                    report.views += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Store buffered rows parents-first. With `threshold`, only tables whose
/// buffer reached it are flushed.
fn flush(
    schema: &Schema,
    driver: &mut dyn StorageDriver,
    buffers: &mut RowBuffers,
    stored: &mut BTreeMap<String, usize>,
    threshold: Option<usize>,
) -> Result<()> {
    for table in schema.tables() {
        let pending = buffers.len(&table.name);
        if pending == 0 || threshold.is_some_and(|size| pending < size) {
            continue;
        }
        let count = driver.store_rows(table, buffers.pending_mut(&table.name))?;
        *stored.entry(table.name.clone()).or_default() += count;
        info!(table = %table.name, rows = count, "flushed");
    }
    Ok(())
}
