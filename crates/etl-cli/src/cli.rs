//! Command line definitions for `capture-etl`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use etl_ingest::RecordFormat;
use etl_storage::Dialect;

#[derive(Parser)]
#[command(
    name = "capture-etl",
    version,
    about = "Load clinical capture exports into relational tables",
    long_about = "Map project exports (metadata plus JSON, CSV or XML records) onto a \
                  relational table tree and load them into SQLite, MySQL, PostgreSQL, \
                  SQL Server or CSV files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow record values in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every task of a workflow file.
    Run(RunArgs),

    /// Run one ad-hoc load task.
    Load(LoadArgs),

    /// Print the rules generated from a project's metadata.
    Rules(RulesArgs),

    /// Print the table tree a project and rules produce.
    Schema(SchemaArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Workflow file (TOML).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Export directory and record format shared by every command that reads one.
#[derive(Args)]
pub struct SourceArgs {
    /// Export directory holding `project.json` and the records file.
    #[arg(long = "source", value_name = "DIR")]
    pub source: PathBuf,

    /// Records format (json, csv, xml); detected from the directory when omitted.
    #[arg(long = "format", value_name = "FORMAT")]
    pub format: Option<RecordFormat>,
}

#[derive(Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Target kind (sqlite, csv, mysql, postgres, sqlserver).
    #[arg(long = "target", value_name = "KIND")]
    pub target: Dialect,

    /// Database file, CSV directory, or `host:user:password:database[:port]`.
    #[arg(long = "connection", value_name = "CONNECTION")]
    pub connection: String,

    /// Rules file; rules are generated from the metadata when omitted.
    #[arg(long = "rules", value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Write server SQL to this file instead of connecting.
    #[arg(long = "script", value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Rows per INSERT statement.
    #[arg(long = "batch-size", value_name = "N", default_value_t = etl_model::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Store rows whose data fields are all empty.
    #[arg(long = "keep-empty-rows")]
    pub keep_empty_rows: bool,

    /// Fail the task on the first record error.
    #[arg(long = "strict")]
    pub strict: bool,

    /// Skip creating label views.
    #[arg(long = "no-label-views")]
    pub no_label_views: bool,

    /// Also store the code/label mapping in a table of this name.
    #[arg(long = "lookup-table", value_name = "NAME")]
    pub lookup_table: Option<String>,
}

#[derive(Args)]
pub struct RulesArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Keep `<form>_complete` status fields.
    #[arg(long = "complete-fields")]
    pub complete_fields: bool,
}

#[derive(Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Rules file; rules are generated from the metadata when omitted.
    #[arg(long = "rules", value_name = "FILE")]
    pub rules: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
