//! `capture-etl` binary.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use etl_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use etl_cli::commands::{run_load, run_rules, run_schema, run_workflow};
use etl_cli::logging::{LogConfig, LogFormat, init_logging};
use etl_cli::summary::{print_summary, render_schema};
use etl_runner::WorkflowReport;
use tracing::level_filters::LevelFilter;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match &cli.command {
        Command::Run(args) => report_exit_code(run_workflow(args)),
        Command::Load(args) => report_exit_code(run_load(args)),
        Command::Rules(args) => match run_rules(args) {
            Ok(text) => {
                print!("{text}");
                0
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                1
            }
        },
        Command::Schema(args) => match run_schema(args) {
            Ok(schema) => {
                print!("{}", render_schema(&schema));
                0
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                1
            }
        },
    };
    std::process::exit(exit_code);
}

fn report_exit_code(result: anyhow::Result<WorkflowReport>) -> i32 {
    match result {
        Ok(report) => {
            print_summary(&report);
            if report.is_success() { 0 } else { 1 }
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig::default()
        .with_level_filter(cli.verbosity.tracing_level_filter())
        .with_log_file(cli.log_file.clone())
        .with_log_data(cli.log_data);
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
