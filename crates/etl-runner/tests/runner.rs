//! Tasks and workflows end to end.

use std::fs;
use std::path::Path;

use etl_ingest::MemorySource;
use etl_model::{ErrorKind, LoadOptions, ProjectMetadata, SourceRecord, SourceRow};
use etl_runner::{
    RulesSpec, SourceSpec, TargetSpec, Task, TaskOutcome, Workflow, WorkflowConfig,
    WorkflowRunner, load_workflow,
};
use etl_storage::Dialect;
use rusqlite::Connection;

const PROJECT: &str = r#"{
    "fields": [
        {"field_name": "record_id", "form_name": "demographics", "field_type": "text"},
        {"field_name": "name", "form_name": "demographics", "field_type": "text"},
        {"field_name": "tests", "form_name": "labs", "field_type": "checkbox",
         "choices": "1, chem | 2, cbc"}
    ],
    "instruments": [{"name": "demographics"}, {"name": "labs"}],
    "events": [{"unique_name": "enrollment"}, {"unique_name": "visit"}],
    "designations": [
        {"event": "enrollment", "form": "demographics"},
        {"event": "visit", "form": "labs"}
    ],
    "repeating": [{"event": "visit"}]
}"#;

const RECORDS_CSV: &str = "record_id,redcap_event_name,redcap_repeat_instance,name,tests___1,tests___2
1001,enrollment,,Ada,,
1001,visit,1,,1,0
1001,visit,2,,0,1
1002,enrollment,,Bob,,
";

fn metadata() -> ProjectMetadata {
    serde_json::from_str(PROJECT).expect("parse metadata")
}

fn records() -> Vec<SourceRecord> {
    vec![
        SourceRecord::new("1001")
            .with_row(
                SourceRow::new()
                    .with_event("enrollment")
                    .with_value("record_id", "1001")
                    .with_value("name", "Ada"),
            )
            .with_row(
                SourceRow::new()
                    .with_event("visit")
                    .with_instance(1)
                    .with_value("tests___1", "1")
                    .with_value("tests___2", "0"),
            )
            .with_row(
                SourceRow::new()
                    .with_event("visit")
                    .with_instance(2)
                    .with_value("tests___1", "0")
                    .with_value("tests___2", "1"),
            ),
        SourceRecord::new("1002").with_row(
            SourceRow::new()
                .with_event("enrollment")
                .with_value("record_id", "1002")
                .with_value("name", "Bob"),
        ),
    ]
}

fn memory_task(name: &str, records: Vec<SourceRecord>, database: &Path) -> Task {
    Task::new(
        name,
        SourceSpec::Memory(MemorySource::new(metadata(), records)),
        TargetSpec::new(Dialect::Sqlite, database.display().to_string()),
    )
}

fn count(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count")
}

#[test]
fn task_loads_sqlite_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database = dir.path().join("out").join("visits.db");
    let task = memory_task("visits", records(), &database).with_options(
        LoadOptions::default()
            .with_batch_size(1)
            .with_lookup_table(Some("lookup".to_string())),
    );

    let report = task.run().expect("task runs");
    assert_eq!(report.target, "sqlite");
    assert_eq!(report.records, 2);
    assert_eq!(report.rows["demographics"], 2);
    assert_eq!(report.rows["labs"], 2);
    assert_eq!(report.lookup_rows, 2);
    assert_eq!(report.views, 1);
    assert!(report.warnings.is_empty());

    let connection = Connection::open(&database).expect("open database");
    assert_eq!(count(&connection, "demographics"), 2);
    let labs: Vec<(i64, i64, i64)> = connection
        .prepare("SELECT demographics_id, tests___1, tests___2 FROM labs ORDER BY labs_id")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(labs, [(1, 1, 0), (1, 0, 1)]);

    let labels: Vec<Option<String>> = connection
        .prepare("SELECT tests___1 FROM labs_label_view ORDER BY labs_id")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(labels, [Some("chem".to_string()), None]);
    assert_eq!(count(&connection, "lookup"), 2);
}

#[test]
fn rerunning_a_task_replaces_its_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database = dir.path().join("visits.db");
    let task = memory_task("visits", records(), &database);
    task.run().expect("first run");
    let report = task.run().expect("second run");
    assert_eq!(report.total_rows(), 4);

    let connection = Connection::open(&database).expect("open database");
    assert_eq!(count(&connection, "labs"), 2);
}

#[test]
fn record_problems_warn_or_fail_in_strict_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut input = records();
    input.push(SourceRecord::new("  ").with_row(SourceRow::new().with_value("name", "nobody")));

    let lenient = memory_task("lenient", input.clone(), &dir.path().join("lenient.db"));
    let report = lenient.run().expect("lenient run");
    assert_eq!(report.records, 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.rows["demographics"], 2);

    let strict = memory_task("strict", input, &dir.path().join("strict.db"))
        .with_options(LoadOptions::default().with_strict(true));
    let failure = strict.run().expect_err("strict run");
    assert_eq!(failure.task, "strict");
    assert_eq!(failure.kind, ErrorKind::Record);
}

#[test]
fn failures_carry_kind_and_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad_rules = memory_task("rules", records(), &dir.path().join("a.db"))
        .with_rules(RulesSpec::Text("SELECT everything".to_string()));
    assert_eq!(bad_rules.run().expect_err("bad rules").kind, ErrorKind::RuleSyntax);

    let missing_rules = memory_task("missing", records(), &dir.path().join("b.db"))
        .with_rules(RulesSpec::File(dir.path().join("absent.txt")));
    assert_eq!(missing_rules.run().expect_err("no file").kind, ErrorKind::Config);

    let bad_target = Task::new(
        "target",
        SourceSpec::Memory(MemorySource::new(metadata(), records())),
        TargetSpec::new(Dialect::Postgres, "host:user:pass"),
    );
    assert_eq!(bad_target.run().expect_err("bad target").kind, ErrorKind::Config);

    let clash = memory_task("clash", records(), &dir.path().join("c.db")).with_options(
        LoadOptions::default().with_lookup_table(Some("labs".to_string())),
    );
    assert_eq!(clash.run().expect_err("lookup clash").kind, ErrorKind::Config);
}

#[test]
fn server_dialects_write_scripts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("load.sql");
    let task = Task::new(
        "mssql",
        SourceSpec::Memory(MemorySource::new(metadata(), records())),
        TargetSpec::new(Dialect::SqlServer, "db:etl:secret:trials").with_script(Some(script.clone())),
    );
    let report = task.run().expect("script run");
    assert_eq!(report.target, "sqlserver");

    let text = fs::read_to_string(&script).expect("read script");
    assert!(text.contains("DROP TABLE IF EXISTS [labs];"));
    assert!(text.contains("CREATE TABLE [demographics]"));
    assert!(text.contains("SET IDENTITY_INSERT [labs] ON;"));
    assert!(text.contains("CREATE OR ALTER VIEW [labs_label_view]"));
    let drop_labs = text.find("DROP TABLE IF EXISTS [labs]").expect("drop labs");
    let drop_root = text
        .find("DROP TABLE IF EXISTS [demographics]")
        .expect("drop root");
    assert!(drop_labs < drop_root);
}

#[test]
fn plan_builds_the_schema_without_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database = dir.path().join("never.db");
    let plan = memory_task("plan", records(), &database)
        .plan()
        .expect("plan");
    let names: Vec<&str> = plan.schema.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["demographics", "labs"]);
    assert!(plan.rules.to_rules_text().contains("labs"));
    assert!(!database.exists());
}

#[test]
fn workflow_skips_dependent_tasks_after_a_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = RulesSpec::Text("SELECT everything".to_string());
    let workflow = Workflow::new("nightly")
        .with_task(memory_task("first", records(), &dir.path().join("1.db")))
        .with_task(
            memory_task("side", records(), &dir.path().join("2.db"))
                .with_rules(broken.clone())
                .with_independent(true),
        )
        .with_task(memory_task("main", records(), &dir.path().join("3.db")).with_rules(broken))
        .with_task(memory_task("after", records(), &dir.path().join("4.db")))
        .with_task(
            memory_task("audit", records(), &dir.path().join("5.db")).with_independent(true),
        );

    let report = WorkflowRunner::new().run(&workflow);
    assert!(!report.is_success());
    let labels: Vec<&str> = report
        .outcomes
        .iter()
        .map(|(_, outcome)| outcome.label())
        .collect();
    assert_eq!(labels, ["succeeded", "failed", "failed", "skipped", "succeeded"]);
    assert_eq!(
        report.outcome("after"),
        Some(&TaskOutcome::Skipped {
            after: "main".to_string()
        })
    );
    assert_eq!(report.failures().count(), 2);
    assert!(!dir.path().join("4.db").exists());
}

#[test]
fn workflow_file_runs_relative_to_its_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = dir.path().join("export");
    fs::create_dir_all(&export).expect("export dir");
    fs::write(export.join("project.json"), PROJECT).expect("project");
    fs::write(export.join("records.csv"), RECORDS_CSV).expect("records");
    fs::write(
        dir.path().join("rules.txt"),
        "ROOT patients record_id\nFIELD name string\n",
    )
    .expect("rules");
    let config = dir.path().join("workflow.toml");
    fs::write(
        &config,
        r#"
[workflow]
name = "nightly"

[[tasks]]
name = "generated"

[tasks.source]
dir = "export"
format = "csv"

[tasks.target]
kind = "sqlite"
connection = "out/generated.db"

[tasks.options]
batch_size = 2
empty_rows = "keep"

[[tasks]]
name = "custom"
rules_file = "rules.txt"

[tasks.source]
dir = "export"

[tasks.target]
kind = "csv"
connection = "out/csv"
"#,
    )
    .expect("config");

    let workflow = load_workflow(&config).expect("load workflow");
    assert_eq!(workflow.tasks.len(), 2);
    let report = WorkflowRunner::new().run(&workflow);
    assert!(report.is_success(), "{report:?}");

    let connection = Connection::open(dir.path().join("out").join("generated.db")).expect("db");
    assert_eq!(count(&connection, "demographics"), 2);
    let patients =
        fs::read_to_string(dir.path().join("out").join("csv").join("patients.csv")).expect("csv");
    assert_eq!(patients, "record_id,name\n1001,Ada\n1002,Bob\n");
}

#[test]
fn invalid_workflow_files_are_config_errors() {
    let base = Path::new("/tmp");
    let task = |extra: &str| {
        format!(
            "[workflow]\nname = \"w\"\n\n[[tasks]]\nname = \"t\"\n{extra}\n[tasks.source]\ndir = \"export\"\n\n[tasks.target]\nkind = \"sqlite\"\nconnection = \"out.db\"\n"
        )
    };
    let cases = [
        "[workflow]\nname = \"w\"\n".to_string(),
        "[workflow]\nname = \"\"\n".to_string(),
        task("colour = \"red\""),
        task("").replace("sqlite", "oracle"),
        task("").replace("dir = \"export\"", "dir = \"export\"\nformat = \"yaml\""),
        task("").replace("connection = \"out.db\"", "connection = \"out.db\"\nscript = \"x.sql\""),
        format!("{}{}", task(""), task("").replace("[workflow]\nname = \"w\"\n", "")),
        task("[tasks.options]\nbatch_size = 0\n"),
        "not toml at all [".to_string(),
    ];
    for text in cases {
        let error = WorkflowConfig::parse(&text)
            .and_then(|config| config.into_workflow(base))
            .expect_err(&text);
        assert_eq!(error.kind(), ErrorKind::Config, "{text}");
    }
    let workflow = WorkflowConfig::parse(&task(""))
        .and_then(|config| config.into_workflow(base))
        .expect("valid");
    assert_eq!(
        workflow.task("t").map(|task| task.target.connection.as_str()),
        Some("/tmp/out.db")
    );
}
