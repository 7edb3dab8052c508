//! Storage drivers against SQLite in memory, SQL scripts and CSV files.

use etl_model::{
    Choice, ErrorKind, EtlError, Field, FieldRole, FieldType, KeyReference, KeyType, KeyValue,
    LookupRef, LookupTable, Row, RowsType, Table,
};
use etl_storage::sql::{InsertTemplate, create_table_sql, label_view_sql};
use etl_storage::{
    ConnectionSpec, CsvDriver, Dialect, MySqlDriver, ScriptConnection, SqlConnection,
    SqlServerDriver, SqlValue, SqliteDriver, StorageDriver, TargetOptions, open_driver,
    parse_connection_string,
};
use insta::assert_snapshot;

fn visits() -> Table {
    let mut table = Table::new("visits", RowsType::Root);
    table.fields = vec![
        Field::primary_key("visits_id"),
        Field::identifier("record_id", FieldRole::RecordId, FieldType::String),
        Field::data("score", "score", FieldType::Integer),
        Field::data("tests___1", "tests", FieldType::Checkbox).with_lookup(LookupRef {
            source_field: "tests".to_string(),
            choice: Some("1".to_string()),
        }),
    ];
    table
}

fn coded() -> Table {
    let mut table = visits();
    table.fields.push(
        Field::data("status", "status", FieldType::String).with_lookup(LookupRef {
            source_field: "status".to_string(),
            choice: None,
        }),
    );
    table
}

fn row(table: &Table, key: i64, values: &[&str]) -> Row {
    let mut row = Row::new(table, KeyValue::Int(key), values[1]);
    row.values = values.iter().map(ToString::to_string).collect();
    row
}

fn lookup() -> LookupTable {
    let mut lookup = LookupTable::new();
    lookup.insert(
        "visits",
        "status",
        vec![Choice::new("1", "Active"), Choice::new("2", "Closed")],
    );
    lookup.insert("visits", "tests___1", vec![Choice::new("1", "chem")]);
    lookup
}

/// Records plain statements and rejects every insert.
#[derive(Default)]
struct RejectingConnection {
    statements: Vec<String>,
}

impl SqlConnection for RejectingConnection {
    fn execute(&mut self, sql: &str) -> etl_model::Result<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }

    fn execute_insert(
        &mut self,
        _template: &InsertTemplate,
        _values: &[SqlValue],
    ) -> etl_model::Result<()> {
        Err(EtlError::database("constraint violated"))
    }

    fn table_exists(&mut self, _table: &str) -> etl_model::Result<bool> {
        Ok(true)
    }
}

fn small_batches() -> TargetOptions {
    TargetOptions::default().with_batch_size(2)
}

// ============================================================================
// SQLite
// ============================================================================

#[test]
fn create_table_guards_existing_tables() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    driver.create_table(&table, false).expect("first create");

    let error = driver.create_table(&table, false).expect_err("second create");
    assert_eq!(error.kind(), ErrorKind::Database);
    assert_eq!(error.message(), "table exists");
    assert_eq!(error.table(), Some("visits"));

    driver.create_table(&table, true).expect("create if not exists");
    driver.create_table(&table, true).expect("create if not exists again");
}

#[test]
fn dropping_a_missing_table() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    let error = driver.drop_table(&table, false).expect_err("strict drop");
    assert_eq!(error.kind(), ErrorKind::Database);
    assert_eq!(error.table(), Some("visits"));
    driver.drop_table(&table, true).expect("lenient drop");

    driver.create_table(&table, false).expect("create");
    driver.drop_table(&table, false).expect("drop existing");
    driver.create_table(&table, false).expect("create after drop");
}

#[test]
fn store_rows_batches_and_reuses_statements() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(small_batches()).expect("open");
    driver.create_table(&table, false).expect("create");

    let mut rows: Vec<Row> = (1..=5)
        .map(|key| row(&table, key, &[&key.to_string(), "1001", "7", "1"]))
        .collect();
    assert_eq!(driver.store_rows(&table, &mut rows).expect("store"), 5);
    assert!(rows.is_empty());

    let mut more = vec![
        row(&table, 6, &["6", "1002", "", "0"]),
        row(&table, 7, &["7", "1002", "x9", "0"]),
    ];
    driver.store_rows(&table, &mut more).expect("store more");

    // Templates for two and one rows; batches 2 and 4 reuse them.
    assert_eq!(driver.cache().len(), 2);
    assert_eq!(driver.cache().hits(), 2);

    let connection = driver.connection().expect("connection");
    let count: i64 = connection
        .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 7);

    let types: Vec<(i64, String)> = connection
        .prepare("SELECT visits_id, typeof(score) FROM visits ORDER BY visits_id")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(types[0], (1, "integer".to_string()));
    assert_eq!(types[5], (6, "null".to_string()));
    assert_eq!(types[6], (7, "text".to_string()));
}

#[test]
fn wide_tables_split_inserts_below_the_parameter_limit() {
    let mut table = Table::new("wide", RowsType::Root);
    table.fields = vec![
        Field::primary_key("wide_id"),
        Field::identifier("record_id", FieldRole::RecordId, FieldType::String),
    ];
    for column in 0..399 {
        let name = format!("c{column}");
        table.fields.push(Field::data(&name, &name, FieldType::Integer));
    }
    assert_eq!(table.fields.len(), 401);

    let mut driver =
        SqliteDriver::in_memory(TargetOptions::default().with_batch_size(100)).expect("open");
    driver.create_table(&table, false).expect("create");
    let mut rows: Vec<Row> = (1..=100)
        .map(|key| {
            let mut row = Row::new(&table, KeyValue::Int(key), "1001");
            row.values = vec!["5".to_string(); 401];
            row.values[0] = key.to_string();
            row.values[1] = "1001".to_string();
            row
        })
        .collect();
    assert_eq!(driver.store_rows(&table, &mut rows).expect("store"), 100);

    let count: i64 = driver
        .connection()
        .expect("connection")
        .query_row("SELECT COUNT(*) FROM wide", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 100);
    // 81 rows fit under 32766 parameters, the rest go in a second statement.
    assert_eq!(driver.cache().len(), 2);
}

#[test]
fn failed_batch_reports_table_and_batch_and_keeps_rows() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    let mut rows = vec![row(&table, 1, &["1", "1001", "7", "1"])];

    let error = driver.store_rows(&table, &mut rows).expect_err("no table");
    assert_eq!(error.kind(), ErrorKind::Database);
    assert_eq!(error.table(), Some("visits"));
    assert_eq!(error.batch(), Some(1));
    assert_eq!(rows.len(), 1);
}

#[test]
fn label_view_replaces_codes_with_labels() {
    let table = coded();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    driver.create_table(&table, false).expect("create");
    let mut rows = vec![
        row(&table, 1, &["1", "1001", "7", "1", "2"]),
        row(&table, 2, &["2", "1002", "3", "0", "9"]),
    ];
    driver.store_rows(&table, &mut rows).expect("store");

    driver
        .replace_lookup_view(&table, &lookup())
        .expect("create view");
    driver
        .replace_lookup_view(&table, &lookup())
        .expect("replace view");

    let connection = driver.connection().expect("connection");
    let labelled: Vec<(i64, Option<String>, Option<String>)> = connection
        .prepare("SELECT score, tests___1, status FROM visits_label_view ORDER BY visits_id")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(
        labelled,
        vec![
            (7, Some("chem".to_string()), Some("Closed".to_string())),
            (3, None, None),
        ]
    );
}

#[test]
fn label_view_without_lookup_entries_is_a_no_op() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    driver.create_table(&table, false).expect("create");
    driver
        .replace_lookup_view(&table, &LookupTable::new())
        .expect("no view");
    assert!(label_view_sql(Dialect::Sqlite, &table, &LookupTable::new(), "v").is_empty());
}

#[test]
fn closed_driver_rejects_work() {
    let table = visits();
    let mut driver = SqliteDriver::in_memory(TargetOptions::default()).expect("open");
    driver.close().expect("close");
    driver.close().expect("close twice");
    let error = driver.create_table(&table, false).expect_err("closed");
    assert_eq!(error.kind(), ErrorKind::Database);
}

// ============================================================================
// Connection strings
// ============================================================================

#[test]
fn malformed_connection_strings_are_config_errors() {
    for (dialect, value) in [
        (Dialect::MySql, "host:user:pass"),
        (Dialect::Postgres, "host:user:pass:db:5432:extra"),
        (Dialect::SqlServer, ":user:pass:db"),
        (Dialect::MySql, "host::pass:db"),
        (Dialect::Postgres, "host:user:pass:db:port"),
        (Dialect::Sqlite, "  "),
        (Dialect::Csv, ""),
    ] {
        let error = parse_connection_string(dialect, value).expect_err(value);
        assert_eq!(error.kind(), ErrorKind::Config, "{dialect} {value}");
    }
}

#[test]
fn connection_strings_unescape_colons() {
    let spec = parse_connection_string(Dialect::Postgres, r"db.local:etl:pa\:ss:trials:6543")
        .expect("parse");
    let ConnectionSpec::Server(info) = spec else {
        panic!("expected a server connection");
    };
    assert_eq!(info.host, "db.local");
    assert_eq!(info.password, "pa:ss");
    assert_eq!(info.database, "trials");
    assert_eq!(info.port, Some(6543));
    assert!(!format!("{info:?}").contains("pa:ss"));

    assert_eq!(
        parse_connection_string(Dialect::Sqlite, ":memory:").expect("memory"),
        ConnectionSpec::Memory
    );
}

#[test]
fn dialect_names_parse() {
    assert_eq!("PostgreSQL".parse::<Dialect>().expect("pg"), Dialect::Postgres);
    assert_eq!("mssql".parse::<Dialect>().expect("mssql"), Dialect::SqlServer);
    let error = "oracle".parse::<Dialect>().expect_err("oracle");
    assert_eq!(error.kind(), ErrorKind::Config);
}

// ============================================================================
// Generated SQL
// ============================================================================

#[test]
fn create_table_per_dialect() {
    let table = visits();
    assert_snapshot!(
        create_table_sql(Dialect::Sqlite, &table, false),
        @r#"CREATE TABLE "visits" ("visits_id" INTEGER PRIMARY KEY, "record_id" TEXT, "score" INTEGER, "tests___1" INTEGER)"#
    );
    assert_snapshot!(
        create_table_sql(Dialect::MySql, &table, false),
        @"CREATE TABLE `visits` (`visits_id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY, `record_id` TEXT, `score` INT, `tests___1` TINYINT)"
    );
    assert_snapshot!(
        create_table_sql(Dialect::Postgres, &table, true),
        @r#"CREATE TABLE IF NOT EXISTS "visits" ("visits_id" SERIAL PRIMARY KEY, "record_id" TEXT, "score" INTEGER, "tests___1" SMALLINT)"#
    );
    assert_snapshot!(
        create_table_sql(Dialect::SqlServer, &table, true),
        @"IF OBJECT_ID(N'visits', N'U') IS NULL CREATE TABLE [visits] ([visits_id] INT NOT NULL IDENTITY(1,1) PRIMARY KEY, [record_id] NVARCHAR(MAX), [score] INT, [tests___1] BIT)"
    );
}

#[test]
fn natural_keys_and_text_foreign_keys() {
    let mut root = Table::new("patients", RowsType::Root);
    root.fields = vec![Field::natural_key("record_id")];
    let mut child = Table::new("notes", RowsType::ByRepeatingInstruments);
    child.parent = Some("patients".to_string());
    child.fields = vec![
        Field::primary_key("notes_id"),
        Field::foreign_key(
            "record_id",
            KeyReference {
                table: "patients".to_string(),
                key_type: KeyType::Text,
            },
        ),
        Field::data("code", "code", FieldType::Char).with_size(Some(3)),
    ];
    assert_snapshot!(
        create_table_sql(Dialect::MySql, &root, false),
        @"CREATE TABLE `patients` (`record_id` VARCHAR(255) NOT NULL PRIMARY KEY)"
    );
    assert_snapshot!(
        create_table_sql(Dialect::SqlServer, &child, false),
        @"CREATE TABLE [notes] ([notes_id] INT NOT NULL IDENTITY(1,1) PRIMARY KEY, [record_id] NVARCHAR(255), [code] NCHAR(3))"
    );
}

#[test]
fn insert_templates_per_dialect() {
    let table = visits();
    assert_snapshot!(
        InsertTemplate::new(Dialect::Postgres, &table, 1).sql(),
        @r#"INSERT INTO "visits" ("visits_id", "record_id", "score", "tests___1") VALUES ($1::TEXT::INTEGER, $2::TEXT, $3::TEXT::INTEGER, $4::TEXT::SMALLINT)"#
    );
    let template = InsertTemplate::new(Dialect::SqlServer, &table, 2);
    assert_eq!(template.parameter_count(), 8);
    assert!(template.sql().ends_with("(@P5, @P6, @P7, @P8)"));
    let mysql = InsertTemplate::new(Dialect::MySql, &table, 3);
    assert_eq!(mysql.sql().matches('?').count(), 12);
}

#[test]
fn label_view_statements_per_dialect() {
    let table = coded();
    let statements = label_view_sql(Dialect::Postgres, &table, &lookup(), "visits_label_view");
    assert_eq!(statements.len(), 1);
    assert_snapshot!(
        statements[0],
        @r#"CREATE OR REPLACE VIEW "visits_label_view" AS SELECT "visits_id", "record_id", "score", CASE "tests___1" WHEN 1 THEN 'chem' ELSE NULL END AS "tests___1", CASE "status" WHEN '1' THEN 'Active' WHEN '2' THEN 'Closed' ELSE NULL END AS "status" FROM "visits""#
    );
    let sqlserver = label_view_sql(Dialect::SqlServer, &table, &lookup(), "visits_label_view");
    assert!(sqlserver[0].starts_with("CREATE OR ALTER VIEW [visits_label_view] AS SELECT"));
    assert!(sqlserver[0].contains("WHEN N'1' THEN N'Active'"));
    let sqlite = label_view_sql(Dialect::Sqlite, &table, &lookup(), "visits_label_view");
    assert_eq!(sqlite[0], r#"DROP VIEW IF EXISTS "visits_label_view""#);
    assert!(sqlite[1].starts_with(r#"CREATE VIEW "visits_label_view" AS"#));
}

// ============================================================================
// Scripts
// ============================================================================

#[test]
fn sql_server_script_wraps_identity_inserts() {
    let table = visits();
    let mut driver = SqlServerDriver::new(
        ScriptConnection::in_memory(Dialect::SqlServer),
        TargetOptions::default(),
    );
    driver.create_table(&table, false).expect("create");
    let error = driver.create_table(&table, false).expect_err("exists");
    assert_eq!(error.message(), "table exists");

    let mut rows = vec![row(&table, 1, &["1", "1001", "7", "1"])];
    driver.store_rows(&table, &mut rows).expect("store");
    driver.close().expect("close");

    let script = driver.target().connection().script().expect("script");
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("CREATE TABLE [visits]"));
    assert_eq!(lines[1], "SET IDENTITY_INSERT [visits] ON;");
    assert_eq!(
        lines[2],
        "INSERT INTO [visits] ([visits_id], [record_id], [score], [tests___1]) VALUES (1, N'1001', 7, 1);"
    );
    assert_eq!(lines[3], "SET IDENTITY_INSERT [visits] OFF;");
}

#[test]
fn sql_server_inserts_stay_within_parameter_limit() {
    let table = visits();
    let mut driver = SqlServerDriver::new(
        ScriptConnection::in_memory(Dialect::SqlServer),
        TargetOptions::default().with_batch_size(5_000),
    );
    let mut rows: Vec<Row> = (1..=1_200)
        .map(|key| row(&table, key, &[&key.to_string(), "1001", "7", "1"]))
        .collect();
    assert_eq!(driver.store_rows(&table, &mut rows).expect("store"), 1_200);

    let script = driver.target().connection().script().expect("script");
    let inserts = script.lines().filter(|line| line.starts_with("INSERT")).count();
    // Four columns allow 525 rows per statement.
    assert_eq!(inserts, 3);
}

#[test]
fn identity_insert_is_switched_off_after_a_failed_batch() {
    let table = visits();
    let mut driver = SqlServerDriver::new(RejectingConnection::default(), TargetOptions::default());
    let mut rows = vec![row(&table, 1, &["1", "1001", "7", "1"])];

    let error = driver.store_rows(&table, &mut rows).expect_err("insert rejected");
    assert_eq!(error.kind(), ErrorKind::Database);
    assert_eq!(error.message(), "constraint violated");
    assert_eq!(error.batch(), Some(1));
    assert_eq!(rows.len(), 1);

    let statements = &driver.target().connection().statements;
    assert_eq!(statements.len(), 2);
    assert!(statements[0].contains("IDENTITY_INSERT [visits] ON"));
    assert!(statements[1].contains("IDENTITY_INSERT [visits] OFF"));
}

#[test]
fn mysql_script_escapes_literals() {
    let table = visits();
    let mut driver = MySqlDriver::new(
        ScriptConnection::in_memory(Dialect::MySql),
        TargetOptions::default(),
    );
    driver.create_table(&table, false).expect("create");
    driver
        .insert_row(&table, &row(&table, 1, &["1", r"O'Brien \ co", "", "0"]))
        .expect("insert");
    let script = driver.target().connection().script().expect("script");
    assert!(script.contains(r"VALUES (1, 'O''Brien \\ co', NULL, 0);"));
    assert_eq!(driver.target().connection().statements(), 2);
}

#[test]
fn open_driver_selects_targets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory = open_driver(Dialect::Sqlite, ":memory:", None, TargetOptions::default())
        .expect("sqlite");
    assert_eq!(memory.name(), "sqlite");

    let script = dir.path().join("out").join("load.sql");
    let mut postgres = open_driver(
        Dialect::Postgres,
        "localhost:etl:secret:trials",
        Some(&script),
        TargetOptions::default(),
    )
    .expect("postgres script");
    assert_eq!(postgres.name(), "postgres");
    postgres.create_table(&visits(), false).expect("create");
    postgres.close().expect("close");
    let text = std::fs::read_to_string(&script).expect("read script");
    assert!(text.starts_with(r#"CREATE TABLE "visits""#));
}

#[cfg(not(feature = "mysql"))]
#[test]
fn server_dialect_without_client_needs_a_script() {
    let error = open_driver(
        Dialect::MySql,
        "localhost:etl:secret:trials",
        None,
        TargetOptions::default(),
    )
    .err()
    .expect("no client");
    assert_eq!(error.kind(), ErrorKind::Config);

    let error = open_driver(
        Dialect::SqlServer,
        "localhost:etl:secret:trials",
        None,
        TargetOptions::default(),
    )
    .err()
    .expect("sql server is script only");
    assert_eq!(error.kind(), ErrorKind::Config);
}

// ============================================================================
// CSV
// ============================================================================

#[test]
fn csv_tables_and_label_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = coded();
    let mut driver = CsvDriver::open(dir.path(), small_batches()).expect("open");
    driver.create_table(&table, false).expect("create");
    let error = driver.create_table(&table, false).expect_err("exists");
    assert_eq!(error.kind(), ErrorKind::Database);

    let mut rows = vec![
        row(&table, 1, &["1", "1001", "7", "1", "1"]),
        row(&table, 2, &["2", "1001", "", "0", ""]),
        row(&table, 3, &["3", "1002", "4", "0", "2"]),
    ];
    assert_eq!(driver.store_rows(&table, &mut rows).expect("store"), 3);
    driver.replace_lookup_view(&table, &lookup()).expect("view");

    let data = std::fs::read_to_string(driver.table_path("visits")).expect("table file");
    assert_eq!(
        data,
        "visits_id,record_id,score,tests___1,status\n1,1001,7,1,1\n2,1001,,0,\n3,1002,4,0,2\n"
    );
    let view = std::fs::read_to_string(driver.view_path("visits")).expect("view file");
    assert_eq!(
        view,
        "visits_id,record_id,score,tests___1,status\n1,1001,7,chem,Active\n2,1001,,,\n3,1002,4,,Closed\n"
    );

    driver.drop_table(&table, false).expect("drop");
    assert!(!driver.table_path("visits").exists());
    assert!(!driver.view_path("visits").exists());
    let error = driver.drop_table(&table, false).expect_err("missing");
    assert_eq!(error.kind(), ErrorKind::Database);
}

#[test]
fn csv_store_into_missing_table_fails_with_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = visits();
    let mut driver = CsvDriver::open(dir.path(), TargetOptions::default()).expect("open");
    let mut rows = vec![row(&table, 1, &["1", "1001", "7", "1"])];
    let error = driver.store_rows(&table, &mut rows).expect_err("missing");
    assert_eq!(error.table(), Some("visits"));
    assert_eq!(error.batch(), Some(1));
    assert_eq!(rows.len(), 1);
}
