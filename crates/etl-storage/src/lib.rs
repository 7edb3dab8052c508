//! Storage drivers for the load engine.
//!
//! Every target implements [`StorageDriver`]. SQLite and CSV are always
//! available. MySQL, PostgreSQL and SQL Server share one SQL builder and
//! either run against a live client (`mysql` / `postgres` features) or
//! write an executable script.

pub mod cache;
pub mod connection;
pub mod csv_target;
pub mod dialect;
pub mod live;
pub mod script;
pub mod server;
pub mod sql;
pub mod sqlite;
pub mod target;
pub mod value;

use std::path::Path;

use etl_model::{EtlError, LookupTable, Result, Row, Table};
use tracing::info;

pub use cache::StatementCache;
pub use connection::{ConnectionInfo, ConnectionSpec, parse_connection_string};
pub use csv_target::CsvDriver;
pub use dialect::Dialect;
pub use script::ScriptConnection;
pub use server::{MySqlDriver, PostgresDriver, SqlConnection, SqlServerDriver, SqlTarget};
pub use sql::InsertTemplate;
pub use sqlite::SqliteDriver;
pub use target::TargetOptions;
pub use value::SqlValue;

/// A load target.
///
/// Errors carry the table and, for inserts, the 1-based batch index.
pub trait StorageDriver {
    /// Dialect name used in logs and reports.
    fn name(&self) -> &str;

    /// Create `table`. An existing table is a database error unless
    /// `if_not_exists` is set.
    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()>;

    /// Drop `table` and its label view.
    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()>;

    /// Insert every row in batches and empty `rows`. Returns the rows stored.
    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize>;

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()>;

    /// Create or replace the view showing labels in place of codes.
    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Open the driver for `dialect`.
///
/// Server dialects write to `script` when one is given. Otherwise they need
/// the matching client feature.
pub fn open_driver(
    dialect: Dialect,
    connection: &str,
    script: Option<&Path>,
    options: TargetOptions,
) -> Result<Box<dyn StorageDriver>> {
    let spec = parse_connection_string(dialect, connection)?;
    info!(dialect = %dialect, script = ?script, "opening storage driver");
    match (dialect, spec) {
        (Dialect::Sqlite, ConnectionSpec::Memory) => {
            Ok(Box::new(SqliteDriver::in_memory(options)?))
        }
        (Dialect::Sqlite, ConnectionSpec::Path(path)) => {
            Ok(Box::new(SqliteDriver::open(&path, options)?))
        }
        (Dialect::Csv, ConnectionSpec::Path(dir)) => Ok(Box::new(CsvDriver::open(&dir, options)?)),
        (dialect, ConnectionSpec::Server(info)) => match script {
            Some(path) => open_script(dialect, path, options),
            None => open_live(dialect, &info, options),
        },
        (dialect, _) => Err(EtlError::config(format!(
            "unsupported connection for {dialect} target"
        ))),
    }
}

fn open_script(
    dialect: Dialect,
    path: &Path,
    options: TargetOptions,
) -> Result<Box<dyn StorageDriver>> {
    let connection = ScriptConnection::create(dialect, path)?;
    match dialect {
        Dialect::MySql => Ok(Box::new(MySqlDriver::new(connection, options))),
        Dialect::Postgres => Ok(Box::new(PostgresDriver::new(connection, options))),
        Dialect::SqlServer => Ok(Box::new(SqlServerDriver::new(connection, options))),
        other => Err(EtlError::config(format!(
            "{other} target does not write SQL scripts"
        ))),
    }
}

#[cfg_attr(
    not(all(feature = "mysql", feature = "postgres")),
    allow(unused_variables)
)]
fn open_live(
    dialect: Dialect,
    info: &ConnectionInfo,
    options: TargetOptions,
) -> Result<Box<dyn StorageDriver>> {
    match dialect {
        #[cfg(feature = "mysql")]
        Dialect::MySql => Ok(Box::new(MySqlDriver::new(
            live::MySqlConnection::connect(info)?,
            options,
        ))),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Box::new(PostgresDriver::new(
            live::PostgresConnection::connect(info)?,
            options,
        ))),
        other => Err(EtlError::config(format!(
            "no live {other} client in this build; configure a script path"
        ))),
    }
}
