use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use etl_model::EtlError;

/// Storage target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Csv,
    MySql,
    Postgres,
    SqlServer,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Sqlite,
        Dialect::Csv,
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::SqlServer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Csv => "csv",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "sqlserver",
        }
    }

    /// Bind parameters a single statement may carry, `None` when unbounded.
    pub fn max_parameters(&self) -> Option<usize> {
        match self {
            Dialect::Sqlite => Some(32_766),
            Dialect::MySql | Dialect::Postgres => Some(65_535),
            Dialect::SqlServer => Some(2_100),
            Dialect::Csv => None,
        }
    }

    /// Rows a single `VALUES` list may carry, `None` when unbounded.
    pub fn max_rows_per_insert(&self) -> Option<usize> {
        match self {
            Dialect::SqlServer => Some(1_000),
            _ => None,
        }
    }

    /// Rows per `INSERT` for a table of `columns` columns, at most
    /// `batch_size` and never zero.
    pub fn rows_per_insert(&self, batch_size: usize, columns: usize) -> usize {
        let mut rows = batch_size;
        if let Some(limit) = self.max_parameters() {
            rows = rows.min(limit / columns.max(1));
        }
        if let Some(limit) = self.max_rows_per_insert() {
            rows = rows.min(limit);
        }
        rows.max(1)
    }

    /// Dialects addressed with `host:user:password:database[:port]`.
    pub fn is_server(&self) -> bool {
        matches!(self, Dialect::MySql | Dialect::Postgres | Dialect::SqlServer)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "csv" => Ok(Dialect::Csv),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(EtlError::config(format!(
                "unknown target kind `{other}` (expected one of: sqlite, csv, mysql, postgres, sqlserver)"
            ))),
        }
    }
}
