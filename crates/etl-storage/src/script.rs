//! SQL script output for server dialects.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use etl_model::{EtlError, Result};
use tracing::info;

use crate::dialect::Dialect;
use crate::server::SqlConnection;
use crate::sql::InsertTemplate;
use crate::value::SqlValue;

enum Sink {
    Memory(String),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

/// Writes every statement, values inlined, instead of executing it.
///
/// Tables created through the script are remembered so existence checks
/// behave as they would against a fresh database.
pub struct ScriptConnection {
    dialect: Dialect,
    sink: Sink,
    tables: BTreeSet<String>,
    statements: usize,
}

impl ScriptConnection {
    pub fn in_memory(dialect: Dialect) -> Self {
        Self {
            dialect,
            sink: Sink::Memory(String::new()),
            tables: BTreeSet::new(),
            statements: 0,
        }
    }

    pub fn create(dialect: Dialect, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                EtlError::database(format!("cannot create {}: {error}", parent.display()))
            })?;
        }
        let file = File::create(path).map_err(|error| {
            EtlError::database(format!("cannot create {}: {error}", path.display()))
        })?;
        info!(dialect = %dialect, path = %path.display(), "writing SQL script");
        Ok(Self {
            dialect,
            sink: Sink::File {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
            },
            tables: BTreeSet::new(),
            statements: 0,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Script text of an in-memory connection.
    pub fn script(&self) -> Option<&str> {
        match &self.sink {
            Sink::Memory(text) => Some(text),
            Sink::File { .. } => None,
        }
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    fn write(&mut self, sql: &str) -> Result<()> {
        self.statements += 1;
        match &mut self.sink {
            Sink::Memory(text) => {
                text.push_str(sql);
                text.push_str(";\n");
                Ok(())
            }
            Sink::File { path, writer } => writeln!(writer, "{sql};").map_err(|error| {
                EtlError::database(format!("cannot write {}: {error}", path.display()))
            }),
        }
    }
}

impl SqlConnection for ScriptConnection {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.write(sql)
    }

    fn execute_insert(&mut self, template: &InsertTemplate, values: &[SqlValue]) -> Result<()> {
        if values.len() != template.parameter_count() {
            return Err(EtlError::database(format!(
                "statement expects {} values, got {}",
                template.parameter_count(),
                values.len()
            )));
        }
        self.write(&template.inline(values))
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.tables.contains(table))
    }

    fn table_created(&mut self, table: &str) {
        self.tables.insert(table.to_string());
    }

    fn table_dropped(&mut self, table: &str) {
        self.tables.remove(table);
    }

    fn close(&mut self) -> Result<()> {
        if let Sink::File { path, writer } = &mut self.sink {
            writer.flush().map_err(|error| {
                EtlError::database(format!("cannot write {}: {error}", path.display()))
            })?;
        }
        Ok(())
    }
}
