//! SQLite target.

use std::path::Path;

use etl_model::{EtlError, LookupTable, Result, Row, Table};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql, params_from_iter};
use tracing::{debug, info};

use crate::StorageDriver;
use crate::cache::StatementCache;
use crate::dialect::Dialect;
use crate::sql::{
    create_table_sql, drop_table_sql, drop_view_sql, label_view_sql, table_exists_sql,
};
use crate::target::{BatchCounter, TargetOptions};
use crate::value::{SqlValue, bind_rows};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            SqlValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

fn native(error: rusqlite::Error) -> EtlError {
    EtlError::database(error.to_string())
}

pub struct SqliteDriver {
    connection: Option<Connection>,
    options: TargetOptions,
    cache: StatementCache,
    batches: BatchCounter,
}

impl SqliteDriver {
    pub fn open(path: &Path, options: TargetOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                EtlError::database(format!("cannot create {}: {error}", parent.display()))
            })?;
        }
        let connection = Connection::open(path).map_err(native)?;
        info!(path = %path.display(), "opened sqlite database");
        Ok(Self::with_connection(connection, options))
    }

    pub fn in_memory(options: TargetOptions) -> Result<Self> {
        let connection = Connection::open_in_memory().map_err(native)?;
        Ok(Self::with_connection(connection, options))
    }

    fn with_connection(connection: Connection, options: TargetOptions) -> Self {
        Self {
            connection: Some(connection),
            options,
            cache: StatementCache::new(Dialect::Sqlite),
            batches: BatchCounter::default(),
        }
    }

    /// The open connection, `None` after `close`.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    fn open_connection(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| EtlError::database("connection is closed"))
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        let found = self
            .open_connection()?
            .query_row(table_exists_sql(Dialect::Sqlite), [table], |_| Ok(()))
            .optional()
            .map_err(native)?;
        Ok(found.is_some())
    }
}

impl StorageDriver for SqliteDriver {
    fn name(&self) -> &str {
        Dialect::Sqlite.as_str()
    }

    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        if self.table_exists(&table.name)? {
            if if_not_exists {
                return Ok(());
            }
            return Err(EtlError::table_exists(&table.name));
        }
        let sql = create_table_sql(Dialect::Sqlite, table, if_not_exists);
        self.open_connection()?
            .execute_batch(&sql)
            .map_err(|error| native(error).with_table(&table.name))?;
        self.cache.invalidate(&table.name);
        info!(table = %table.name, fields = table.fields.len(), "created table");
        Ok(())
    }

    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        if !if_exists && !self.table_exists(&table.name)? {
            return Err(EtlError::database("no such table").with_table(&table.name));
        }
        let view = self.options.label_view_name(&table.name);
        let sql = format!(
            "{};\n{};",
            drop_view_sql(Dialect::Sqlite, &view),
            drop_table_sql(Dialect::Sqlite, &table.name, if_exists)
        );
        self.open_connection()?
            .execute_batch(&sql)
            .map_err(|error| native(error).with_table(&table.name))?;
        self.cache.invalidate(&table.name);
        debug!(table = %table.name, "dropped table");
        Ok(())
    }

    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let batch_size = self.options.rows_per_insert(Dialect::Sqlite, table);
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| EtlError::database("connection is closed"))?;
        let transaction = connection
            .transaction()
            .map_err(|error| native(error).with_table(&table.name))?;
        for chunk in rows.chunks(batch_size) {
            let batch = self.batches.next(&table.name);
            let values = bind_rows(table, chunk);
            let template = self.cache.insert_template(table, chunk.len());
            let mut statement = transaction
                .prepare_cached(template.sql())
                .map_err(|error| native(error).with_table(&table.name).with_batch(batch))?;
            statement
                .execute(params_from_iter(values.iter()))
                .map_err(|error| native(error).with_table(&table.name).with_batch(batch))?;
            debug!(table = %table.name, batch, rows = chunk.len(), "stored batch");
        }
        transaction
            .commit()
            .map_err(|error| native(error).with_table(&table.name))?;
        let stored = rows.len();
        rows.clear();
        Ok(stored)
    }

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()> {
        self.store_rows(table, &mut vec![row.clone()]).map(|_| ())
    }

    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        let view = self.options.label_view_name(&table.name);
        let statements = label_view_sql(Dialect::Sqlite, table, lookup, &view);
        if statements.is_empty() {
            return Ok(());
        }
        let sql = format!("{};", statements.join(";\n"));
        self.open_connection()?
            .execute_batch(&sql)
            .map_err(|error| native(error).with_table(&table.name))?;
        info!(table = %table.name, view = %view, "replaced label view");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection.close().map_err(|(_, error)| native(error))?;
        }
        Ok(())
    }
}
