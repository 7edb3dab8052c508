//! Server dialects: MySQL, PostgreSQL and SQL Server.
//!
//! Each dialect is its own driver struct over a [`SqlConnection`]. The SQL
//! they send differs only through the dialect-aware builders in
//! [`crate::sql`], so the shared mechanics live in [`SqlTarget`].

use etl_model::{EtlError, LookupTable, Result, Row, Table};
use tracing::{debug, info, warn};

use crate::StorageDriver;
use crate::cache::StatementCache;
use crate::dialect::Dialect;
use crate::sql::{
    InsertTemplate, create_table_sql, drop_table_sql, drop_view_sql, identity_insert_sql,
    label_view_sql,
};
use crate::target::{BatchCounter, TargetOptions};
use crate::value::{SqlValue, bind_rows};

/// A connection able to run statements of one dialect.
///
/// Errors are reported as database errors carrying the native message;
/// drivers add table and batch context.
pub trait SqlConnection {
    fn execute(&mut self, sql: &str) -> Result<()>;

    fn execute_insert(&mut self, template: &InsertTemplate, values: &[SqlValue]) -> Result<()>;

    fn table_exists(&mut self, table: &str) -> Result<bool>;

    fn table_created(&mut self, _table: &str) {}

    fn table_dropped(&mut self, _table: &str) {}

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Driver mechanics shared by the server dialects.
pub struct SqlTarget<C: SqlConnection> {
    dialect: Dialect,
    connection: C,
    options: TargetOptions,
    cache: StatementCache,
    batches: BatchCounter,
    closed: bool,
}

impl<C: SqlConnection> SqlTarget<C> {
    pub fn new(dialect: Dialect, connection: C, options: TargetOptions) -> Self {
        Self {
            dialect,
            connection,
            options,
            cache: StatementCache::new(dialect),
            batches: BatchCounter::default(),
            closed: false,
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EtlError::database("connection is closed"));
        }
        Ok(())
    }

    pub fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        self.ensure_open()?;
        let exists = self
            .connection
            .table_exists(&table.name)
            .map_err(|error| error.with_table(&table.name))?;
        if exists {
            if if_not_exists {
                return Ok(());
            }
            return Err(EtlError::table_exists(&table.name));
        }
        self.connection
            .execute(&create_table_sql(self.dialect, table, if_not_exists))
            .map_err(|error| error.with_table(&table.name))?;
        self.connection.table_created(&table.name);
        self.cache.invalidate(&table.name);
        info!(dialect = %self.dialect, table = %table.name, "created table");
        Ok(())
    }

    pub fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        self.ensure_open()?;
        if !if_exists {
            let exists = self
                .connection
                .table_exists(&table.name)
                .map_err(|error| error.with_table(&table.name))?;
            if !exists {
                return Err(EtlError::database("no such table").with_table(&table.name));
            }
        }
        let view = self.options.label_view_name(&table.name);
        self.connection
            .execute(&drop_view_sql(self.dialect, &view))
            .map_err(|error| error.with_table(&table.name))?;
        self.connection
            .execute(&drop_table_sql(self.dialect, &table.name, if_exists))
            .map_err(|error| error.with_table(&table.name))?;
        self.connection.table_dropped(&table.name);
        self.cache.invalidate(&table.name);
        debug!(dialect = %self.dialect, table = %table.name, "dropped table");
        Ok(())
    }

    /// Insert `rows` batch by batch, draining each batch once it is stored.
    /// `around` holds statements run before and after the batches; the
    /// closing one also runs when a batch fails.
    pub fn store_rows(
        &mut self,
        table: &Table,
        rows: &mut Vec<Row>,
        around: Option<(String, String)>,
    ) -> Result<usize> {
        self.ensure_open()?;
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some((before, _)) = &around {
            self.connection
                .execute(before)
                .map_err(|error| error.with_table(&table.name))?;
        }
        let stored = self.insert_batches(table, rows);
        let Some((_, after)) = &around else {
            return stored;
        };
        match (stored, self.connection.execute(after)) {
            (Ok(stored), Ok(())) => Ok(stored),
            (Ok(_), Err(error)) => Err(error.with_table(&table.name)),
            (Err(error), restored) => {
                if let Err(cleanup) = restored {
                    warn!(
                        dialect = %self.dialect,
                        table = %table.name,
                        error = %cleanup,
                        "closing statement failed after insert error"
                    );
                }
                Err(error)
            }
        }
    }

    fn insert_batches(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        let batch_size = self.options.rows_per_insert(self.dialect, table);
        let mut stored = 0;
        while !rows.is_empty() {
            let take = rows.len().min(batch_size);
            let batch = self.batches.next(&table.name);
            let values = bind_rows(table, &rows[..take]);
            let template = self.cache.insert_template(table, take);
            self.connection
                .execute_insert(template, &values)
                .map_err(|error| error.with_table(&table.name).with_batch(batch))?;
            rows.drain(..take);
            stored += take;
            debug!(dialect = %self.dialect, table = %table.name, batch, rows = take, "stored batch");
        }
        Ok(stored)
    }

    pub fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        self.ensure_open()?;
        let view = self.options.label_view_name(&table.name);
        for statement in label_view_sql(self.dialect, table, lookup, &view) {
            self.connection
                .execute(&statement)
                .map_err(|error| error.with_table(&table.name))?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connection.close()
    }
}

impl<C: SqlConnection> Drop for SqlTarget<C> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(dialect = %self.dialect, %error, "closing connection on drop");
        }
    }
}

pub struct MySqlDriver<C: SqlConnection> {
    target: SqlTarget<C>,
}

impl<C: SqlConnection> MySqlDriver<C> {
    pub fn new(connection: C, options: TargetOptions) -> Self {
        Self {
            target: SqlTarget::new(Dialect::MySql, connection, options),
        }
    }

    pub fn target(&self) -> &SqlTarget<C> {
        &self.target
    }
}

impl<C: SqlConnection> StorageDriver for MySqlDriver<C> {
    fn name(&self) -> &str {
        Dialect::MySql.as_str()
    }

    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        self.target.create_table(table, if_not_exists)
    }

    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        self.target.drop_table(table, if_exists)
    }

    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        self.target.store_rows(table, rows, None)
    }

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()> {
        self.target
            .store_rows(table, &mut vec![row.clone()], None)
            .map(|_| ())
    }

    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        self.target.replace_lookup_view(table, lookup)
    }

    fn close(&mut self) -> Result<()> {
        self.target.close()
    }
}

pub struct PostgresDriver<C: SqlConnection> {
    target: SqlTarget<C>,
}

impl<C: SqlConnection> PostgresDriver<C> {
    pub fn new(connection: C, options: TargetOptions) -> Self {
        Self {
            target: SqlTarget::new(Dialect::Postgres, connection, options),
        }
    }

    pub fn target(&self) -> &SqlTarget<C> {
        &self.target
    }
}

impl<C: SqlConnection> StorageDriver for PostgresDriver<C> {
    fn name(&self) -> &str {
        Dialect::Postgres.as_str()
    }

    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        self.target.create_table(table, if_not_exists)
    }

    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        self.target.drop_table(table, if_exists)
    }

    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        self.target.store_rows(table, rows, None)
    }

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()> {
        self.target
            .store_rows(table, &mut vec![row.clone()], None)
            .map(|_| ())
    }

    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        self.target.replace_lookup_view(table, lookup)
    }

    fn close(&mut self) -> Result<()> {
        self.target.close()
    }
}

/// SQL Server writes synthetic keys through `SET IDENTITY_INSERT`.
pub struct SqlServerDriver<C: SqlConnection> {
    target: SqlTarget<C>,
}

impl<C: SqlConnection> SqlServerDriver<C> {
    pub fn new(connection: C, options: TargetOptions) -> Self {
        Self {
            target: SqlTarget::new(Dialect::SqlServer, connection, options),
        }
    }

    pub fn target(&self) -> &SqlTarget<C> {
        &self.target
    }

    fn identity_statements(table: &Table) -> Option<(String, String)> {
        identity_insert_sql(table, true).zip(identity_insert_sql(table, false))
    }
}

impl<C: SqlConnection> StorageDriver for SqlServerDriver<C> {
    fn name(&self) -> &str {
        Dialect::SqlServer.as_str()
    }

    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        self.target.create_table(table, if_not_exists)
    }

    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        self.target.drop_table(table, if_exists)
    }

    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        self.target
            .store_rows(table, rows, Self::identity_statements(table))
    }

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()> {
        self.target
            .store_rows(table, &mut vec![row.clone()], Self::identity_statements(table))
            .map(|_| ())
    }

    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        self.target.replace_lookup_view(table, lookup)
    }

    fn close(&mut self) -> Result<()> {
        self.target.close()
    }
}
