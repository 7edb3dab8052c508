//! Live server clients, enabled by the `mysql` and `postgres` features.

#[cfg(feature = "mysql")]
pub use self::mysql_client::MySqlConnection;
#[cfg(feature = "postgres")]
pub use self::postgres_client::PostgresConnection;

#[cfg(feature = "mysql")]
mod mysql_client {
    use std::collections::HashMap;

    use etl_model::{EtlError, Result};
    use mysql::prelude::Queryable;
    use mysql::{Conn, OptsBuilder, Params, Statement, Value};
    use tracing::info;

    use crate::connection::ConnectionInfo;
    use crate::dialect::Dialect;
    use crate::server::SqlConnection;
    use crate::sql::{InsertTemplate, table_exists_sql};
    use crate::value::SqlValue;

    fn native(error: mysql::Error) -> EtlError {
        EtlError::database(error.to_string())
    }

    pub struct MySqlConnection {
        conn: Conn,
        prepared: HashMap<String, Statement>,
    }

    impl MySqlConnection {
        pub fn connect(info: &ConnectionInfo) -> Result<Self> {
            let opts = OptsBuilder::new()
                .ip_or_hostname(Some(info.host.as_str()))
                .user(Some(info.user.as_str()))
                .pass(Some(info.password.as_str()))
                .db_name(Some(info.database.as_str()))
                .tcp_port(info.port.unwrap_or(3306));
            let conn = Conn::new(opts).map_err(native)?;
            info!(host = %info.host, database = %info.database, "connected to mysql");
            Ok(Self {
                conn,
                prepared: HashMap::new(),
            })
        }
    }

    impl SqlConnection for MySqlConnection {
        fn execute(&mut self, sql: &str) -> Result<()> {
            self.conn.query_drop(sql).map_err(native)
        }

        fn execute_insert(&mut self, template: &InsertTemplate, values: &[SqlValue]) -> Result<()> {
            let statement = match self.prepared.get(template.sql()) {
                Some(statement) => statement.clone(),
                None => {
                    let statement = self.conn.prep(template.sql()).map_err(native)?;
                    self.prepared
                        .insert(template.sql().to_string(), statement.clone());
                    statement
                }
            };
            let params: Vec<Value> = values
                .iter()
                .map(|value| match value {
                    SqlValue::Null => Value::NULL,
                    SqlValue::Integer(value) => Value::Int(*value),
                    SqlValue::Text(text) => Value::Bytes(text.as_bytes().to_vec()),
                })
                .collect();
            self.conn
                .exec_drop(&statement, Params::Positional(params))
                .map_err(native)
        }

        fn table_exists(&mut self, table: &str) -> Result<bool> {
            let found: Option<mysql::Row> = self
                .conn
                .exec_first(table_exists_sql(Dialect::MySql), (table,))
                .map_err(native)?;
            Ok(found.is_some())
        }
    }
}

#[cfg(feature = "postgres")]
mod postgres_client {
    use std::collections::HashMap;

    use etl_model::{EtlError, Result};
    use postgres::types::ToSql;
    use postgres::{Client, Config, NoTls, Statement};
    use tracing::info;

    use crate::connection::ConnectionInfo;
    use crate::dialect::Dialect;
    use crate::server::SqlConnection;
    use crate::sql::{InsertTemplate, table_exists_sql};
    use crate::value::SqlValue;

    fn native(error: postgres::Error) -> EtlError {
        EtlError::database(error.to_string())
    }

    pub struct PostgresConnection {
        client: Option<Client>,
        prepared: HashMap<String, Statement>,
    }

    impl PostgresConnection {
        pub fn connect(info: &ConnectionInfo) -> Result<Self> {
            let mut config = Config::new();
            config
                .host(&info.host)
                .user(&info.user)
                .password(&info.password)
                .dbname(&info.database)
                .port(info.port.unwrap_or(5432));
            let client = config.connect(NoTls).map_err(native)?;
            info!(host = %info.host, database = %info.database, "connected to postgres");
            Ok(Self {
                client: Some(client),
                prepared: HashMap::new(),
            })
        }

        fn client(&mut self) -> Result<&mut Client> {
            self.client
                .as_mut()
                .ok_or_else(|| EtlError::database("connection is closed"))
        }
    }

    impl SqlConnection for PostgresConnection {
        fn execute(&mut self, sql: &str) -> Result<()> {
            self.client()?.batch_execute(sql).map_err(native)
        }

        fn execute_insert(&mut self, template: &InsertTemplate, values: &[SqlValue]) -> Result<()> {
            let statement = match self.prepared.get(template.sql()) {
                Some(statement) => statement.clone(),
                None => {
                    let statement = self.client()?.prepare(template.sql()).map_err(native)?;
                    self.prepared
                        .insert(template.sql().to_string(), statement.clone());
                    statement
                }
            };
            // Placeholders are typed TEXT and cast server-side.
            let texts: Vec<Option<String>> = values
                .iter()
                .map(|value| match value {
                    SqlValue::Null => None,
                    SqlValue::Integer(value) => Some(value.to_string()),
                    SqlValue::Text(text) => Some(text.clone()),
                })
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> = texts
                .iter()
                .map(|text| text as &(dyn ToSql + Sync))
                .collect();
            self.client()?
                .execute(&statement, &params)
                .map(|_| ())
                .map_err(native)
        }

        fn table_exists(&mut self, table: &str) -> Result<bool> {
            let found = self
                .client()?
                .query_opt(table_exists_sql(Dialect::Postgres), &[&table])
                .map_err(native)?;
            Ok(found.is_some())
        }

        fn close(&mut self) -> Result<()> {
            match self.client.take() {
                Some(client) => client.close().map_err(native),
                None => Ok(()),
            }
        }
    }
}
