//! Connection string parsing.

use std::fmt;
use std::path::PathBuf;

use etl_model::{EtlError, Result};

use crate::dialect::Dialect;

/// Address of a database server.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: Option<u16>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSpec {
    Server(ConnectionInfo),
    /// Database file (SQLite) or output directory (CSV).
    Path(PathBuf),
    /// In-memory SQLite database.
    Memory,
}

/// Parse a target connection string.
///
/// Server dialects take `host:user:password:database[:port]`, where `\:`
/// stands for a literal colon inside a segment. SQLite and CSV take a single
/// path; SQLite also accepts `:memory:`.
pub fn parse_connection_string(dialect: Dialect, value: &str) -> Result<ConnectionSpec> {
    if !dialect.is_server() {
        let value = value.trim();
        if value.is_empty() {
            return Err(EtlError::config(format!(
                "{dialect} target needs a path"
            )));
        }
        if dialect == Dialect::Sqlite && value == ":memory:" {
            return Ok(ConnectionSpec::Memory);
        }
        return Ok(ConnectionSpec::Path(PathBuf::from(value)));
    }

    let segments = split_segments(value);
    if !(4..=5).contains(&segments.len()) {
        return Err(EtlError::config(format!(
            "{dialect} connection string must be host:user:password:database[:port], found {} segments",
            segments.len()
        )));
    }
    for (index, name) in [(0, "host"), (1, "user"), (3, "database")] {
        if segments[index].is_empty() {
            return Err(EtlError::config(format!(
                "{dialect} connection string has an empty {name}"
            )));
        }
    }
    let port = match segments.get(4) {
        None => None,
        Some(port) => Some(port.parse::<u16>().map_err(|_| {
            EtlError::config(format!(
                "{dialect} connection string port `{port}` is not a number"
            ))
        })?),
    };
    let mut segments = segments.into_iter();
    let mut next = || segments.next().unwrap_or_default();
    Ok(ConnectionSpec::Server(ConnectionInfo {
        host: next(),
        user: next(),
        password: next(),
        database: next(),
        port,
    }))
}

fn split_segments(value: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&':') => {
                current.push(':');
                chars.next();
            }
            ':' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}
