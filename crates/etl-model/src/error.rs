//! Error taxonomy shared by every stage of a load.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure, stable across crates and dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Config,
    RuleSyntax,
    Schema,
    Record,
    Database,
    Source,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG_ERROR",
            ErrorKind::RuleSyntax => "RULE_SYNTAX_ERROR",
            ErrorKind::Schema => "SCHEMA_ERROR",
            ErrorKind::Record => "RECORD_ERROR",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::Source => "SOURCE_ERROR",
        }
    }

    /// Record errors are the only kind a task may skip past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Record)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EtlError {
    /// Malformed connection string, missing or invalid setting.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A rule line that does not parse.
    #[error("rule syntax error at line {line}: {message} (`{text}`)")]
    RuleSyntax {
        line: usize,
        text: String,
        message: String,
    },

    /// Structural problem in rules, metadata or the resulting table tree.
    #[error("schema error{}: {message}", location(.table.as_deref(), .field.as_deref()))]
    Schema {
        message: String,
        table: Option<String>,
        field: Option<String>,
    },

    /// A record that cannot be mapped onto the table tree.
    #[error("record error for record `{record_id}`{}: {message}", location(.table.as_deref(), None))]
    Record {
        record_id: String,
        table: Option<String>,
        message: String,
    },

    /// Any failure reported by a storage target.
    #[error("database error{}{}: {message}", location(.table.as_deref(), None), batch_suffix(.batch.as_ref()))]
    Database {
        message: String,
        table: Option<String>,
        batch: Option<usize>,
    },

    /// The record/metadata collaborator failed or returned unusable data.
    #[error("source error: {message}")]
    Source { message: String },
}

fn location(table: Option<&str>, field: Option<&str>) -> String {
    match (table, field) {
        (Some(table), Some(field)) => format!(" in table `{table}`, field `{field}`"),
        (Some(table), None) => format!(" in table `{table}`"),
        (None, Some(field)) => format!(" for field `{field}`"),
        (None, None) => String::new(),
    }
}

fn batch_suffix(batch: Option<&usize>) -> String {
    batch.map(|batch| format!(" (batch {batch})")).unwrap_or_default()
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn rule_syntax(line: usize, text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleSyntax {
            line,
            text: text.into(),
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            table: None,
            field: None,
        }
    }

    pub fn schema_in(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            table: Some(table.into()),
            field: None,
        }
    }

    pub fn schema_field(
        table: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Schema {
            message: message.into(),
            table: Some(table.into()),
            field: Some(field.into()),
        }
    }

    pub fn record(
        record_id: impl Into<String>,
        table: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Record {
            record_id: record_id.into(),
            table,
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            table: None,
            batch: None,
        }
    }

    pub fn table_exists(table: impl Into<String>) -> Self {
        Self::Database {
            message: "table exists".to_string(),
            table: Some(table.into()),
            batch: None,
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Config { .. } => ErrorKind::Config,
            EtlError::RuleSyntax { .. } => ErrorKind::RuleSyntax,
            EtlError::Schema { .. } => ErrorKind::Schema,
            EtlError::Record { .. } => ErrorKind::Record,
            EtlError::Database { .. } => ErrorKind::Database,
            EtlError::Source { .. } => ErrorKind::Source,
        }
    }

    /// The message without kind or location decoration.
    pub fn message(&self) -> &str {
        match self {
            EtlError::Config { message }
            | EtlError::RuleSyntax { message, .. }
            | EtlError::Schema { message, .. }
            | EtlError::Record { message, .. }
            | EtlError::Database { message, .. }
            | EtlError::Source { message } => message,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            EtlError::Schema { table, .. }
            | EtlError::Record { table, .. }
            | EtlError::Database { table, .. } => table.as_deref(),
            _ => None,
        }
    }

    pub fn batch(&self) -> Option<usize> {
        match self {
            EtlError::Database { batch, .. } => *batch,
            _ => None,
        }
    }

    /// Attach a table name to errors that carry one, keeping an existing name.
    #[must_use]
    pub fn with_table(mut self, name: &str) -> Self {
        match &mut self {
            EtlError::Schema { table, .. }
            | EtlError::Record { table, .. }
            | EtlError::Database { table, .. } => {
                if table.is_none() {
                    *table = Some(name.to_string());
                }
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn with_batch(mut self, index: usize) -> Self {
        if let EtlError::Database { batch, .. } = &mut self {
            *batch = Some(index);
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
