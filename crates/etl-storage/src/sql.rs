//! Dialect-specific SQL text: quoting, column types, DDL, INSERT templates
//! and label views.

use etl_model::{Field, FieldRole, FieldType, KeyType, LookupTable, Table};

use crate::dialect::Dialect;
use crate::value::SqlValue;

pub fn quote_ident(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
        Dialect::Sqlite | Dialect::Csv | Dialect::Postgres => {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }
}

/// Native column definition for a field.
pub fn column_type(dialect: Dialect, field: &Field) -> String {
    let size = field.size.unwrap_or(1);
    if field.role == FieldRole::PrimaryKey && field.field_type != FieldType::AutoIncrement {
        return match dialect {
            Dialect::Sqlite | Dialect::Csv => "TEXT PRIMARY KEY".to_string(),
            Dialect::MySql => "VARCHAR(255) NOT NULL PRIMARY KEY".to_string(),
            Dialect::Postgres => "VARCHAR(255) PRIMARY KEY".to_string(),
            Dialect::SqlServer => "NVARCHAR(255) NOT NULL PRIMARY KEY".to_string(),
        };
    }
    let text_key = field
        .references
        .as_ref()
        .is_some_and(|reference| reference.key_type == KeyType::Text);
    let native = match (dialect, field.field_type) {
        (Dialect::Sqlite | Dialect::Csv, kind) => match kind {
            FieldType::Integer | FieldType::Checkbox => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::String => "TEXT",
            FieldType::Char => return format!("CHAR({size})"),
            FieldType::Date => "DATE",
            FieldType::AutoIncrement => "INTEGER PRIMARY KEY",
            FieldType::ForeignKey if text_key => "TEXT",
            FieldType::ForeignKey => "INTEGER",
        },
        (Dialect::MySql, kind) => match kind {
            FieldType::Integer => "INT",
            FieldType::Float => "FLOAT",
            FieldType::String => "TEXT",
            FieldType::Char => return format!("CHAR({size})"),
            FieldType::Date => "DATE",
            FieldType::Checkbox => "TINYINT",
            FieldType::AutoIncrement => "INT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            FieldType::ForeignKey if text_key => "VARCHAR(255)",
            FieldType::ForeignKey => "INT",
        },
        (Dialect::Postgres, kind) => match kind {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::String => "TEXT",
            FieldType::Char => return format!("CHAR({size})"),
            FieldType::Date => "DATE",
            FieldType::Checkbox => "SMALLINT",
            FieldType::AutoIncrement => "SERIAL PRIMARY KEY",
            FieldType::ForeignKey if text_key => "VARCHAR(255)",
            FieldType::ForeignKey => "INTEGER",
        },
        (Dialect::SqlServer, kind) => match kind {
            FieldType::Integer => "INT",
            FieldType::Float => "FLOAT",
            FieldType::String => "NVARCHAR(MAX)",
            FieldType::Char => return format!("NCHAR({size})"),
            FieldType::Date => "DATE",
            FieldType::Checkbox => "BIT",
            FieldType::AutoIncrement => "INT NOT NULL IDENTITY(1,1) PRIMARY KEY",
            FieldType::ForeignKey if text_key => "NVARCHAR(255)",
            FieldType::ForeignKey => "INT",
        },
    };
    native.to_string()
}

pub fn create_table_sql(dialect: Dialect, table: &Table, if_not_exists: bool) -> String {
    let columns: Vec<String> = table
        .fields
        .iter()
        .map(|field| {
            format!(
                "{} {}",
                quote_ident(dialect, &field.name),
                column_type(dialect, field)
            )
        })
        .collect();
    let name = quote_ident(dialect, &table.name);
    let body = columns.join(", ");
    match (dialect, if_not_exists) {
        (Dialect::SqlServer, true) => format!(
            "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {name} ({body})",
            table.name.replace('\'', "''")
        ),
        (_, true) => format!("CREATE TABLE IF NOT EXISTS {name} ({body})"),
        (_, false) => format!("CREATE TABLE {name} ({body})"),
    }
}

pub fn drop_table_sql(dialect: Dialect, table: &str, if_exists: bool) -> String {
    let name = quote_ident(dialect, table);
    if if_exists {
        format!("DROP TABLE IF EXISTS {name}")
    } else {
        format!("DROP TABLE {name}")
    }
}

pub fn drop_view_sql(dialect: Dialect, view: &str) -> String {
    format!("DROP VIEW IF EXISTS {}", quote_ident(dialect, view))
}

/// Query returning a row when the named table exists. Takes the table name
/// as its only parameter.
pub fn table_exists_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite | Dialect::Csv => {
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1"
        }
        Dialect::MySql => {
            "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?"
        }
        Dialect::Postgres => {
            "SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1"
        }
        Dialect::SqlServer => "SELECT 1 FROM sys.tables WHERE name = @P1",
    }
}

/// Render a value as a SQL literal.
pub fn literal(dialect: Dialect, value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(value) => value.to_string(),
        SqlValue::Text(text) => text_literal(dialect, text),
    }
}

fn text_literal(dialect: Dialect, text: &str) -> String {
    match dialect {
        Dialect::MySql => format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''")),
        Dialect::SqlServer => format!("N'{}'", text.replace('\'', "''")),
        Dialect::Sqlite | Dialect::Csv | Dialect::Postgres => {
            format!("'{}'", text.replace('\'', "''"))
        }
    }
}

/// Multi-row INSERT for one table and a fixed number of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertTemplate {
    dialect: Dialect,
    head: String,
    /// Postgres cast applied to each column's text parameter.
    casts: Vec<Option<&'static str>>,
    rows: usize,
    sql: String,
}

impl InsertTemplate {
    pub fn new(dialect: Dialect, table: &Table, rows: usize) -> Self {
        let columns: Vec<String> = table
            .fields
            .iter()
            .map(|field| quote_ident(dialect, &field.name))
            .collect();
        let head = format!(
            "INSERT INTO {} ({}) VALUES ",
            quote_ident(dialect, &table.name),
            columns.join(", ")
        );
        let casts = table.fields.iter().map(postgres_cast).collect();
        let mut template = Self {
            dialect,
            head,
            casts,
            rows,
            sql: String::new(),
        };
        template.sql = template.render(|index| template.placeholder(index));
        template
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn parameter_count(&self) -> usize {
        self.rows * self.casts.len()
    }

    /// Statement text with positional placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement text with the values inlined as literals.
    pub fn inline(&self, values: &[SqlValue]) -> String {
        self.render(|index| {
            values
                .get(index)
                .map_or_else(|| "NULL".to_string(), |value| literal(self.dialect, value))
        })
    }

    fn placeholder(&self, index: usize) -> String {
        let position = index + 1;
        match self.dialect {
            Dialect::Postgres => {
                let column = index % self.casts.len().max(1);
                match self.casts.get(column).copied().flatten() {
                    Some(cast) => format!("${position}::TEXT::{cast}"),
                    None => format!("${position}::TEXT"),
                }
            }
            Dialect::SqlServer => format!("@P{position}"),
            Dialect::Sqlite | Dialect::Csv | Dialect::MySql => "?".to_string(),
        }
    }

    fn render(&self, mut value: impl FnMut(usize) -> String) -> String {
        let width = self.casts.len();
        let mut sql = self.head.clone();
        for row in 0..self.rows {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for column in 0..width {
                if column > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&value(row * width + column));
            }
            sql.push(')');
        }
        sql
    }
}

fn postgres_cast(field: &Field) -> Option<&'static str> {
    match field.field_type {
        FieldType::Integer | FieldType::AutoIncrement => Some("INTEGER"),
        FieldType::Checkbox => Some("SMALLINT"),
        FieldType::Float => Some("DOUBLE PRECISION"),
        FieldType::Date => Some("DATE"),
        FieldType::ForeignKey if field.is_integer_valued() => Some("INTEGER"),
        _ => None,
    }
}

/// Statements replacing the label view of a table. Empty when the table has
/// no lookup entries.
pub fn label_view_sql(
    dialect: Dialect,
    table: &Table,
    lookup: &LookupTable,
    view: &str,
) -> Vec<String> {
    if !lookup.has_table(&table.name) {
        return Vec::new();
    }
    let columns: Vec<String> = table
        .fields
        .iter()
        .map(|field| {
            let column = quote_ident(dialect, &field.name);
            let Some(choices) = lookup.get(&table.name, &field.name) else {
                return column;
            };
            let arms: Vec<String> = choices
                .iter()
                .map(|choice| {
                    let code = match choice.code.parse::<i64>() {
                        Ok(code) if field.is_integer_valued() => SqlValue::Integer(code),
                        _ => SqlValue::Text(choice.code.clone()),
                    };
                    format!(
                        "WHEN {} THEN {}",
                        literal(dialect, &code),
                        text_literal(dialect, &choice.label)
                    )
                })
                .collect();
            format!("CASE {column} {} ELSE NULL END AS {column}", arms.join(" "))
        })
        .collect();
    let select = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_ident(dialect, &table.name)
    );
    let view_name = quote_ident(dialect, view);
    match dialect {
        Dialect::MySql | Dialect::Postgres => {
            vec![format!("CREATE OR REPLACE VIEW {view_name} AS {select}")]
        }
        Dialect::SqlServer => vec![format!("CREATE OR ALTER VIEW {view_name} AS {select}")],
        Dialect::Sqlite | Dialect::Csv => vec![
            drop_view_sql(dialect, view),
            format!("CREATE VIEW {view_name} AS {select}"),
        ],
    }
}

/// Statements wrapping explicit writes of an identity column.
pub fn identity_insert_sql(table: &Table, enable: bool) -> Option<String> {
    let identity = table
        .primary_key()
        .is_some_and(|key| key.field_type == FieldType::AutoIncrement);
    identity.then(|| {
        format!(
            "SET IDENTITY_INSERT {} {}",
            quote_ident(Dialect::SqlServer, &table.name),
            if enable { "ON" } else { "OFF" }
        )
    })
}
