//! Typed parameter values.

use etl_model::{Field, Row, Table};

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl SqlValue {
    /// Bind a cell: empty is NULL, integer-valued columns bind as integers
    /// when the cell parses, everything else as text.
    pub fn from_cell(field: &Field, cell: &str) -> Self {
        if cell.is_empty() {
            return SqlValue::Null;
        }
        if field.is_integer_valued() {
            if let Ok(value) = cell.trim().parse::<i64>() {
                return SqlValue::Integer(value);
            }
        }
        SqlValue::Text(cell.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// Parameters for a batch of rows, row-major.
pub fn bind_rows(table: &Table, rows: &[Row]) -> Vec<SqlValue> {
    let mut values = Vec::with_capacity(rows.len() * table.fields.len());
    for row in rows {
        for (field, cell) in table.fields.iter().zip(&row.values) {
            values.push(SqlValue::from_cell(field, cell));
        }
    }
    values
}
