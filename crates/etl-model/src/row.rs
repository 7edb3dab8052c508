use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Primary or foreign key value of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(value) => write!(f, "{value}"),
            KeyValue::Text(value) => f.write_str(value),
        }
    }
}

/// One output row. `values` is aligned with the owning table's fields; an
/// empty string stands for a missing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub table: String,
    pub primary_key: KeyValue,
    pub foreign_key: Option<KeyValue>,
    pub record_id: String,
    pub event: Option<String>,
    pub repeat_instrument: Option<String>,
    pub instance: Option<u32>,
    pub suffix: Option<String>,
    pub values: Vec<String>,
}

impl Row {
    pub fn new(table: &Table, primary_key: KeyValue, record_id: impl Into<String>) -> Self {
        Self {
            table: table.name.clone(),
            primary_key,
            foreign_key: None,
            record_id: record_id.into(),
            event: None,
            repeat_instrument: None,
            instance: None,
            suffix: None,
            values: vec![String::new(); table.fields.len()],
        }
    }

    /// Value of the named field, `None` when the table has no such field.
    pub fn get<'a>(&'a self, table: &Table, field: &str) -> Option<&'a str> {
        let index = table.field_index(field)?;
        self.values.get(index).map(String::as_str)
    }

    pub fn set(&mut self, index: usize, value: impl Into<String>) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
    }
}
