use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::{Field, FieldRole, FieldType};

/// How source rows of a record are laid out over a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowsType {
    /// One row per record.
    Root,
    /// One row per non-repeating event.
    ByEvents,
    /// One row per instance of a repeating event.
    ByRepeatingEvents,
    /// One row per instance of a repeating instrument.
    ByRepeatingInstruments,
    /// One row per declared field suffix of each parent row.
    BySuffixes,
    /// One row per (event, suffix) pair.
    ByEventsSuffixes,
}

impl RowsType {
    /// Keyword used in rule text.
    pub fn as_str(&self) -> &'static str {
        match self {
            RowsType::Root => "ROOT",
            RowsType::ByEvents => "EVENTS",
            RowsType::ByRepeatingEvents => "REPEATING_EVENTS",
            RowsType::ByRepeatingInstruments => "REPEATING_INSTRUMENTS",
            RowsType::BySuffixes => "SUFFIXES",
            RowsType::ByEventsSuffixes => "EVENTS_SUFFIXES",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_uppercase().as_str() {
            "ROOT" => Some(RowsType::Root),
            "EVENTS" => Some(RowsType::ByEvents),
            "REPEATING_EVENTS" => Some(RowsType::ByRepeatingEvents),
            "REPEATING_INSTRUMENTS" => Some(RowsType::ByRepeatingInstruments),
            "SUFFIXES" => Some(RowsType::BySuffixes),
            "EVENTS_SUFFIXES" => Some(RowsType::ByEventsSuffixes),
            _ => None,
        }
    }

    pub fn uses_suffixes(&self) -> bool {
        matches!(self, RowsType::BySuffixes | RowsType::ByEventsSuffixes)
    }

    pub fn uses_events(&self) -> bool {
        matches!(
            self,
            RowsType::ByEvents
                | RowsType::ByRepeatingEvents
                | RowsType::ByRepeatingInstruments
                | RowsType::ByEventsSuffixes
        )
    }
}

impl fmt::Display for RowsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output table. Built by the schema builder and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub parent: Option<String>,
    pub rows_type: RowsType,
    pub fields: Vec<Field>,
    /// Legal event names, or field suffixes for suffix tables.
    pub suffixes: Vec<String>,
    /// Instrument a repeating-instrument table is bound to.
    pub instrument: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows_type: RowsType) -> Self {
        Self {
            name: name.into(),
            parent: None,
            rows_type,
            fields: Vec::new(),
            suffixes: Vec::new(),
            instrument: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|field| field.is_primary_key())
    }

    pub fn foreign_key(&self) -> Option<&Field> {
        self.fields.iter().find(|field| field.is_foreign_key())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn data_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|field| field.role == FieldRole::Data)
    }

    pub fn has_lookup_fields(&self) -> bool {
        self.fields.iter().any(Field::uses_lookup)
    }

    /// True when the primary key is the record identifier.
    pub fn uses_natural_key(&self) -> bool {
        self.primary_key()
            .is_some_and(|key| key.field_type != FieldType::AutoIncrement)
    }
}
