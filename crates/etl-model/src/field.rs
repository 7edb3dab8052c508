//! Output column definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::CHECKBOX_SEPARATOR;

/// Semantic type of an output column. Storage targets map each variant to a
/// native column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Char,
    Date,
    Checkbox,
    AutoIncrement,
    ForeignKey,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::String => "STRING",
            FieldType::Char => "CHAR",
            FieldType::Date => "DATE",
            FieldType::Checkbox => "CHECKBOX",
            FieldType::AutoIncrement => "AUTO_INCREMENT",
            FieldType::ForeignKey => "FOREIGN_KEY",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a column holds, independent of its storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    PrimaryKey,
    ForeignKey,
    RecordId,
    EventName,
    RepeatInstrument,
    RepeatInstance,
    Suffix,
    Data,
}

impl FieldRole {
    pub fn is_identifier(&self) -> bool {
        !matches!(self, FieldRole::Data)
    }
}

/// Native shape of a primary key, carried by foreign keys that point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Integer,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReference {
    pub table: String,
    pub key_type: KeyType,
}

/// Back-reference from a coded output column to the metadata field whose
/// choice list labels it. Checkbox-derived columns also carry their choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRef {
    pub source_field: String,
    pub choice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub role: FieldRole,
    /// Column size, only meaningful for `CHAR`.
    pub size: Option<u32>,
    /// Source column the value is read from. `None` for synthesized columns.
    pub source: Option<String>,
    pub lookup: Option<LookupRef>,
    pub references: Option<KeyReference>,
}

impl Field {
    pub fn data(name: impl Into<String>, source: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            role: FieldRole::Data,
            size: None,
            source: Some(source.into()),
            lookup: None,
            references: None,
        }
    }

    /// Synthetic auto-increment primary key.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::AutoIncrement,
            role: FieldRole::PrimaryKey,
            size: None,
            source: None,
            lookup: None,
            references: None,
        }
    }

    /// Primary key holding the record identifier itself.
    pub fn natural_key(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: Some(name.clone()),
            name,
            field_type: FieldType::String,
            role: FieldRole::PrimaryKey,
            size: None,
            lookup: None,
            references: None,
        }
    }

    pub fn foreign_key(name: impl Into<String>, references: KeyReference) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::ForeignKey,
            role: FieldRole::ForeignKey,
            size: None,
            source: None,
            lookup: None,
            references: Some(references),
        }
    }

    pub fn identifier(name: impl Into<String>, role: FieldRole, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            role,
            size: None,
            source: None,
            lookup: None,
            references: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: Option<u32>) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: LookupRef) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.role == FieldRole::PrimaryKey
    }

    pub fn is_foreign_key(&self) -> bool {
        self.role == FieldRole::ForeignKey
    }

    pub fn uses_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// Checkbox-derived column: `(source field, choice code)`.
    pub fn checkbox_choice(&self) -> Option<(&str, &str)> {
        if self.field_type != FieldType::Checkbox {
            return None;
        }
        let lookup = self.lookup.as_ref()?;
        let choice = lookup.choice.as_deref()?;
        Some((lookup.source_field.as_str(), choice))
    }

    /// True when values of this column are bound as integers.
    pub fn is_integer_valued(&self) -> bool {
        match self.field_type {
            FieldType::Integer | FieldType::Checkbox | FieldType::AutoIncrement => true,
            FieldType::ForeignKey => self
                .references
                .as_ref()
                .is_some_and(|reference| reference.key_type == KeyType::Integer),
            _ => false,
        }
    }

    /// Key shape when this field is used as a primary key.
    pub fn key_type(&self) -> KeyType {
        if self.is_integer_valued() {
            KeyType::Integer
        } else {
            KeyType::Text
        }
    }
}

/// Column name of the expanded checkbox field for one choice.
///
/// Codes are lowercased and any character outside `[a-z0-9_]` becomes `_`,
/// which matches how capture platforms name exported checkbox columns.
pub fn checkbox_field_name(field: &str, code: &str) -> String {
    let code: String = code
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{field}{CHECKBOX_SEPARATOR}{code}")
}
