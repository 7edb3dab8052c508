//! Compiled rule set.

use std::fmt;

use etl_model::{FieldType, RowsType};

/// One `FIELD` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub source: String,
    pub target: String,
    pub field_type: FieldType,
    pub size: Option<u32>,
    /// Line in the rule text, 0 for generated rules.
    pub line: usize,
}

impl FieldRule {
    pub fn new(source: impl Into<String>, target: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            field_type,
            size: None,
            line: 0,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }
}

/// One `ROOT` or `TABLE` statement and the fields declared under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRule {
    pub name: String,
    pub parent: Option<String>,
    pub key_field: String,
    pub rows_type: RowsType,
    /// Explicit event list for event tables, suffix list for suffix tables.
    pub suffixes: Vec<String>,
    /// Explicit instrument for repeating-instrument tables.
    pub instrument: Option<String>,
    pub fields: Vec<FieldRule>,
    pub line: usize,
}

impl TableRule {
    pub fn root(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            key_field: key_field.into(),
            rows_type: RowsType::Root,
            suffixes: Vec::new(),
            instrument: None,
            fields: Vec::new(),
            line: 0,
        }
    }

    pub fn child(
        name: impl Into<String>,
        parent: impl Into<String>,
        key_field: impl Into<String>,
        rows_type: RowsType,
    ) -> Self {
        Self {
            parent: Some(parent.into()),
            rows_type,
            ..Self::root(name, key_field)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    fn rows_token(&self) -> String {
        let keyword = self.rows_type.as_str();
        if let Some(instrument) = &self.instrument {
            return format!("{keyword}:{instrument}");
        }
        if self.suffixes.is_empty() {
            keyword.to_string()
        } else {
            format!("{keyword}:{}", self.suffixes.join(";"))
        }
    }
}

/// Ordered table statements; the root comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub tables: Vec<TableRule>,
}

impl RuleSet {
    pub fn root(&self) -> Option<&TableRule> {
        self.tables.iter().find(|table| table.is_root())
    }

    pub fn table(&self, name: &str) -> Option<&TableRule> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.tables.iter().map(|table| table.fields.len()).sum()
    }

    /// Render back to rule text that parses to an equivalent rule set.
    pub fn to_rules_text(&self) -> String {
        self.to_string()
    }
}

fn type_token(field: &FieldRule) -> String {
    match (field.field_type, field.size) {
        (FieldType::Integer, _) => "int".to_string(),
        (FieldType::Float, _) => "float".to_string(),
        (FieldType::Char, Some(size)) => format!("char({size})"),
        (FieldType::Date, _) => "date".to_string(),
        (FieldType::Checkbox, _) => "checkbox".to_string(),
        _ => "string".to_string(),
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, table) in self.tables.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            match &table.parent {
                None => writeln!(f, "ROOT {} {}", table.name, table.key_field)?,
                Some(parent) => writeln!(
                    f,
                    "TABLE {} {} {} {}",
                    table.name,
                    parent,
                    table.key_field,
                    table.rows_token()
                )?,
            }
            for field in &table.fields {
                writeln!(f, "FIELD {} {} {}", field.source, field.target, type_token(field))?;
            }
        }
        Ok(())
    }
}
