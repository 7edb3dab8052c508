use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One coded value and its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub code: String,
    pub label: String,
}

impl Choice {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Coded value to label mapping, addressed by output table and field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTable {
    entries: BTreeMap<String, BTreeMap<String, Vec<Choice>>>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, field: &str, choices: Vec<Choice>) {
        self.entries
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), choices);
    }

    pub fn get(&self, table: &str, field: &str) -> Option<&[Choice]> {
        self.entries
            .get(table)
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
    }

    pub fn label(&self, table: &str, field: &str, code: &str) -> Option<&str> {
        self.get(table, field)?
            .iter()
            .find(|choice| choice.code == code)
            .map(|choice| choice.label.as_str())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.entries
            .get(table)
            .is_some_and(|fields| !fields.is_empty())
    }

    /// `(field, choices)` pairs registered for a table, by field name.
    pub fn fields_of<'a>(&'a self, table: &str) -> impl Iterator<Item = (&'a str, &'a [Choice])> {
        self.entries
            .get(table)
            .into_iter()
            .flat_map(|fields| fields.iter())
            .map(|(field, choices)| (field.as_str(), choices.as_slice()))
    }

    /// Every `(table, field, choices)` entry in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[Choice])> {
        self.entries.iter().flat_map(|(table, fields)| {
            fields
                .iter()
                .map(move |(field, choices)| (table.as_str(), field.as_str(), choices.as_slice()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}
