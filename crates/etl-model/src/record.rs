use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One flat row exported for a record, tagged with its repeating context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub event: Option<String>,
    pub repeat_instrument: Option<String>,
    pub repeat_instance: Option<u32>,
    pub values: BTreeMap<String, String>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    #[must_use]
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.repeat_instrument = Some(instrument.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: u32) -> Self {
        self.repeat_instance = Some(instance);
        self
    }

    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Trimmed value of a column; empty when the column is absent.
    pub fn value(&self, field: &str) -> &str {
        self.values.get(field).map_or("", |value| value.trim())
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Rows that belong to neither a repeating event nor a repeating
    /// instrument.
    pub fn is_plain(&self) -> bool {
        self.repeat_instance.is_none() && self.repeat_instrument.is_none()
    }
}

/// Every row exported for one record identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub record_id: String,
    pub rows: Vec<SourceRow>,
}

impl SourceRecord {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: SourceRow) -> Self {
        self.rows.push(row);
        self
    }
}
