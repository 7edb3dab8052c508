//! Options controlling one load task.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_LABEL_VIEW_SUFFIX: &str = "_label_view";

/// What to do with a candidate row whose data fields are all empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRowPolicy {
    /// Do not emit the row. Root rows are always emitted.
    #[default]
    Skip,
    /// Emit the row with empty values.
    Keep,
}

/// Options for one extract/transform/load task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    /// Rows per INSERT statement, and buffer size that triggers a flush.
    pub batch_size: usize,
    pub empty_rows: EmptyRowPolicy,
    /// Escalate record errors to task failures.
    pub strict: bool,
    /// Create a label view for every table with coded fields.
    pub label_views: bool,
    pub label_view_suffix: String,
    /// Persist the lookup mapping into a table of this name.
    pub lookup_table: Option<String>,
    /// Keep `<form>_complete` status fields when generating rules.
    pub include_complete_fields: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            empty_rows: EmptyRowPolicy::Skip,
            strict: false,
            label_views: true,
            label_view_suffix: DEFAULT_LABEL_VIEW_SUFFIX.to_string(),
            lookup_table: None,
            include_complete_fields: false,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_empty_rows(mut self, policy: EmptyRowPolicy) -> Self {
        self.empty_rows = policy;
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_label_views(mut self, enable: bool) -> Self {
        self.label_views = enable;
        self
    }

    #[must_use]
    pub fn with_lookup_table(mut self, name: Option<String>) -> Self {
        self.lookup_table = name;
        self
    }

    #[must_use]
    pub fn with_complete_fields(mut self, enable: bool) -> Self {
        self.include_complete_fields = enable;
        self
    }

    /// Name of the label view created for a table.
    pub fn label_view_name(&self, table: &str) -> String {
        format!("{table}{}", self.label_view_suffix)
    }
}
