use std::collections::BTreeMap;

use etl_model::{DEFAULT_BATCH_SIZE, LoadOptions, Table};
use etl_model::options::DEFAULT_LABEL_VIEW_SUFFIX;

use crate::dialect::Dialect;

/// Settings every driver needs from the task options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOptions {
    pub batch_size: usize,
    pub label_view_suffix: String,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            label_view_suffix: DEFAULT_LABEL_VIEW_SUFFIX.to_string(),
        }
    }
}

impl From<&LoadOptions> for TargetOptions {
    fn from(options: &LoadOptions) -> Self {
        Self {
            batch_size: options.batch_size,
            label_view_suffix: options.label_view_suffix.clone(),
        }
    }
}

impl TargetOptions {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Rows per statement, never zero.
    pub fn rows_per_batch(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Rows per `INSERT` into `table`, capped by what `dialect` accepts in
    /// one statement.
    pub fn rows_per_insert(&self, dialect: Dialect, table: &Table) -> usize {
        dialect.rows_per_insert(self.rows_per_batch(), table.fields.len())
    }

    pub fn label_view_name(&self, table: &str) -> String {
        format!("{table}{}", self.label_view_suffix)
    }
}

/// Running batch index per table, starting at 1.
#[derive(Debug, Default)]
pub(crate) struct BatchCounter {
    next: BTreeMap<String, usize>,
}

impl BatchCounter {
    pub(crate) fn next(&mut self, table: &str) -> usize {
        let counter = self.next.entry(table.to_string()).or_default();
        *counter += 1;
        *counter
    }
}
