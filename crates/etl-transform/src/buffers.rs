use std::collections::BTreeMap;

use etl_model::Row;

/// Pending rows per table, owned by the running task.
///
/// Rows stay here until a storage driver accepts them. The buffers also
/// count every row ever pushed, which is what the task reports.
#[derive(Debug, Default)]
pub struct RowBuffers {
    pending: BTreeMap<String, Vec<Row>>,
    created: BTreeMap<String, usize>,
}

impl RowBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        *self.created.entry(row.table.clone()).or_default() += 1;
        self.pending.entry(row.table.clone()).or_default().push(row);
    }

    pub fn pending(&self, table: &str) -> &[Row] {
        self.pending.get(table).map_or(&[], Vec::as_slice)
    }

    /// The buffer a driver drains on a successful flush.
    pub fn pending_mut(&mut self, table: &str) -> &mut Vec<Row> {
        self.pending.entry(table.to_string()).or_default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.pending.get(table).map_or(0, Vec::len)
    }

    pub fn total_pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_pending() == 0
    }

    /// Tables whose buffer reached `batch_size`.
    pub fn full_tables(&self, batch_size: usize) -> Vec<String> {
        self.pending
            .iter()
            .filter(|(_, rows)| !rows.is_empty() && rows.len() >= batch_size)
            .map(|(table, _)| table.clone())
            .collect()
    }

    pub fn created(&self, table: &str) -> usize {
        self.created.get(table).copied().unwrap_or(0)
    }

    pub fn created_counts(&self) -> &BTreeMap<String, usize> {
        &self.created
    }
}
