use std::collections::HashMap;

use etl_model::Table;

use crate::dialect::Dialect;
use crate::sql::InsertTemplate;

/// INSERT templates keyed by (table, rows per statement), owned by one
/// driver and therefore scoped to one task.
#[derive(Debug)]
pub struct StatementCache {
    dialect: Dialect,
    templates: HashMap<(String, usize), InsertTemplate>,
    hits: usize,
}

impl StatementCache {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            templates: HashMap::new(),
            hits: 0,
        }
    }

    pub fn insert_template(&mut self, table: &Table, rows: usize) -> &InsertTemplate {
        let key = (table.name.clone(), rows);
        if self.templates.contains_key(&key) {
            self.hits += 1;
        }
        let dialect = self.dialect;
        self.templates
            .entry(key)
            .or_insert_with(|| InsertTemplate::new(dialect, table, rows))
    }

    /// Number of distinct templates built.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Lookups answered without building a template.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Forget templates of a table whose definition may have changed.
    pub fn invalidate(&mut self, table: &str) {
        self.templates.retain(|(name, _), _| name != table);
    }
}
