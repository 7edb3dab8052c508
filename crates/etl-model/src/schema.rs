use serde::{Deserialize, Serialize};

use crate::lookup::LookupTable;
use crate::table::Table;

/// The table tree of one load, plus its lookup mapping.
///
/// Tables are stored in breadth-first order from the root, so iterating
/// `tables()` visits every parent before its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: Vec<Table>,
    lookup: LookupTable,
    record_id_field: String,
}

impl Schema {
    /// Assemble a schema from tables that are already in breadth-first order.
    pub fn new(tables: Vec<Table>, lookup: LookupTable, record_id_field: impl Into<String>) -> Self {
        Self {
            tables,
            lookup,
            record_id_field: record_id_field.into(),
        }
    }

    pub fn root(&self) -> Option<&Table> {
        self.tables.first()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|table| table.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables
            .iter()
            .filter(move |table| table.parent.as_deref() == Some(name))
    }

    pub fn parent_of(&self, table: &Table) -> Option<&Table> {
        table.parent.as_deref().and_then(|parent| self.table(parent))
    }

    /// Tables children-first, the order in which they can be dropped.
    pub fn drop_order(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().rev()
    }

    pub fn lookup(&self) -> &LookupTable {
        &self.lookup
    }

    pub fn record_id_field(&self) -> &str {
        &self.record_id_field
    }

    /// Depth of a table below the root, used for display.
    pub fn depth(&self, table: &Table) -> usize {
        let mut depth = 0;
        let mut current = table;
        while let Some(parent) = self.parent_of(current) {
            depth += 1;
            current = parent;
            if depth > self.tables.len() {
                break;
            }
        }
        depth
    }
}
