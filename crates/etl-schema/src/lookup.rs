//! Coded value to label mapping for lookup-flagged fields.

use etl_model::{
    Choice, EtlError, Field, FieldRole, FieldType, KeyValue, LookupTable, ProjectMetadata,
    Result, Row, RowsType, Table,
};
use etl_model::ids::CHECKED;
use tracing::debug;

pub struct LookupCompiler<'a> {
    metadata: &'a ProjectMetadata,
}

impl<'a> LookupCompiler<'a> {
    pub fn new(metadata: &'a ProjectMetadata) -> Self {
        Self { metadata }
    }

    /// Register the choice list of every lookup-flagged field under its
    /// output table and field name.
    ///
    /// A checkbox-derived field maps the checked value to its choice label.
    pub fn compile(&self, tables: &[Table]) -> Result<LookupTable> {
        let mut lookup = LookupTable::new();
        for table in tables {
            for field in &table.fields {
                let Some(reference) = &field.lookup else {
                    continue;
                };
                let choices = self.metadata.choices(&reference.source_field).ok_or_else(|| {
                    EtlError::schema_field(
                        &table.name,
                        &field.name,
                        format!(
                            "choice list for `{}` is not declared in metadata",
                            reference.source_field
                        ),
                    )
                })?;
                match &reference.choice {
                    Some(code) => {
                        let choice = choices
                            .iter()
                            .find(|choice| choice.code == *code)
                            .ok_or_else(|| {
                                EtlError::schema_field(
                                    &table.name,
                                    &field.name,
                                    format!(
                                        "choice `{code}` is not declared for `{}`",
                                        reference.source_field
                                    ),
                                )
                            })?;
                        lookup.insert(
                            &table.name,
                            &field.name,
                            vec![Choice::new(CHECKED, &choice.label)],
                        );
                    }
                    None => lookup.insert(&table.name, &field.name, choices),
                }
            }
        }
        debug!(entries = lookup.len(), "compiled lookup table");
        Ok(lookup)
    }
}

/// Definition of a table persisting the lookup mapping.
pub fn lookup_table_definition(name: &str) -> Table {
    let mut table = Table::new(name, RowsType::Root);
    table.fields = vec![
        Field::primary_key(format!("{name}_id")),
        Field::identifier("table_name", FieldRole::Data, FieldType::String),
        Field::identifier("field_name", FieldRole::Data, FieldType::String),
        Field::identifier("value", FieldRole::Data, FieldType::String),
        Field::identifier("label", FieldRole::Data, FieldType::String),
    ];
    table
}

/// One row per (table, field, code) entry, keyed from 1.
pub fn lookup_rows(definition: &Table, lookup: &LookupTable) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut key = 0i64;
    for (table, field, choices) in lookup.iter() {
        for choice in choices {
            key += 1;
            let mut row = Row::new(definition, KeyValue::Int(key), "");
            row.values = vec![
                key.to_string(),
                table.to_string(),
                field.to_string(),
                choice.code.clone(),
                choice.label.clone(),
            ];
            rows.push(row);
        }
    }
    rows
}
