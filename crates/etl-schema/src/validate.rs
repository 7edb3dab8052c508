//! Structural checks run on every freshly built table tree.

use std::collections::{BTreeMap, BTreeSet};

use etl_model::ids::CHECKBOX_SEPARATOR;
use etl_model::{EtlError, FieldType, ProjectMetadata, Result, Table};

/// Tables must be in breadth-first order (parents before children).
pub fn validate_tables(tables: &[Table], metadata: &ProjectMetadata) -> Result<()> {
    let mut names = BTreeSet::new();
    for table in tables {
        if !names.insert(table.name.as_str()) {
            return Err(EtlError::schema_in(&table.name, "duplicate table name"));
        }
        validate_fields(table)?;
        validate_keys(table, tables, &names)?;
        validate_checkboxes(table, metadata)?;
    }
    Ok(())
}

fn validate_fields(table: &Table) -> Result<()> {
    let mut names = BTreeSet::new();
    for field in &table.fields {
        if field.name.is_empty() {
            return Err(EtlError::schema_in(&table.name, "field with an empty name"));
        }
        if !names.insert(field.name.as_str()) {
            return Err(EtlError::schema_field(
                &table.name,
                &field.name,
                "duplicate field name",
            ));
        }
        if field.field_type == FieldType::Char && field.size.is_none_or(|size| size == 0) {
            return Err(EtlError::schema_field(
                &table.name,
                &field.name,
                "char field without a size",
            ));
        }
    }
    Ok(())
}

fn validate_keys(table: &Table, tables: &[Table], earlier: &BTreeSet<&str>) -> Result<()> {
    let primary_keys = table.fields.iter().filter(|field| field.is_primary_key()).count();
    if primary_keys != 1 {
        return Err(EtlError::schema_in(
            &table.name,
            format!("expected exactly one primary key, found {primary_keys}"),
        ));
    }
    let foreign_keys: Vec<_> = table
        .fields
        .iter()
        .filter(|field| field.is_foreign_key())
        .collect();
    let Some(parent_name) = table.parent.as_deref() else {
        if !foreign_keys.is_empty() {
            return Err(EtlError::schema_in(&table.name, "root table has a foreign key"));
        }
        return Ok(());
    };
    if parent_name == table.name || !earlier.contains(parent_name) {
        return Err(EtlError::schema_in(
            &table.name,
            format!("cyclic or missing parent table `{parent_name}`"),
        ));
    }
    let [foreign_key] = foreign_keys.as_slice() else {
        return Err(EtlError::schema_in(
            &table.name,
            format!("expected exactly one foreign key, found {}", foreign_keys.len()),
        ));
    };
    let parent_key = tables
        .iter()
        .find(|candidate| candidate.name == parent_name)
        .and_then(Table::primary_key)
        .ok_or_else(|| EtlError::schema_in(parent_name, "parent table has no primary key"))?;
    let reference = foreign_key.references.as_ref().ok_or_else(|| {
        EtlError::schema_field(&table.name, &foreign_key.name, "foreign key references nothing")
    })?;
    if reference.table != parent_name || reference.key_type != parent_key.key_type() {
        return Err(EtlError::schema_field(
            &table.name,
            &foreign_key.name,
            format!("foreign key does not match the primary key of `{parent_name}`"),
        ));
    }
    Ok(())
}

/// Every expanded checkbox group has exactly one column per declared choice.
fn validate_checkboxes(table: &Table, metadata: &ProjectMetadata) -> Result<()> {
    let mut groups: BTreeMap<&str, (&str, usize)> = BTreeMap::new();
    for field in &table.fields {
        let Some((source, _)) = field.checkbox_choice() else {
            continue;
        };
        let prefix = field
            .name
            .rsplit_once(CHECKBOX_SEPARATOR)
            .map_or(field.name.as_str(), |(prefix, _)| prefix);
        groups.entry(prefix).or_insert((source, 0)).1 += 1;
    }
    for (prefix, (source, count)) in groups {
        let declared = metadata.choices(source).map_or(0, |choices| choices.len());
        if declared != count {
            return Err(EtlError::schema_field(
                &table.name,
                prefix,
                format!("checkbox expands to {count} fields but `{source}` declares {declared} choices"),
            ));
        }
    }
    Ok(())
}
