use std::collections::BTreeSet;

use etl_model::{EtlError, ProjectMetadata, Result};

use crate::ast::{FieldRule, RuleSet, TableRule};

/// Check a parsed rule set against metadata: a root exists, every source
/// field is known, and target names are unique per table.
pub fn validate_rules(rules: &RuleSet, metadata: &ProjectMetadata) -> Result<()> {
    if rules.root().is_none() {
        return Err(EtlError::schema("rule set declares no ROOT table"));
    }
    for table in &rules.tables {
        let mut targets = BTreeSet::new();
        for field in &table.fields {
            if !source_exists(metadata, table, field) {
                return Err(EtlError::schema_field(
                    &table.name,
                    &field.target,
                    format!("source field `{}` not found in metadata", field.source),
                ));
            }
            if !targets.insert(field.target.as_str()) {
                return Err(EtlError::schema_field(
                    &table.name,
                    &field.target,
                    "duplicate field name",
                ));
            }
        }
    }
    Ok(())
}

/// Suffix tables read `<source><suffix>` columns, so their sources only need
/// to exist in suffixed form.
fn source_exists(metadata: &ProjectMetadata, table: &TableRule, field: &FieldRule) -> bool {
    if metadata.has_field(&field.source) {
        return true;
    }
    if !table.rows_type.uses_suffixes() {
        return false;
    }
    metadata.fields.iter().any(|candidate| {
        candidate.field_name.starts_with(&field.source)
            && table
                .suffixes
                .iter()
                .any(|suffix| candidate.field_name.ends_with(suffix.as_str()))
    })
}
