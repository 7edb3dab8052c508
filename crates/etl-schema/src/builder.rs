//! Table tree construction.

use std::collections::{BTreeSet, VecDeque};

use etl_model::ids::{
    EVENT_NAME_FIELD, REPEAT_INSTANCE_FIELD, REPEAT_INSTRUMENT_FIELD, SUFFIX_FIELD,
};
use etl_model::{
    EtlError, Field, FieldRole, FieldType, KeyReference, LookupRef, ProjectMetadata,
    Result, RowsType, Schema, Table, checkbox_field_name,
};
use etl_rules::{FieldRule, RuleSet, TableRule};
use tracing::{debug, info, info_span};

use crate::lookup::LookupCompiler;
use crate::suffixes::derive_suffixes;
use crate::validate::validate_tables;

/// Turns a validated rule set into the output table tree.
pub struct SchemaBuilder<'a> {
    metadata: &'a ProjectMetadata,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(metadata: &'a ProjectMetadata) -> Self {
        Self { metadata }
    }

    /// Build tables in breadth-first order, compile the lookup mapping and
    /// check the tree invariants.
    pub fn build(&self, rules: &RuleSet) -> Result<Schema> {
        let span = info_span!("build_schema", tables = rules.tables.len());
        let _guard = span.enter();

        // =====================================================================
        // Stage 1: Order table statements root first
        // =====================================================================
        let ordered = table_order(rules)?;

        // =====================================================================
        // Stage 2: Synthesize keys and expand fields
        // =====================================================================
        let mut tables: Vec<Table> = Vec::with_capacity(ordered.len());
        for rule in ordered {
            let parent = match rule.parent.as_deref() {
                Some(name) => tables.iter().find(|table| table.name == name),
                None => None,
            };
            let table = self.build_table(rule, parent)?;
            debug!(
                table = %table.name,
                rows_type = %table.rows_type,
                fields = table.fields.len(),
                suffixes = table.suffixes.len(),
                "built table"
            );
            tables.push(table);
        }

        // =====================================================================
        // Stage 3: Validate and compile lookups
        // =====================================================================
        validate_tables(&tables, self.metadata)?;
        let lookup = LookupCompiler::new(self.metadata).compile(&tables)?;

        info!(
            tables = tables.len(),
            lookup_fields = lookup.len(),
            "schema built"
        );
        Ok(Schema::new(
            tables,
            lookup,
            self.metadata.record_id_field(),
        ))
    }

    fn build_table(&self, rule: &TableRule, parent: Option<&Table>) -> Result<Table> {
        let record_id = self.metadata.record_id_field();
        let mut table = Table::new(&rule.name, rule.rows_type);
        table.parent = rule.parent.clone();

        // Keys
        let natural_root = rule.is_root() && rule.key_field == record_id;
        if natural_root {
            table.fields.push(Field::natural_key(&rule.key_field));
        } else {
            table.fields.push(Field::primary_key(&rule.key_field));
        }
        let mut foreign_key_name = None;
        if let Some(parent) = parent {
            let parent_key = parent.primary_key().ok_or_else(|| {
                EtlError::schema_in(&parent.name, "parent table has no primary key")
            })?;
            table.fields.push(Field::foreign_key(
                &parent_key.name,
                KeyReference {
                    table: parent.name.clone(),
                    key_type: parent_key.key_type(),
                },
            ));
            foreign_key_name = Some(parent_key.name.clone());
        }

        // Identifiers
        if !natural_root && foreign_key_name.as_deref() != Some(record_id) {
            table.fields.push(Field::identifier(
                record_id,
                FieldRole::RecordId,
                FieldType::String,
            ));
        }
        if self.metadata.is_longitudinal() && rule.rows_type.uses_events() {
            table.fields.push(Field::identifier(
                EVENT_NAME_FIELD,
                FieldRole::EventName,
                FieldType::String,
            ));
        }
        match rule.rows_type {
            RowsType::ByRepeatingInstruments => {
                table.fields.push(Field::identifier(
                    REPEAT_INSTRUMENT_FIELD,
                    FieldRole::RepeatInstrument,
                    FieldType::String,
                ));
                table.fields.push(Field::identifier(
                    REPEAT_INSTANCE_FIELD,
                    FieldRole::RepeatInstance,
                    FieldType::Integer,
                ));
            }
            RowsType::ByRepeatingEvents => table.fields.push(Field::identifier(
                REPEAT_INSTANCE_FIELD,
                FieldRole::RepeatInstance,
                FieldType::Integer,
            )),
            RowsType::BySuffixes | RowsType::ByEventsSuffixes => {
                table.fields.push(Field::identifier(
                    SUFFIX_FIELD,
                    FieldRole::Suffix,
                    FieldType::String,
                ));
            }
            RowsType::Root | RowsType::ByEvents => {}
        }

        // Data
        for field_rule in &rule.fields {
            let expanded = self.expand_field(rule, field_rule)?;
            table.fields.extend(expanded);
        }

        let forms = self.forms_of(rule);
        if rule.rows_type == RowsType::ByRepeatingInstruments {
            table.instrument = Some(
                rule.instrument
                    .clone()
                    .or_else(|| forms.first().cloned())
                    .unwrap_or_else(|| rule.name.clone()),
            );
        }
        table.suffixes = derive_suffixes(self.metadata, rule, &forms, table.instrument.as_deref());
        Ok(table)
    }

    /// Output columns for one `FIELD` rule. Checkbox rules expand to one
    /// column per declared choice.
    fn expand_field(&self, rule: &TableRule, field_rule: &FieldRule) -> Result<Vec<Field>> {
        let resolved = self.resolve_source(rule, &field_rule.source);
        let choices = self.metadata.choices(&resolved);
        if field_rule.field_type == FieldType::Checkbox {
            let choices = choices.filter(|choices| !choices.is_empty()).ok_or_else(|| {
                EtlError::schema_field(
                    &rule.name,
                    &field_rule.target,
                    format!("checkbox source `{}` declares no choices", field_rule.source),
                )
            })?;
            return Ok(choices
                .iter()
                .map(|choice| {
                    Field::data(
                        checkbox_field_name(&field_rule.target, &choice.code),
                        &field_rule.source,
                        FieldType::Checkbox,
                    )
                    .with_lookup(LookupRef {
                        source_field: resolved.clone(),
                        choice: Some(choice.code.clone()),
                    })
                })
                .collect());
        }
        let mut field = Field::data(&field_rule.target, &field_rule.source, field_rule.field_type)
            .with_size(field_rule.size);
        if choices.is_some() {
            field = field.with_lookup(LookupRef {
                source_field: resolved,
                choice: None,
            });
        }
        Ok(vec![field])
    }

    /// Metadata field a rule source stands for. Suffix tables name a stem
    /// that exists only with a suffix appended.
    fn resolve_source(&self, rule: &TableRule, source: &str) -> String {
        if self.metadata.has_field(source) || !rule.rows_type.uses_suffixes() {
            return source.to_string();
        }
        rule.suffixes
            .iter()
            .map(|suffix| format!("{source}{suffix}"))
            .find(|candidate| self.metadata.has_field(candidate))
            .unwrap_or_else(|| source.to_string())
    }

    /// Instruments the table's fields come from, in first-seen order.
    fn forms_of(&self, rule: &TableRule) -> Vec<String> {
        let mut forms: Vec<String> = Vec::new();
        for field_rule in &rule.fields {
            let resolved = self.resolve_source(rule, &field_rule.source);
            if let Some(form) = self.metadata.form_of(&resolved) {
                if !forms.iter().any(|known| known == form) {
                    forms.push(form.to_string());
                }
            }
        }
        forms
    }
}

/// Table statements in breadth-first order from the root, siblings in
/// declaration order.
fn table_order(rules: &RuleSet) -> Result<Vec<&TableRule>> {
    let mut names = BTreeSet::new();
    for rule in &rules.tables {
        if !names.insert(rule.name.as_str()) {
            return Err(EtlError::schema_in(&rule.name, "duplicate table name"));
        }
    }
    let mut roots = rules.tables.iter().filter(|rule| rule.is_root());
    let root = roots
        .next()
        .ok_or_else(|| EtlError::schema("rule set declares no ROOT table"))?;
    if let Some(extra) = roots.next() {
        return Err(EtlError::schema_in(&extra.name, "second ROOT table"));
    }
    for rule in &rules.tables {
        let Some(parent) = rule.parent.as_deref() else {
            continue;
        };
        if parent == rule.name {
            return Err(EtlError::schema_in(&rule.name, "cyclic table reference"));
        }
        if !names.contains(parent) {
            return Err(EtlError::schema_in(
                &rule.name,
                format!("parent table `{parent}` is not declared"),
            ));
        }
    }

    let mut ordered = Vec::with_capacity(rules.tables.len());
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        ordered.push(current);
        queue.extend(
            rules
                .tables
                .iter()
                .filter(|rule| rule.parent.as_deref() == Some(current.name.as_str())),
        );
    }
    if ordered.len() != rules.tables.len() {
        let unreachable = rules
            .tables
            .iter()
            .find(|rule| !ordered.iter().any(|kept| kept.name == rule.name))
            .map_or_else(String::new, |rule| rule.name.clone());
        return Err(EtlError::schema_in(unreachable, "cyclic table reference"));
    }
    Ok(ordered)
}
