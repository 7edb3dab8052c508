//! Rule synthesis from project metadata.

use etl_model::{
    EtlError, FieldType, LoadOptions, MetadataField, ProjectMetadata, Result, RowsType,
    SourceFieldKind,
};
use etl_model::ids::COMPLETE_FIELD_SUFFIX;
use tracing::debug;

use crate::ast::{FieldRule, RuleSet, TableRule};

/// Where the rows of one instrument land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// One row per record.
    Record,
    /// One row per non-repeating event.
    Events,
    RepeatingEvents,
    RepeatingInstrument,
}

impl Placement {
    fn rows_type(self) -> RowsType {
        match self {
            Placement::Record => RowsType::Root,
            Placement::Events => RowsType::ByEvents,
            Placement::RepeatingEvents => RowsType::ByRepeatingEvents,
            Placement::RepeatingInstrument => RowsType::ByRepeatingInstruments,
        }
    }

    fn table_suffix(self) -> &'static str {
        match self {
            Placement::Record => "",
            Placement::Events => "_events",
            Placement::RepeatingEvents => "_repeating_events",
            Placement::RepeatingInstrument => "_repeating_instruments",
        }
    }

    /// Placements that may go onto the root table when they belong to the
    /// first instrument. `Events` only qualifies for a single event.
    fn merges_into_root(self, plain_events: usize) -> bool {
        match self {
            Placement::Record => true,
            Placement::Events => plain_events <= 1,
            Placement::RepeatingEvents | Placement::RepeatingInstrument => false,
        }
    }
}

pub fn generate_rules(metadata: &ProjectMetadata, options: &LoadOptions) -> Result<RuleSet> {
    let forms = metadata.instrument_names();
    let Some(root_form) = forms.first().copied() else {
        return Err(EtlError::schema("metadata declares no instruments"));
    };
    let mut root = TableRule::root(root_form, key_name(root_form));
    let mut children = Vec::new();

    for form in &forms {
        let fields = form_fields(metadata, form, options);
        if fields.is_empty() {
            debug!(form = %form, "instrument has no data fields; no table generated");
            continue;
        }
        let is_root_form = *form == root_form;
        let placements = placements(metadata, form);
        let plain_events = plain_events(metadata, form);
        let mut plain_name_taken = is_root_form;
        for placement in placements {
            if is_root_form && placement.merges_into_root(plain_events) && root.fields.is_empty()
            {
                root.fields.clone_from(&fields);
                continue;
            }
            let name = if plain_name_taken {
                format!("{form}{}", placement.table_suffix())
            } else {
                plain_name_taken = true;
                (*form).to_string()
            };
            let mut table =
                TableRule::child(name.clone(), root_form, key_name(&name), placement.rows_type());
            if placement == Placement::RepeatingInstrument && name != *form {
                table.instrument = Some((*form).to_string());
            }
            table.fields.clone_from(&fields);
            children.push(table);
        }
    }

    let mut rules = RuleSet::default();
    rules.tables.push(root);
    rules.tables.extend(children);
    debug!(
        tables = rules.tables.len(),
        fields = rules.field_count(),
        "generated rules from metadata"
    );
    Ok(rules)
}

fn key_name(table: &str) -> String {
    format!("{table}_id")
}

fn placements(metadata: &ProjectMetadata, form: &str) -> Vec<Placement> {
    if !metadata.is_longitudinal() {
        return if metadata.is_repeating_instrument(form, None) {
            vec![Placement::RepeatingInstrument]
        } else {
            vec![Placement::Record]
        };
    }
    let events = metadata.events_for_form(form);
    let mut plain = false;
    let mut repeating_events = false;
    let mut repeating_instrument = false;
    for event in events {
        if metadata.is_repeating_event(event) {
            repeating_events = true;
        } else if metadata.is_repeating_instrument(form, Some(event)) {
            repeating_instrument = true;
        } else {
            plain = true;
        }
    }
    let mut placements = Vec::new();
    if plain {
        placements.push(Placement::Events);
    }
    if repeating_events {
        placements.push(Placement::RepeatingEvents);
    }
    if repeating_instrument {
        placements.push(Placement::RepeatingInstrument);
    }
    placements
}

/// Non-repeating events the form is designated to.
fn plain_events(metadata: &ProjectMetadata, form: &str) -> usize {
    metadata
        .events_for_form(form)
        .into_iter()
        .filter(|&event| {
            !metadata.is_repeating_event(event)
                && !metadata.is_repeating_instrument(form, Some(event))
        })
        .count()
}

fn form_fields(metadata: &ProjectMetadata, form: &str, options: &LoadOptions) -> Vec<FieldRule> {
    let record_id = metadata.record_id_field();
    let mut fields: Vec<FieldRule> = metadata
        .fields_of_form(form)
        .filter(|field| field.field_name != record_id)
        .filter_map(|field| {
            generated_type(field)
                .map(|field_type| FieldRule::new(&field.field_name, &field.field_name, field_type))
        })
        .collect();
    if options.include_complete_fields {
        let status = format!("{form}{COMPLETE_FIELD_SUFFIX}");
        fields.push(FieldRule::new(&status, &status, FieldType::Integer));
    }
    fields
}

/// Output type for a metadata field; `None` for fields that carry no data.
fn generated_type(field: &MetadataField) -> Option<FieldType> {
    let field_type = match field.field_type {
        SourceFieldKind::Descriptive => return None,
        SourceFieldKind::Text => text_type(field.validation.as_deref()),
        SourceFieldKind::Calc => FieldType::Float,
        SourceFieldKind::Slider => FieldType::Integer,
        SourceFieldKind::Checkbox => FieldType::Checkbox,
        SourceFieldKind::Dropdown
        | SourceFieldKind::Radio
        | SourceFieldKind::Yesno
        | SourceFieldKind::Truefalse => {
            let numeric = field.choice_list().is_none_or(|choices| {
                choices
                    .iter()
                    .all(|choice| choice.code.parse::<i64>().is_ok())
            });
            if numeric {
                FieldType::Integer
            } else {
                FieldType::String
            }
        }
        SourceFieldKind::Notes
        | SourceFieldKind::File
        | SourceFieldKind::Sql
        | SourceFieldKind::Other => FieldType::String,
    };
    Some(field_type)
}

fn text_type(validation: Option<&str>) -> FieldType {
    let Some(validation) = validation.map(str::to_ascii_lowercase) else {
        return FieldType::String;
    };
    if validation == "integer" {
        FieldType::Integer
    } else if validation.starts_with("number") {
        FieldType::Float
    } else if validation.starts_with("date") {
        FieldType::Date
    } else {
        FieldType::String
    }
}
