//! Legal suffix sets per rows type.

use etl_model::{ProjectMetadata, RowsType};
use etl_rules::TableRule;

/// Events (or field suffixes) a table accepts rows for.
///
/// Explicit lists in the rule win. Otherwise event tables take the events
/// their instruments are designated to, filtered by the repeat setup. An
/// empty set on an event table of a classic project means "no event".
pub fn derive_suffixes(
    metadata: &ProjectMetadata,
    rule: &TableRule,
    forms: &[String],
    instrument: Option<&str>,
) -> Vec<String> {
    match rule.rows_type {
        RowsType::Root => Vec::new(),
        RowsType::BySuffixes | RowsType::ByEventsSuffixes => rule.suffixes.clone(),
        _ if !rule.suffixes.is_empty() => rule.suffixes.clone(),
        _ if !metadata.is_longitudinal() => Vec::new(),
        RowsType::ByEvents => designated_events(metadata, forms)
            .into_iter()
            .filter(|event| {
                !metadata.is_repeating_event(event)
                    && !forms
                        .iter()
                        .any(|form| metadata.is_repeating_instrument(form, Some(*event)))
            })
            .map(str::to_string)
            .collect(),
        RowsType::ByRepeatingEvents => designated_events(metadata, forms)
            .into_iter()
            .filter(|event| metadata.is_repeating_event(event))
            .map(str::to_string)
            .collect(),
        RowsType::ByRepeatingInstruments => {
            let Some(instrument) = instrument else {
                return Vec::new();
            };
            metadata
                .events_for_form(instrument)
                .into_iter()
                .filter(|event| {
                    !metadata.is_repeating_event(event)
                        && metadata.is_repeating_instrument(instrument, Some(*event))
                })
                .map(str::to_string)
                .collect()
        }
    }
}

/// Events any of the forms is designated to, in event order. Tables without
/// source instruments accept every event.
fn designated_events<'a>(metadata: &'a ProjectMetadata, forms: &[String]) -> Vec<&'a str> {
    if forms.is_empty() {
        return metadata.event_names();
    }
    metadata
        .event_names()
        .into_iter()
        .filter(|event| {
            forms
                .iter()
                .any(|form| metadata.events_for_form(form).contains(event))
        })
        .collect()
}
