use std::collections::HashMap;

use etl_model::{EtlError, Result, SourceRecord, SourceRow};

use crate::format::FlatRow;

/// Columns naming the event of an exported row.
pub const EVENT_COLUMNS: [&str; 2] = ["redcap_event_name", "event_name"];
/// Columns naming the repeating instrument of an exported row.
pub const INSTRUMENT_COLUMNS: [&str; 2] = ["redcap_repeat_instrument", "repeat_instrument"];
/// Columns holding the repeat instance number of an exported row.
pub const INSTANCE_COLUMNS: [&str; 2] = ["redcap_repeat_instance", "repeat_instance"];

fn take_annotation(row: &mut FlatRow, columns: &[&str]) -> Option<String> {
    let mut found = None;
    for column in columns {
        if let Some(value) = row.remove(*column) {
            let value = value.trim().to_string();
            if found.is_none() && !value.is_empty() {
                found = Some(value);
            }
        }
    }
    found
}

fn source_row(mut row: FlatRow, index: usize) -> Result<SourceRow> {
    let event = take_annotation(&mut row, &EVENT_COLUMNS);
    let repeat_instrument = take_annotation(&mut row, &INSTRUMENT_COLUMNS);
    let repeat_instance = match take_annotation(&mut row, &INSTANCE_COLUMNS) {
        None => None,
        Some(text) => Some(text.parse::<u32>().map_err(|_| {
            EtlError::source(format!(
                "row {index} has repeat instance `{text}`, expected a positive number"
            ))
        })?),
    };
    Ok(SourceRow {
        event,
        repeat_instrument,
        repeat_instance,
        values: row,
    })
}

/// Group exported rows into records by identifier, in first-seen order.
pub fn group_rows(rows: Vec<FlatRow>, record_id_field: &str) -> Result<Vec<SourceRecord>> {
    let mut records: Vec<SourceRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.into_iter().enumerate() {
        let record_id = row
            .get(record_id_field)
            .map(|value| value.trim().to_string())
            .unwrap_or_default();
        let row = source_row(row, index + 1)?;
        let position = *positions.entry(record_id.clone()).or_insert_with(|| {
            records.push(SourceRecord::new(record_id));
            records.len() - 1
        });
        records[position].rows.push(row);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &str)]) -> FlatRow {
        pairs
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn rows_group_in_first_seen_order() {
        let records = group_rows(
            vec![
                flat(&[("record_id", "2"), ("redcap_event_name", "baseline")]),
                flat(&[("record_id", "1"), ("redcap_event_name", "baseline")]),
                flat(&[
                    ("record_id", "2"),
                    ("redcap_event_name", "visit"),
                    ("redcap_repeat_instance", "3"),
                ]),
            ],
            "record_id",
        )
        .expect("group");
        let ids: Vec<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, ["2", "1"]);
        assert_eq!(records[0].rows.len(), 2);
        let visit = &records[0].rows[1];
        assert_eq!(visit.event.as_deref(), Some("visit"));
        assert_eq!(visit.repeat_instance, Some(3));
        assert!(!visit.values.contains_key("redcap_event_name"));
        assert_eq!(visit.values["record_id"], "2");
    }

    #[test]
    fn bad_instance_is_a_source_error() {
        let error = group_rows(
            vec![flat(&[("record_id", "1"), ("repeat_instance", "two")])],
            "record_id",
        )
        .expect_err("bad instance");
        assert_eq!(error.kind(), etl_model::ErrorKind::Source);
    }
}
