//! Source record to output row distribution.

use std::collections::BTreeMap;
use std::fmt;

use etl_model::{
    EmptyRowPolicy, EtlError, FieldRole, FieldType, KeyValue, LoadOptions, Result, Row, RowsType,
    Schema, SourceRecord, SourceRow, Table,
};
use etl_model::ids::UNCHECKED;
use tracing::{debug, warn};

use crate::buffers::RowBuffers;
use crate::values::{checkbox_value, normalize_date};

/// A recoverable problem with one record. Becomes a task failure in strict
/// mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIssue {
    pub record_id: String,
    pub table: Option<String>,
    pub message: String,
}

impl RecordIssue {
    fn new(record_id: &str, table: Option<&Table>, message: impl Into<String>) -> Self {
        Self {
            record_id: record_id.to_string(),
            table: table.map(|table| table.name.clone()),
            message: message.into(),
        }
    }

    pub fn to_error(&self) -> EtlError {
        EtlError::record(&self.record_id, self.table.clone(), &self.message)
    }
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_error().fmt(f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutcome {
    pub records: usize,
    pub rows_created: usize,
    pub issues: Vec<RecordIssue>,
}

impl TransformOutcome {
    pub fn merge(&mut self, other: TransformOutcome) {
        self.records += other.records;
        self.rows_created += other.rows_created;
        self.issues.extend(other.issues);
    }

    /// Log the issue, then keep it or, in strict mode, fail with it.
    fn report(&mut self, strict: bool, issue: RecordIssue) -> Result<()> {
        warn!(
            record = %issue.record_id,
            table = issue.table.as_deref().unwrap_or("-"),
            "{}",
            issue.message
        );
        if strict {
            return Err(issue.to_error());
        }
        self.issues.push(issue);
        Ok(())
    }
}

/// Column values one candidate row reads from.
enum Cells<'r> {
    /// Non-repeating rows of a record, first non-empty value per column.
    Merged(BTreeMap<&'r str, &'r str>),
    Row(&'r SourceRow),
}

impl<'r> Cells<'r> {
    fn merge(rows: impl Iterator<Item = &'r SourceRow>) -> Self {
        let mut merged = BTreeMap::new();
        for row in rows {
            for (column, value) in &row.values {
                let value = value.trim();
                if !value.is_empty() {
                    merged.entry(column.as_str()).or_insert(value);
                }
            }
        }
        Cells::Merged(merged)
    }

    fn get(&self, column: &str) -> Option<&'r str> {
        match self {
            Cells::Merged(merged) => merged.get(column).copied(),
            Cells::Row(row) => {
                let row: &'r SourceRow = row;
                row.values.get(column).map(|value| value.trim())
            }
        }
    }
}

/// A combination that may become a row.
#[derive(Debug, Clone, Default)]
struct Candidate {
    cells: usize,
    /// Index of the source row within the record; `None` for merged cells.
    origin: Option<usize>,
    event: Option<String>,
    instrument: Option<String>,
    instance: Option<u32>,
    suffix: Option<String>,
    /// Concatenated suffixes appended to source column names.
    suffix_path: String,
    /// Parent row fixed at generation time.
    parent: Option<usize>,
}

impl Candidate {
    fn from_row(cells: usize, origin: usize, row: &SourceRow) -> Self {
        Self {
            cells,
            origin: Some(origin),
            event: row.event.clone(),
            instrument: row.repeat_instrument.clone(),
            instance: row.repeat_instance,
            ..Self::default()
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(event) = &self.event {
            parts.push(format!("event `{event}`"));
        }
        if let Some(instance) = self.instance {
            parts.push(format!("instance {instance}"));
        }
        if let Some(suffix) = &self.suffix {
            parts.push(format!("suffix `{suffix}`"));
        }
        if parts.is_empty() {
            "the record".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A row built for the current record, before empty rows are pruned and
/// keys are handed out.
#[derive(Debug, Clone)]
struct Pending {
    candidate: Candidate,
    /// Position of the parent row within the parent table's pending rows.
    parent: Option<usize>,
    values: Vec<String>,
    has_data: bool,
    keep: bool,
}

/// Turns source records into rows of every table in the schema.
///
/// Primary keys are assigned per table from 1 in creation order and are
/// never reused within the lifetime of the transformer.
pub struct RecordTransformer<'s> {
    schema: &'s Schema,
    options: &'s LoadOptions,
    next_keys: Vec<i64>,
}

impl<'s> RecordTransformer<'s> {
    pub fn new(schema: &'s Schema, options: &'s LoadOptions) -> Self {
        Self {
            schema,
            options,
            next_keys: vec![0; schema.tables().len()],
        }
    }

    /// Last synthetic key handed out for a table.
    pub fn last_key(&self, table: &str) -> i64 {
        self.schema
            .table_index(table)
            .and_then(|index| self.next_keys.get(index).copied())
            .unwrap_or(0)
    }

    pub fn transform_batch(
        &mut self,
        records: &[SourceRecord],
        buffers: &mut RowBuffers,
    ) -> Result<TransformOutcome> {
        let mut outcome = TransformOutcome::default();
        for record in records {
            outcome.merge(self.transform(record, buffers)?);
        }
        Ok(outcome)
    }

    /// Append the rows of one record to `buffers`.
    ///
    /// Rows are only pushed once the whole record has been processed, so a
    /// strict-mode failure leaves the buffers and key counters untouched.
    pub fn transform(
        &mut self,
        record: &SourceRecord,
        buffers: &mut RowBuffers,
    ) -> Result<TransformOutcome> {
        let strict = self.options.strict;
        let mut outcome = TransformOutcome {
            records: 1,
            ..TransformOutcome::default()
        };
        let record_id = record.record_id.trim();
        if record_id.is_empty() {
            outcome.report(
                strict,
                RecordIssue::new(record_id, None, "record has an empty identifier"),
            )?;
            return Ok(outcome);
        }

        let schema = self.schema;
        let tables = schema.tables();
        let parents: Vec<Option<usize>> = tables
            .iter()
            .map(|table| {
                schema
                    .parent_of(table)
                    .and_then(|parent| schema.table_index(&parent.name))
            })
            .collect();
        let mut cells: Vec<Cells<'_>> = Vec::new();
        let mut pending: Vec<Vec<Pending>> = Vec::with_capacity(tables.len());

        // =====================================================================
        // Stage 1: Candidate rows, parents first
        // =====================================================================
        for (table, parent_index) in tables.iter().zip(parents.iter().copied()) {
            let parent = parent_index.and_then(|parent_index| {
                let parent_table = tables.get(parent_index)?;
                let parent_rows = pending.get(parent_index).map_or(&[][..], Vec::as_slice);
                Some((parent_table, parent_rows))
            });
            let candidates = candidates(table, record, parent, &mut cells);

            let mut made = Vec::new();
            for candidate in candidates {
                let parent_position = match parent {
                    None => None,
                    Some((parent_table, parent_rows)) => {
                        let found = candidate
                            .parent
                            .or_else(|| find_parent(parent_table, parent_rows, &candidate))
                            .filter(|position| *position < parent_rows.len());
                        if found.is_none() {
                            outcome.report(
                                strict,
                                RecordIssue::new(
                                    record_id,
                                    Some(table),
                                    format!(
                                        "no parent row in `{}` for {}",
                                        parent_table.name,
                                        candidate.describe()
                                    ),
                                ),
                            )?;
                            continue;
                        }
                        found
                    }
                };
                let Some((values, has_data)) =
                    self.fill_values(table, record_id, &candidate, &cells, &mut outcome)?
                else {
                    continue;
                };
                made.push(Pending {
                    candidate,
                    parent: parent_position,
                    values,
                    has_data,
                    keep: false,
                });
            }
            pending.push(made);
        }

        // =====================================================================
        // Stage 2: Empty rows, children first
        // =====================================================================
        let keep_empty = self.options.empty_rows == EmptyRowPolicy::Keep;
        for index in (0..tables.len()).rev() {
            let (Some(table), Some(rows)) = (tables.get(index), pending.get_mut(index)) else {
                continue;
            };
            let mut referenced = Vec::new();
            for row in rows.iter_mut() {
                // A row some kept child points at is already marked.
                row.keep |= keep_empty || table.is_root() || row.has_data;
                if row.keep {
                    referenced.extend(row.parent);
                }
            }
            let parent_rows = parents
                .get(index)
                .copied()
                .flatten()
                .and_then(|parent_index| pending.get_mut(parent_index));
            if let Some(parent_rows) = parent_rows {
                for position in referenced {
                    if let Some(parent_row) = parent_rows.get_mut(position) {
                        parent_row.keep = true;
                    }
                }
            }
        }

        // =====================================================================
        // Stage 3: Keys, parents first
        // =====================================================================
        let mut keys: Vec<Vec<Option<KeyValue>>> = Vec::with_capacity(tables.len());
        let mut rows = Vec::new();
        for (index, (table, table_rows)) in tables.iter().zip(pending).enumerate() {
            let parent_keys = parents
                .get(index)
                .copied()
                .flatten()
                .and_then(|parent_index| keys.get(parent_index));
            let mut table_keys = Vec::with_capacity(table_rows.len());
            for row in table_rows {
                if !row.keep {
                    table_keys.push(None);
                    continue;
                }
                let parent_key = match (parent_keys, row.parent) {
                    (Some(parent_keys), Some(position)) => {
                        parent_keys.get(position).cloned().flatten()
                    }
                    _ => None,
                };
                let built = self.finish_row(table, index, record_id, row, parent_key);
                table_keys.push(Some(built.primary_key.clone()));
                rows.push(built);
            }
            keys.push(table_keys);
        }

        outcome.rows_created = rows.len();
        for row in rows {
            buffers.push(row);
        }
        debug!(
            record = %record_id,
            rows = outcome.rows_created,
            issues = outcome.issues.len(),
            "transformed record"
        );
        Ok(outcome)
    }

    /// Data values of a candidate, and whether any of them counts as data.
    fn fill_values(
        &self,
        table: &Table,
        record_id: &str,
        candidate: &Candidate,
        cells: &[Cells<'_>],
        outcome: &mut TransformOutcome,
    ) -> Result<Option<(Vec<String>, bool)>> {
        let Some(source) = cells.get(candidate.cells) else {
            return Ok(None);
        };
        let mut values = vec![String::new(); table.fields.len()];
        let mut has_data = false;

        for (slot, field) in values.iter_mut().zip(&table.fields) {
            if field.role != FieldRole::Data {
                continue;
            }
            let column = format!(
                "{}{}",
                field.source.as_deref().unwrap_or(&field.name),
                candidate.suffix_path
            );
            let value = match field.checkbox_choice() {
                Some((_, code)) => {
                    checkbox_value(|name| source.get(name), &column, code).to_string()
                }
                None => {
                    let raw = source.get(&column).unwrap_or("");
                    if field.field_type == FieldType::Date {
                        match normalize_date(raw) {
                            Some(date) => date,
                            None => {
                                outcome.report(
                                    self.options.strict,
                                    RecordIssue::new(
                                        record_id,
                                        Some(table),
                                        format!("invalid date in field `{}`", field.name),
                                    ),
                                )?;
                                String::new()
                            }
                        }
                    } else {
                        raw.to_string()
                    }
                }
            };
            has_data |= if field.field_type == FieldType::Checkbox {
                value != UNCHECKED
            } else {
                !value.is_empty()
            };
            *slot = value;
        }
        Ok(Some((values, has_data)))
    }

    fn finish_row(
        &mut self,
        table: &Table,
        index: usize,
        record_id: &str,
        pending: Pending,
        parent_key: Option<KeyValue>,
    ) -> Row {
        let Pending {
            candidate,
            mut values,
            ..
        } = pending;
        let primary_key = if table.uses_natural_key() {
            KeyValue::Text(record_id.to_string())
        } else {
            self.next_key(index)
        };
        for (slot, field) in values.iter_mut().zip(&table.fields) {
            *slot = match field.role {
                FieldRole::PrimaryKey => primary_key.to_string(),
                FieldRole::ForeignKey => parent_key
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                FieldRole::RecordId => record_id.to_string(),
                FieldRole::EventName => candidate.event.clone().unwrap_or_default(),
                FieldRole::RepeatInstrument => candidate.instrument.clone().unwrap_or_default(),
                FieldRole::RepeatInstance => candidate
                    .instance
                    .map(|instance| instance.to_string())
                    .unwrap_or_default(),
                FieldRole::Suffix => candidate.suffix.clone().unwrap_or_default(),
                FieldRole::Data => continue,
            };
        }

        let mut row = Row::new(table, primary_key, record_id);
        row.foreign_key = parent_key;
        row.event = candidate.event;
        row.repeat_instrument = candidate.instrument;
        row.instance = candidate.instance;
        row.suffix = candidate.suffix;
        row.values = values;
        row
    }

    fn next_key(&mut self, index: usize) -> KeyValue {
        let mut key = 0;
        if let Some(last) = self.next_keys.get_mut(index) {
            *last += 1;
            key = *last;
        }
        KeyValue::Int(key)
    }
}

/// Combinations of the record that map onto `table`.
fn candidates<'r>(
    table: &Table,
    record: &'r SourceRecord,
    parent: Option<(&Table, &[Pending])>,
    cells: &mut Vec<Cells<'r>>,
) -> Vec<Candidate> {
    let accepts_event = |row: &SourceRow| match row.event.as_deref() {
        Some(event) => table.suffixes.is_empty() || table.suffixes.iter().any(|name| name == event),
        None => true,
    };
    match table.rows_type {
        RowsType::Root => {
            cells.push(Cells::merge(record.rows.iter().filter(|row| row.is_plain())));
            vec![Candidate {
                cells: cells.len() - 1,
                ..Candidate::default()
            }]
        }
        RowsType::ByEvents => row_candidates(record, cells, |row| {
            row.is_plain() && accepts_event(row)
        }),
        RowsType::ByRepeatingEvents => row_candidates(record, cells, |row| {
            row.repeat_instance.is_some() && row.repeat_instrument.is_none() && accepts_event(row)
        }),
        RowsType::ByRepeatingInstruments => row_candidates(record, cells, |row| {
            row.repeat_instrument.is_some()
                && row.repeat_instrument == table.instrument
                && accepts_event(row)
        }),
        RowsType::BySuffixes => {
            let Some((_, parent_rows)) = parent else {
                return Vec::new();
            };
            let mut out = Vec::new();
            for (position, parent_row) in parent_rows.iter().enumerate() {
                let parent_row = &parent_row.candidate;
                for suffix in &table.suffixes {
                    out.push(Candidate {
                        cells: parent_row.cells,
                        origin: parent_row.origin,
                        event: parent_row.event.clone(),
                        instrument: None,
                        instance: parent_row.instance,
                        suffix: Some(suffix.clone()),
                        suffix_path: format!("{}{suffix}", parent_row.suffix_path),
                        parent: Some(position),
                    });
                }
            }
            out
        }
        RowsType::ByEventsSuffixes => {
            let event_rows = row_candidates(record, cells, SourceRow::is_plain);
            let mut out = Vec::new();
            for candidate in event_rows {
                for suffix in &table.suffixes {
                    out.push(Candidate {
                        suffix: Some(suffix.clone()),
                        suffix_path: suffix.clone(),
                        ..candidate.clone()
                    });
                }
            }
            out
        }
    }
}

fn row_candidates<'r>(
    record: &'r SourceRecord,
    cells: &mut Vec<Cells<'r>>,
    accept: impl Fn(&SourceRow) -> bool,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (origin, row) in record.rows.iter().enumerate() {
        if accept(row) {
            cells.push(Cells::Row(row));
            out.push(Candidate::from_row(cells.len() - 1, origin, row));
        }
    }
    out
}

/// Parent row of a candidate, scoped by the parent's rows type.
fn find_parent(parent: &Table, parent_rows: &[Pending], candidate: &Candidate) -> Option<usize> {
    let mut rows = parent_rows.iter().map(|row| &row.candidate);
    match parent.rows_type {
        RowsType::Root => (!parent_rows.is_empty()).then_some(0),
        RowsType::ByEvents => rows.position(|row| row.event == candidate.event),
        RowsType::ByRepeatingEvents => {
            rows.position(|row| row.event == candidate.event && row.instance == candidate.instance)
        }
        RowsType::ByRepeatingInstruments | RowsType::BySuffixes | RowsType::ByEventsSuffixes => {
            rows.position(|row| {
                row.origin.is_some()
                    && row.origin == candidate.origin
                    && candidate.suffix_path.starts_with(&row.suffix_path)
            })
        }
    }
}
