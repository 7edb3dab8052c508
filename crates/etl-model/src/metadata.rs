//! Project metadata as delivered by the record-source collaborator.

use serde::{Deserialize, Serialize};

use crate::ids::{COMPLETE_FIELD_SUFFIX, DEFAULT_RECORD_ID_FIELD};
use crate::lookup::Choice;

/// Field type as declared by the capture platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFieldKind {
    Text,
    Notes,
    Dropdown,
    Radio,
    Checkbox,
    Yesno,
    Truefalse,
    Calc,
    Slider,
    File,
    Descriptive,
    Sql,
    #[serde(other)]
    Other,
}

impl SourceFieldKind {
    /// Kinds whose values are codes from a choice list.
    pub fn is_coded(&self) -> bool {
        matches!(
            self,
            SourceFieldKind::Dropdown
                | SourceFieldKind::Radio
                | SourceFieldKind::Checkbox
                | SourceFieldKind::Yesno
                | SourceFieldKind::Truefalse
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub field_name: String,
    pub form_name: String,
    pub field_type: SourceFieldKind,
    #[serde(default)]
    pub label: String,
    /// Text validation, e.g. `integer`, `number_2dp`, `date_ymd`.
    #[serde(default)]
    pub validation: Option<String>,
    /// Raw choice list, `"1, Chem | 2, CBC"`.
    #[serde(default)]
    pub choices: Option<String>,
}

impl MetadataField {
    /// Parsed choice list in declared order.
    ///
    /// Yes/no and true/false fields carry implicit choices. Returns `None` for
    /// fields that are not coded.
    pub fn choice_list(&self) -> Option<Vec<Choice>> {
        match self.field_type {
            SourceFieldKind::Yesno => Some(vec![Choice::new("1", "Yes"), Choice::new("0", "No")]),
            SourceFieldKind::Truefalse => {
                Some(vec![Choice::new("1", "True"), Choice::new("0", "False")])
            }
            SourceFieldKind::Dropdown | SourceFieldKind::Radio | SourceFieldKind::Checkbox => {
                self.choices.as_deref().map(parse_choices)
            }
            _ => None,
        }
    }
}

/// Parse a `code, label | code, label` choice string.
///
/// Labels may themselves contain commas; only the first comma separates the
/// code. Entries without a code are dropped.
pub fn parse_choices(raw: &str) -> Vec<Choice> {
    raw.split('|')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (code, label) = match entry.split_once(',') {
                Some((code, label)) => (code.trim(), label.trim()),
                None => (entry, entry),
            };
            if code.is_empty() {
                return None;
            }
            Some(Choice::new(code, label))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub title: String,
    /// Overrides the record identifier, which defaults to the first field.
    #[serde(default)]
    pub record_id_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub unique_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub arm: Option<u32>,
}

/// An instrument designated to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designation {
    pub event: String,
    pub form: String,
}

/// A repeating setup entry. `form: None` means the whole event repeats;
/// `event: None` (classic projects) means the form repeats everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatingEntry {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub project: ProjectInfo,
    pub fields: Vec<MetadataField>,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub designations: Vec<Designation>,
    #[serde(default)]
    pub repeating: Vec<RepeatingEntry>,
}

impl ProjectMetadata {
    pub fn record_id_field(&self) -> &str {
        if let Some(name) = self.project.record_id_field.as_deref() {
            return name;
        }
        self.fields
            .first()
            .map_or(DEFAULT_RECORD_ID_FIELD, |field| field.field_name.as_str())
    }

    pub fn is_longitudinal(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&MetadataField> {
        self.fields.iter().find(|field| field.field_name == name)
    }

    /// True for declared fields and for the implicit `<form>_complete` status
    /// field of every instrument.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some() || self.complete_field_form(name).is_some()
    }

    /// Instrument owning a `<form>_complete` status field.
    pub fn complete_field_form(&self, name: &str) -> Option<&str> {
        let form = name.strip_suffix(COMPLETE_FIELD_SUFFIX)?;
        self.instrument_names()
            .into_iter()
            .find(|candidate| *candidate == form)
    }

    /// Instrument owning a field, including status fields.
    pub fn form_of(&self, name: &str) -> Option<&str> {
        self.field(name)
            .map(|field| field.form_name.as_str())
            .or_else(|| self.complete_field_form(name))
    }

    /// Choice list of a field. Status fields carry the platform's fixed
    /// completion codes.
    pub fn choices(&self, name: &str) -> Option<Vec<Choice>> {
        if let Some(field) = self.field(name) {
            return field.choice_list();
        }
        self.complete_field_form(name).map(|_| {
            vec![
                Choice::new("0", "Incomplete"),
                Choice::new("1", "Unverified"),
                Choice::new("2", "Complete"),
            ]
        })
    }

    /// Instrument names in declared order. Falls back to the order in which
    /// forms first appear among the fields.
    pub fn instrument_names(&self) -> Vec<&str> {
        if !self.instruments.is_empty() {
            return self
                .instruments
                .iter()
                .map(|instrument| instrument.name.as_str())
                .collect();
        }
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !names.contains(&field.form_name.as_str()) {
                names.push(&field.form_name);
            }
        }
        names
    }

    pub fn fields_of_form<'a>(&'a self, form: &'a str) -> impl Iterator<Item = &'a MetadataField> {
        self.fields.iter().filter(move |field| field.form_name == form)
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .map(|event| event.unique_name.as_str())
            .collect()
    }

    /// Events the form is designated to, in event order.
    pub fn events_for_form(&self, form: &str) -> Vec<&str> {
        self.events
            .iter()
            .map(|event| event.unique_name.as_str())
            .filter(|event| {
                self.designations
                    .iter()
                    .any(|designation| designation.event == *event && designation.form == form)
            })
            .collect()
    }

    /// Whole-event repetition.
    pub fn is_repeating_event(&self, event: &str) -> bool {
        self.repeating
            .iter()
            .any(|entry| entry.form.is_none() && entry.event.as_deref() == Some(event))
    }

    /// Whether the form repeats on its own, within `event` for longitudinal
    /// projects.
    pub fn is_repeating_instrument(&self, form: &str, event: Option<&str>) -> bool {
        self.repeating.iter().any(|entry| {
            entry.form.as_deref() == Some(form)
                && match (entry.event.as_deref(), event) {
                    (None, _) => true,
                    (Some(declared), Some(event)) => declared == event,
                    (Some(_), None) => false,
                }
        })
    }

    /// True when the form repeats in at least one context.
    pub fn form_repeats_anywhere(&self, form: &str) -> bool {
        self.repeating
            .iter()
            .any(|entry| entry.form.as_deref() == Some(form))
    }
}
