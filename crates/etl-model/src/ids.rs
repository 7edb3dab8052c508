//! Names of synthesized identifier columns.

/// Record identifier used when metadata declares no fields.
pub const DEFAULT_RECORD_ID_FIELD: &str = "record_id";

pub const EVENT_NAME_FIELD: &str = "event_name";
pub const REPEAT_INSTRUMENT_FIELD: &str = "repeat_instrument";
pub const REPEAT_INSTANCE_FIELD: &str = "repeat_instance";
pub const SUFFIX_FIELD: &str = "suffix";

/// Suffix of the per-instrument completion status field.
pub const COMPLETE_FIELD_SUFFIX: &str = "_complete";

/// Separator between a checkbox field and its choice code.
pub const CHECKBOX_SEPARATOR: &str = "___";

/// Stored form of a checked and an unchecked checkbox choice.
pub const CHECKED: &str = "1";
pub const UNCHECKED: &str = "0";
