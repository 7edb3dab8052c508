//! Record sources for the load engine.
//!
//! A [`RecordSource`] hands out the project metadata once and the records in
//! batches. [`ExportDirSource`] reads an export directory written by the
//! capture platform; [`MemorySource`] serves data built in code.

pub mod format;
pub mod grouping;
pub mod source;

pub use format::{FlatRow, RecordFormat};
pub use grouping::{EVENT_COLUMNS, INSTANCE_COLUMNS, INSTRUMENT_COLUMNS, group_rows};
pub use source::{ExportDirSource, MemorySource, PROJECT_FILE, RecordSource};
