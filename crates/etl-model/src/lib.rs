//! Core types shared by the rule compiler, schema builder, transformer,
//! storage drivers and task runner.

pub mod error;
pub mod field;
pub mod ids;
pub mod lookup;
pub mod metadata;
pub mod options;
pub mod record;
pub mod row;
pub mod schema;
pub mod table;

pub use error::{ErrorKind, EtlError, Result};
pub use field::{Field, FieldRole, FieldType, KeyReference, KeyType, LookupRef, checkbox_field_name};
pub use lookup::{Choice, LookupTable};
pub use metadata::{
    Designation, Event, Instrument, MetadataField, ProjectInfo, ProjectMetadata, RepeatingEntry,
    SourceFieldKind, parse_choices,
};
pub use options::{DEFAULT_BATCH_SIZE, EmptyRowPolicy, LoadOptions};
pub use record::{SourceRecord, SourceRow};
pub use row::{KeyValue, Row};
pub use schema::Schema;
pub use table::{RowsType, Table};
