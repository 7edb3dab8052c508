//! Record transformation: one flat source record in, typed rows for every
//! table of the schema out.
//!
//! Tables are visited parents first. Each table enumerates the combinations
//! of the record its rows type selects, resolves the parent row of each
//! combination, fills the values and assigns the next primary key.

pub mod buffers;
pub mod transformer;
pub mod values;

pub use buffers::RowBuffers;
pub use transformer::{RecordIssue, RecordTransformer, TransformOutcome};
pub use values::{checkbox_value, normalize_date};
