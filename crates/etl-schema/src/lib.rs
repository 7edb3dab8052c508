//! Output table tree and lookup mapping built from rules and metadata.
//!
//! Every table gets a synthesized primary key, a foreign key to its parent,
//! the identifier columns its rows type needs, and one column per field
//! rule (checkbox rules expand to one column per choice).

pub mod builder;
pub mod lookup;
pub mod suffixes;
pub mod validate;

pub use builder::SchemaBuilder;
pub use lookup::{LookupCompiler, lookup_rows, lookup_table_definition};
pub use suffixes::derive_suffixes;
pub use validate::validate_tables;
