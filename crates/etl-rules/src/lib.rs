//! Transformation rules: the text grammar, its parser, and automatic rule
//! generation from project metadata.
//!
//! # Example
//!
//! ```ignore
//! use etl_rules::RuleCompiler;
//!
//! let compiler = RuleCompiler::new(&metadata);
//! let rules = compiler.compile("ROOT enrollment enrollment_id\nFIELD name string\n")?;
//! ```

pub mod ast;
pub mod generate;
pub mod parser;
pub mod validate;

use etl_model::{LoadOptions, ProjectMetadata, Result};
use tracing::info;

pub use ast::{FieldRule, RuleSet, TableRule};
pub use generate::generate_rules;
pub use parser::parse_rules;
pub use validate::validate_rules;

/// Produces a validated [`RuleSet`] from rule text or from metadata alone.
pub struct RuleCompiler<'a> {
    metadata: &'a ProjectMetadata,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(metadata: &'a ProjectMetadata) -> Self {
        Self { metadata }
    }

    /// Parse rule text and check it against the metadata.
    pub fn compile(&self, text: &str) -> Result<RuleSet> {
        let rules = parse_rules(text)?;
        validate_rules(&rules, self.metadata)?;
        info!(
            tables = rules.tables.len(),
            fields = rules.field_count(),
            "compiled rules"
        );
        Ok(rules)
    }

    /// Synthesize rules from the metadata.
    pub fn generate(&self, options: &LoadOptions) -> Result<RuleSet> {
        let rules = generate_rules(self.metadata, options)?;
        validate_rules(&rules, self.metadata)?;
        info!(
            tables = rules.tables.len(),
            fields = rules.field_count(),
            "generated rules"
        );
        Ok(rules)
    }

    /// Compile `text` when given, otherwise generate.
    pub fn compile_or_generate(&self, text: Option<&str>, options: &LoadOptions) -> Result<RuleSet> {
        match text {
            Some(text) => self.compile(text),
            None => self.generate(options),
        }
    }
}
