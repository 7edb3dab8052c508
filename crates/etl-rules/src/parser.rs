//! Line-oriented rule text parser.
//!
//! ```text
//! # comment
//! ROOT  <name> <keyField>
//! TABLE <name> <parent> <keyField> <rowsType>
//! FIELD <source> [<target>] <type> [size]
//! ```
//!
//! Tokens are separated by whitespace and/or commas.

use etl_model::{EtlError, FieldType, Result, RowsType};

use crate::ast::{FieldRule, RuleSet, TableRule};

pub fn parse_rules(text: &str) -> Result<RuleSet> {
    let mut rules = RuleSet::default();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens = tokenize(trimmed);
        let Some((keyword, args)) = tokens.split_first() else {
            continue;
        };
        let statement = Statement {
            line,
            text: trimmed,
            args,
        };
        match keyword.to_ascii_uppercase().as_str() {
            "ROOT" => statement.root(&mut rules)?,
            "TABLE" => statement.table(&mut rules)?,
            "FIELD" => statement.field(&mut rules)?,
            _ => return Err(statement.error(format!("unknown statement `{keyword}`"))),
        }
    }
    Ok(rules)
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect()
}

struct Statement<'a> {
    line: usize,
    text: &'a str,
    args: &'a [&'a str],
}

impl Statement<'_> {
    fn error(&self, message: impl Into<String>) -> EtlError {
        EtlError::rule_syntax(self.line, self.text, message)
    }

    fn root(&self, rules: &mut RuleSet) -> Result<()> {
        let [name, key_field] = self.args else {
            return Err(self.error("expected `ROOT <name> <keyField>`"));
        };
        self.push_root(rules, name, key_field)
    }

    fn push_root(&self, rules: &mut RuleSet, name: &str, key_field: &str) -> Result<()> {
        if rules.root().is_some() {
            return Err(self.error("a root table is already declared"));
        }
        let mut table = TableRule::root(name, key_field);
        table.line = self.line;
        rules.tables.push(table);
        Ok(())
    }

    fn table(&self, rules: &mut RuleSet) -> Result<()> {
        match self.args {
            [name, key_field, rows] if rows.eq_ignore_ascii_case("ROOT") => {
                self.push_root(rules, name, key_field)
            }
            [name, parent, key_field, rows] => {
                let mut table = TableRule::child(*name, *parent, *key_field, RowsType::Root);
                table.line = self.line;
                self.apply_rows_token(&mut table, rows)?;
                rules.tables.push(table);
                Ok(())
            }
            _ => Err(self.error("expected `TABLE <name> <parent> <keyField> <rowsType>`")),
        }
    }

    fn apply_rows_token(&self, table: &mut TableRule, token: &str) -> Result<()> {
        let (keyword, list) = match token.split_once(':') {
            Some((keyword, list)) => (keyword, Some(list)),
            None => (token, None),
        };
        let rows_type = RowsType::from_keyword(keyword)
            .ok_or_else(|| self.error(format!("unknown rows type `{keyword}`")))?;
        let items: Vec<String> = list
            .map(|list| {
                list.split(';')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        table.rows_type = rows_type;
        match rows_type {
            RowsType::Root if !items.is_empty() => {
                return Err(self.error("rows type ROOT takes no list"));
            }
            RowsType::Root => {}
            RowsType::ByEvents | RowsType::ByRepeatingEvents => table.suffixes = items,
            RowsType::ByRepeatingInstruments => match items.as_slice() {
                [] => {}
                [instrument] => table.instrument = Some(instrument.clone()),
                _ => {
                    return Err(self.error("REPEATING_INSTRUMENTS names a single instrument"));
                }
            },
            RowsType::BySuffixes | RowsType::ByEventsSuffixes => {
                if items.is_empty() {
                    return Err(self.error(format!("{keyword} requires a suffix list")));
                }
                table.suffixes = items;
            }
        }
        Ok(())
    }

    fn field(&self, rules: &mut RuleSet) -> Result<()> {
        let Some(table) = rules.tables.last_mut() else {
            return Err(self.error("FIELD statement before any ROOT or TABLE"));
        };
        let (source, target, rest) = match self.args {
            [source, kind, rest @ ..] if self.defaults_target(kind, rest) => {
                (*source, *source, &self.args[1..])
            }
            [source, target, rest @ ..] if !rest.is_empty() => (*source, *target, rest),
            [_, kind] => return Err(self.error(format!("unknown field type `{kind}`"))),
            _ => return Err(self.error("expected `FIELD <source> <target> <type> [size]`")),
        };
        let (field_type, size) = self.field_type(rest)?;
        let mut rule = FieldRule::new(source, target, field_type);
        rule.size = size;
        rule.line = self.line;
        table.fields.push(rule);
        Ok(())
    }

    /// `FIELD <source> <type> [size]` with the target defaulting to the source.
    fn defaults_target(&self, kind: &str, rest: &[&str]) -> bool {
        if parse_type_keyword(kind).is_none() {
            return false;
        }
        match rest {
            [] => true,
            [size] => size.parse::<u32>().is_ok(),
            _ => false,
        }
    }

    fn field_type(&self, tokens: &[&str]) -> Result<(FieldType, Option<u32>)> {
        let Some((kind, rest)) = tokens.split_first() else {
            return Err(self.error("expected a field type"));
        };
        let (field_type, inline_size) = parse_type_keyword(kind)
            .ok_or_else(|| self.error(format!("unknown field type `{kind}`")))?;
        let size = match (rest, inline_size) {
            ([], size) => size,
            ([size], None) => Some(self.parse_size(size)?),
            _ => return Err(self.error("unexpected tokens after field type")),
        };
        match (field_type, size) {
            (FieldType::Char, None) => Err(self.error("char fields need a size")),
            (FieldType::Char, Some(size)) => Ok((FieldType::Char, Some(size))),
            (other, None) => Ok((other, None)),
            (other, Some(_)) => Err(self.error(format!(
                "field type {} does not take a size",
                other.as_str().to_lowercase()
            ))),
        }
    }

    fn parse_size(&self, token: &str) -> Result<u32> {
        match token.parse::<u32>() {
            Ok(size) if size > 0 => Ok(size),
            _ => Err(self.error(format!("invalid size `{token}`"))),
        }
    }
}

/// Type keyword, with an inline `char(n)` size when present. A malformed
/// inline size yields `None` so the caller reports the whole token.
fn parse_type_keyword(token: &str) -> Option<(FieldType, Option<u32>)> {
    let lower = token.to_ascii_lowercase();
    if let Some(inner) = lower
        .strip_prefix("char(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let size = inner.trim().parse::<u32>().ok().filter(|size| *size > 0)?;
        return Some((FieldType::Char, Some(size)));
    }
    let field_type = match lower.as_str() {
        "int" | "integer" => FieldType::Integer,
        "float" | "number" | "real" => FieldType::Float,
        "string" | "text" | "varchar" => FieldType::String,
        "char" => FieldType::Char,
        "date" | "datetime" => FieldType::Date,
        "checkbox" => FieldType::Checkbox,
        _ => return None,
    };
    Some((field_type, None))
}
