//! Record file formats and their decoders.
//!
//! Every decoder produces flat rows: column name to cell text, annotation
//! columns included. Grouping into records happens afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use etl_model::{EtlError, Result};

pub type FlatRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Json,
    Csv,
    Xml,
}

impl RecordFormat {
    pub const ALL: [RecordFormat; 3] = [RecordFormat::Json, RecordFormat::Csv, RecordFormat::Xml];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Json => "json",
            RecordFormat::Csv => "csv",
            RecordFormat::Xml => "xml",
        }
    }

    /// Records file name inside an export directory.
    pub fn file_name(&self) -> String {
        format!("records.{}", self.as_str())
    }

    pub fn decode(&self, text: &str) -> Result<Vec<FlatRow>> {
        match self {
            RecordFormat::Json => decode_json(text),
            RecordFormat::Csv => decode_csv(text),
            RecordFormat::Xml => decode_xml(text),
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(RecordFormat::Json),
            "csv" => Ok(RecordFormat::Csv),
            "xml" => Ok(RecordFormat::Xml),
            other => Err(EtlError::config(format!(
                "unknown record format `{other}` (expected json, csv or xml)"
            ))),
        }
    }
}

// ============================================================================
// JSON
// ============================================================================

fn json_cell(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        serde_json::Value::Bool(flag) => if flag { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

fn decode_json(text: &str) -> Result<Vec<FlatRow>> {
    let rows: Vec<BTreeMap<String, serde_json::Value>> = serde_json::from_str(text)
        .map_err(|error| EtlError::source(format!("invalid JSON records: {error}")))?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(column, value)| (column, json_cell(value)))
                .collect()
        })
        .collect())
}

// ============================================================================
// CSV
// ============================================================================

fn normalize_header(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

fn decode_csv(text: &str) -> Result<Vec<FlatRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|error| EtlError::source(format!("invalid CSV header: {error}")))?
        .iter()
        .map(normalize_header)
        .collect();
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|error| {
            EtlError::source(format!("invalid CSV row {}: {error}", index + 1))
        })?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }
    Ok(rows)
}

// ============================================================================
// XML
// ============================================================================

#[derive(Deserialize)]
struct XmlRecords {
    #[serde(rename = "item", default)]
    items: Vec<BTreeMap<String, XmlCell>>,
}

#[derive(Deserialize)]
struct XmlCell {
    #[serde(rename = "$text", default)]
    text: String,
}

fn decode_xml(text: &str) -> Result<Vec<FlatRow>> {
    let records: XmlRecords = quick_xml::de::from_str(text)
        .map_err(|error| EtlError::source(format!("invalid XML records: {error}")))?;
    Ok(records
        .items
        .into_iter()
        .map(|item| {
            item.into_iter()
                .map(|(column, cell)| (column, cell.text))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_cells_become_text() {
        let rows = RecordFormat::Json
            .decode(r#"[{"record_id": 7, "flag": true, "note": null, "name": "Ann"}]"#)
            .expect("decode");
        assert_eq!(rows[0]["record_id"], "7");
        assert_eq!(rows[0]["flag"], "1");
        assert_eq!(rows[0]["note"], "");
        assert_eq!(rows[0]["name"], "Ann");
    }

    #[test]
    fn csv_headers_are_trimmed() {
        let rows = RecordFormat::Csv
            .decode("\u{feff}record_id , name\n1,Ann\n")
            .expect("decode");
        assert_eq!(rows[0]["record_id"], "1");
        assert_eq!(rows[0]["name"], "Ann");
    }

    #[test]
    fn ragged_csv_is_a_source_error() {
        let error = RecordFormat::Csv
            .decode("record_id,name\n1,Ann,extra\n")
            .expect_err("ragged");
        assert_eq!(error.kind(), etl_model::ErrorKind::Source);
    }

    #[test]
    fn formats_parse() {
        assert_eq!("XML".parse::<RecordFormat>().expect("xml"), RecordFormat::Xml);
        assert!("yaml".parse::<RecordFormat>().is_err());
    }
}
