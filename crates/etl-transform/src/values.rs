//! Cell-level value conversion.

use chrono::{NaiveDate, NaiveDateTime};

use etl_model::checkbox_field_name;
use etl_model::ids::{CHECKED, UNCHECKED};

/// Normalize a date cell to `YYYY-MM-DD`.
///
/// Returns an empty string for an empty cell and `None` when the value is
/// not a recognizable date. Datetimes keep only their date part.
pub fn normalize_date(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return Some(String::new());
    }
    parse_datetime(value)
        .map(|datetime| datetime.date())
        .or_else(|| parse_date(value))
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d-%b-%Y",
        "%d.%m.%Y",
        "%Y%m%d",
    ];
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Checked state of one checkbox choice.
///
/// Pre-expanded `<column>___<code>` cells win. Otherwise a single `<column>`
/// cell may list the checked codes separated by `,`, `;` or `|`.
pub fn checkbox_value<'a>(lookup: impl Fn(&str) -> Option<&'a str>, column: &str, code: &str) -> &'static str {
    if let Some(cell) = lookup(&checkbox_field_name(column, code)) {
        return if is_checked(cell) { CHECKED } else { UNCHECKED };
    }
    let Some(cell) = lookup(column) else {
        return UNCHECKED;
    };
    let checked = cell
        .split([',', ';', '|'])
        .map(str::trim)
        .any(|listed| listed.eq_ignore_ascii_case(code.trim()));
    if checked { CHECKED } else { UNCHECKED }
}

fn is_checked(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "1" | "checked" | "true" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_normalize_to_iso() {
        assert_eq!(normalize_date("2024-01-15"), Some("2024-01-15".to_string()));
        assert_eq!(normalize_date("2024-01-15 10:30"), Some("2024-01-15".to_string()));
        assert_eq!(normalize_date("01/15/2024"), Some("2024-01-15".to_string()));
        assert_eq!(normalize_date("15-Jan-2024"), Some("2024-01-15".to_string()));
        assert_eq!(normalize_date("  "), Some(String::new()));
        assert_eq!(normalize_date("2024-02-30"), None);
        assert_eq!(normalize_date("soon"), None);
    }

    #[test]
    fn checkbox_shapes() {
        let expanded = |column: &str| match column {
            "tests___1" => Some("1"),
            "tests___2" => Some("0"),
            _ => None,
        };
        assert_eq!(checkbox_value(expanded, "tests", "1"), CHECKED);
        assert_eq!(checkbox_value(expanded, "tests", "2"), UNCHECKED);

        let listed = |column: &str| (column == "tests").then_some("1; 3");
        assert_eq!(checkbox_value(listed, "tests", "3"), CHECKED);
        assert_eq!(checkbox_value(listed, "tests", "2"), UNCHECKED);
        assert_eq!(checkbox_value(|_| None, "tests", "1"), UNCHECKED);
    }
}
