//! Result rendering for query output.
//!
//! Formatters consume the executor's ordered rows and are presentation-only:
//! they must preserve column order as given, because SELECT order is part of
//! the result contract.
//!
//! # Formats
//!
//! - **Table** via [`to_table()`] - aligned columns for terminal display
//! - **JSON** via [`to_json()`] - array of objects, keys in column order
//! - **CSV** via [`to_csv()`] - header row plus one record per result row
//! - **HTML** via [`to_html()`] - an escaped `<table>`
//!
//! # Examples
//!
//! ```
//! use xql_lang::executor::ResultRow;
//! use xql_lang::output::to_csv;
//!
//! let mut row = ResultRow::new();
//! row.push("name", "Ana");
//! row.push("city", "Lisbon, PT");
//!
//! assert_eq!(to_csv(&[row]), "name,city\nAna,\"Lisbon, PT\"\n");
//! ```

use crate::executor::ResultRow;

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
    Html,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<OutputFormat> {
        match name.to_ascii_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            "html" => Some(OutputFormat::Html),
            _ => None,
        }
    }
}

/// Renders rows in the requested format.
pub fn render(rows: &[ResultRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => to_table(rows),
        OutputFormat::Json => to_json(rows),
        OutputFormat::Csv => to_csv(rows),
        OutputFormat::Html => to_html(rows),
    }
}

fn header_of(rows: &[ResultRow]) -> Vec<&str> {
    rows.first()
        .map(|row| row.columns.iter().map(|(name, _)| name.as_str()).collect())
        .unwrap_or_default()
}

/// Aligned text table with a header and separator line.
pub fn to_table(rows: &[ResultRow]) -> String {
    let header = header_of(rows);
    if header.is_empty() {
        return "(no results)\n".to_string();
    }

    let mut widths: Vec<usize> = header.iter().map(|name| name.chars().count()).collect();
    for row in rows {
        for (index, (_, value)) in row.columns.iter().enumerate() {
            if index < widths.len() {
                widths[index] = widths[index].max(value.chars().count());
            }
        }
    }

    let mut out = String::new();
    for (index, name) in header.iter().enumerate() {
        if index > 0 {
            out.push_str(" | ");
        }
        out.push_str(&format!("{:<width$}", name, width = widths[index]));
    }
    out.push('\n');
    for (index, width) in widths.iter().enumerate() {
        if index > 0 {
            out.push_str("-+-");
        }
        out.push_str(&"-".repeat(*width));
    }
    out.push('\n');

    for row in rows {
        for (index, (_, value)) in row.columns.iter().enumerate() {
            if index > 0 {
                out.push_str(" | ");
            }
            let width = widths.get(index).copied().unwrap_or(0);
            out.push_str(&format!("{:<width$}", value, width = width));
        }
        out.push('\n');
    }
    out
}

/// JSON array of objects. Keys keep column order; a duplicated column name
/// keeps its last value, since JSON objects cannot repeat keys.
pub fn to_json(rows: &[ResultRow]) -> String {
    let array: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (name, value) in &row.columns {
                object.insert(name.clone(), serde_json::Value::String(value.clone()));
            }
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::to_string_pretty(&serde_json::Value::Array(array))
        .unwrap_or_else(|_| "[]".to_string())
}

/// CSV with a header row. Fields containing commas, quotes, or newlines are
/// quoted, with embedded quotes doubled.
pub fn to_csv(rows: &[ResultRow]) -> String {
    let header = header_of(rows);
    if header.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let escaped: Vec<String> = header.iter().map(|name| csv_field(name)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = row
            .columns
            .iter()
            .map(|(_, value)| csv_field(value))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// An HTML `<table>` with escaped cell content.
pub fn to_html(rows: &[ResultRow]) -> String {
    let header = header_of(rows);
    let mut out = String::from("<table>\n");
    if !header.is_empty() {
        out.push_str("  <tr>");
        for name in &header {
            out.push_str(&format!("<th>{}</th>", html_escape(name)));
        }
        out.push_str("</tr>\n");
    }
    for row in rows {
        out.push_str("  <tr>");
        for (_, value) in &row.columns {
            out.push_str(&format!("<td>{}</td>", html_escape(value)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
