//! Build knowledge-base documents from mapped CSV rows.
//!
//! Raw strings are coerced into the document shape:
//!
//! - `sector`: label aliases resolved (`railway` → `rail`), blank → `general`
//! - `useCases` / `tags`: split on `;`, `|` or `,`, trimmed, de-duplicated
//! - `date`: any accepted layout, normalized to `YYYY-MM-DD`
//! - `metadata`: must be a JSON object when present
//!
//! Optional fields are omitted when blank.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::mapping::ColumnMapping;
use crate::models::{CsvRow, ImportIssue, KnowledgeDocument, Sector};
use crate::parser::parse_date;

static LIST_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[;|,]\s*").expect("Invalid list separator regex"));

/// Build the document for `row`, stored under `id`.
pub fn build_document(
    row: &CsvRow,
    mapping: &ColumnMapping,
    id: String,
) -> Result<KnowledgeDocument, ImportIssue> {
    let reader = RowReader { row, mapping };

    let sector = match reader.text("sector") {
        None => Sector::General,
        Some(label) => Sector::from_label(&label).ok_or_else(|| {
            ImportIssue::error(row.row_index, format!("Unknown sector '{}'", label))
                .with_field("sector")
        })?,
    };

    let date = match reader.text("date") {
        None => None,
        Some(raw) => {
            let date = parse_date(&raw).ok_or_else(|| {
                ImportIssue::error(row.row_index, format!("Invalid date '{}'", raw))
                    .with_field("date")
            })?;
            Some(date.format("%Y-%m-%d").to_string())
        }
    };

    let metadata = match reader.text("metadata") {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(ImportIssue::error(
                    row.row_index,
                    "Metadata must be a JSON object",
                )
                .with_field("metadata"))
            }
        },
    };

    Ok(KnowledgeDocument {
        id,
        title: reader.text("title").unwrap_or_default(),
        description: reader.text("description"),
        sector,
        use_cases: reader.list("useCases"),
        source: reader.text("source"),
        date,
        status: reader.text("status").map(|s| s.to_lowercase()),
        tags: reader.list("tags"),
        content: reader.text("content"),
        metadata,
    })
}

/// Split a list cell into unique, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in LIST_SEPARATOR.split(raw.trim()) {
        let item = item.trim();
        if !item.is_empty() && !items.iter().any(|i| i.eq_ignore_ascii_case(item)) {
            items.push(item.to_string());
        }
    }
    items
}

/// Reads mapped field values out of a row.
struct RowReader<'a> {
    row: &'a CsvRow,
    mapping: &'a ColumnMapping,
}

impl RowReader<'_> {
    /// Trimmed value of a mapped field, `None` when unmapped or blank.
    fn text(&self, field: &str) -> Option<String> {
        let column = self.mapping.column_for(field)?;
        let value = self.row.get(column).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn list(&self, field: &str) -> Vec<String> {
        self.text(field).map(|v| split_list(&v)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv;

    fn template_mapping() -> ColumnMapping {
        let headers: Vec<String> = [
            "Document ID", "Title", "Sector", "Use Cases", "Date", "Status", "Tags", "Metadata",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        ColumnMapping::auto_detect(&headers)
    }

    #[test]
    fn test_full_row() {
        let csv = "Document ID,Title,Sector,Use Cases,Date,Status,Tags,Metadata\n\
                   D1,Ports Strategy,Shipping,Planning; Investment,15/03/2024x,Active,\"ports, freight, Ports\",\"{\"\"pages\"\": 40}\"";
        let parsed = parse_csv(csv).unwrap();
        let mapping = template_mapping();

        // Invalid date is reported with its field
        let err = build_document(&parsed.rows[0], &mapping, "D1".into()).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("date"));

        let csv = csv.replace("15/03/2024x", "2024-03-15");
        let parsed = parse_csv(&csv).unwrap();
        let doc = build_document(&parsed.rows[0], &mapping, "D1".into()).unwrap();

        assert_eq!(doc.sector, Sector::Maritime);
        assert_eq!(doc.use_cases, vec!["Planning", "Investment"]);
        assert_eq!(doc.tags, vec!["ports", "freight"]);
        assert_eq!(doc.date.as_deref(), Some("2024-03-15"));
        assert_eq!(doc.status.as_deref(), Some("active"));
        assert_eq!(doc.metadata["pages"], 40);
    }

    #[test]
    fn test_blank_sector_defaults_to_general() {
        let parsed = parse_csv("Title,Sector\nOverview,").unwrap();
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("sector", "Sector").unwrap();

        let doc = build_document(&parsed.rows[0], &mapping, "x".into()).unwrap();
        assert_eq!(doc.sector, Sector::General);
        assert!(doc.description.is_none());
    }

    #[test]
    fn test_unknown_sector_rejected() {
        let parsed = parse_csv("Title,Sector\nAirports,aviation").unwrap();
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("sector", "Sector").unwrap();

        let err = build_document(&parsed.rows[0], &mapping, "x".into()).unwrap_err();
        assert_eq!(err.row, 2);
        assert!(err.message.contains("aviation"));
    }

    #[test]
    fn test_metadata_must_be_object() {
        let parsed = parse_csv("Title,Metadata\nA,[1]").unwrap();
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("metadata", "Metadata").unwrap();

        let err = build_document(&parsed.rows[0], &mapping, "x".into()).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("metadata"));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a; b | c,d"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_list(" ;; "), Vec::<String>::new());
    }
}
