//! Per-row validation of mapped CSV data.
//!
//! # Rules
//!
//! 1. A required field mapped to a column must not be blank in any row.
//! 2. Mapped `date` / `number` fields must parse (blank values are left to rule 1).
//! 3. When an ID column is configured, rows sharing a non-blank ID with another
//!    row get a duplicate warning.
//!
//! Errors block the import unless invalid rows are skipped; warnings are
//! informational. Validation never touches the mapping or settings and is
//! idempotent: annotations are recomputed, not appended.
//!
//! The [`schema`] submodule checks built documents against the embedded
//! knowledge-document JSON schema.

pub mod schema;

use serde::Serialize;
use std::collections::HashMap;

use crate::mapping::ColumnMapping;
use crate::models::{ColumnType, CsvRow, ImportSettings, KnowledgeBaseField};
use crate::parser::{is_number, parse_date};

pub use schema::{is_valid_document, validate_against, validate_document};

/// Validate rows and return only those with errors or warnings.
///
/// Returned rows are copies carrying fresh `errors`/`warnings`; callers
/// correlate them with the full row set through `row_index`.
pub fn validate(
    rows: &[CsvRow],
    mapping: &ColumnMapping,
    settings: &ImportSettings,
    fields: &[KnowledgeBaseField],
) -> Vec<CsvRow> {
    let id_column = settings.id_column();
    let id_counts = id_column.map(|column| count_ids(rows, column));

    rows.iter()
        .filter_map(|row| {
            let errors = field_errors(row, mapping, fields);
            let warnings = match (id_column, &id_counts) {
                (Some(column), Some(counts)) => duplicate_warnings(row, column, counts),
                _ => Vec::new(),
            };

            if errors.is_empty() && warnings.is_empty() {
                return None;
            }

            let mut flagged = row.clone();
            flagged.errors = errors;
            flagged.warnings = warnings;
            Some(flagged)
        })
        .collect()
}

fn field_errors(row: &CsvRow, mapping: &ColumnMapping, fields: &[KnowledgeBaseField]) -> Vec<String> {
    let mut errors = Vec::new();

    for field in fields.iter().filter(|f| f.required) {
        if let Some(column) = mapping.column_for(field.key) {
            if row.get(column).trim().is_empty() {
                errors.push(format!("Required field '{}' is empty", field.label));
            }
        }
    }

    for field in fields {
        let Some(column) = mapping.column_for(field.key) else {
            continue;
        };
        let value = row.get(column).trim();
        if value.is_empty() {
            continue;
        }

        match field.field_type {
            ColumnType::Date if parse_date(value).is_none() => {
                errors.push(format!("Invalid date format in '{}': {}", field.label, value));
            }
            ColumnType::Number if !is_number(value) => {
                errors.push(format!("Invalid number format in '{}': {}", field.label, value));
            }
            _ => {}
        }
    }

    errors
}

fn count_ids<'a>(rows: &'a [CsvRow], column: &str) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        let id = row.get(column).trim();
        if !id.is_empty() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}

fn duplicate_warnings(row: &CsvRow, column: &str, counts: &HashMap<&str, usize>) -> Vec<String> {
    let id = row.get(column).trim();
    match counts.get(id) {
        Some(&count) if !id.is_empty() && count > 1 => {
            vec![format!("Duplicate document ID found: {}", id)]
        }
        _ => Vec::new(),
    }
}

/// Summary of a validation pass, as shown on the preview stage.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Flagged rows only.
    pub rows: Vec<CsvRow>,
    pub error_count: usize,
    pub warning_count: usize,
    /// Required fields with no column mapping.
    pub unmapped_required: Vec<String>,
}

impl ValidationReport {
    /// Run the validator and summarize its output.
    pub fn run(
        rows: &[CsvRow],
        mapping: &ColumnMapping,
        settings: &ImportSettings,
        fields: &[KnowledgeBaseField],
    ) -> Self {
        let flagged = validate(rows, mapping, settings, fields);
        let unmapped_required = fields
            .iter()
            .filter(|f| f.required && mapping.column_for(f.key).is_none())
            .map(|f| f.label.to_string())
            .collect();

        Self {
            error_count: flagged.iter().map(|r| r.errors.len()).sum(),
            warning_count: flagged.iter().map(|r| r.warnings.len()).sum(),
            rows: flagged,
            unmapped_required,
        }
    }

    /// Import may start without skipping rows.
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    /// Rows that carry at least one error.
    pub fn invalid_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.has_errors()).count()
    }

    /// Replace the annotations of `rows` with this report's findings.
    pub fn annotate(&self, rows: &mut [CsvRow]) {
        let by_index: HashMap<usize, &CsvRow> =
            self.rows.iter().map(|r| (r.row_index, r)).collect();

        for row in rows.iter_mut() {
            match by_index.get(&row.row_index) {
                Some(flagged) => {
                    row.errors = flagged.errors.clone();
                    row.warnings = flagged.warnings.clone();
                }
                None => {
                    row.errors.clear();
                    row.warnings.clear();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KNOWLEDGE_BASE_FIELDS;
    use crate::parser::parse_csv;

    fn mapping(pairs: &[(&str, &str)]) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        for (field, column) in pairs {
            mapping.set_mapping(field, column).unwrap();
        }
        mapping
    }

    #[test]
    fn test_required_field_blank() {
        let parsed = parse_csv("Title,Sector\nDocA,rail\n,maritime").unwrap();
        let mapping = mapping(&[("title", "Title"), ("sector", "Sector")]);

        let flagged = validate(&parsed.rows, &mapping, &ImportSettings::default(), KNOWLEDGE_BASE_FIELDS);

        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].row_index, 3);
        assert!(flagged[0].errors[0].contains("Required field 'Title' is empty"));
    }

    #[test]
    fn test_unmapped_required_field_not_checked() {
        let parsed = parse_csv("Title,Sector\nDocA,").unwrap();
        let mapping = mapping(&[("title", "Title"), ("sector", "none")]);

        let report = ValidationReport::run(&parsed.rows, &mapping, &ImportSettings::default(), KNOWLEDGE_BASE_FIELDS);
        assert!(report.is_valid());
        assert_eq!(report.unmapped_required, vec!["Sector"]);
    }

    #[test]
    fn test_invalid_date() {
        let parsed = parse_csv("Title,Sector,Published\nA,rail,2024-01-01\nB,rail,soon\nC,rail,").unwrap();
        let mapping = mapping(&[("title", "Title"), ("sector", "Sector"), ("date", "Published")]);

        let flagged = validate(&parsed.rows, &mapping, &ImportSettings::default(), KNOWLEDGE_BASE_FIELDS);

        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].errors, vec!["Invalid date format in 'Date': soon"]);
    }

    #[test]
    fn test_invalid_number_with_custom_fields() {
        let fields = [
            KnowledgeBaseField::new("title", "Title", ColumnType::String, true),
            KnowledgeBaseField::new("metadata", "Page Count", ColumnType::Number, false),
        ];
        let parsed = parse_csv("Title,Pages\nA,12\nB,twelve").unwrap();
        let mapping = mapping(&[("title", "Title"), ("metadata", "Pages")]);

        let flagged = validate(&parsed.rows, &mapping, &ImportSettings::default(), &fields);
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].errors[0].contains("Invalid number format in 'Page Count'"));
    }

    #[test]
    fn test_duplicate_id_warning() {
        let parsed = parse_csv("ID,Title,Sector\nD1,A,rail\nD2,B,rail\nD1,C,rail").unwrap();
        let mapping = mapping(&[("id", "ID"), ("title", "Title"), ("sector", "Sector")]);
        let settings = ImportSettings {
            document_id_column: Some("ID".into()),
            ..Default::default()
        };

        let flagged = validate(&parsed.rows, &mapping, &settings, KNOWLEDGE_BASE_FIELDS);

        let indices: Vec<usize> = flagged.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![2, 4]);
        for row in &flagged {
            assert!(row.errors.is_empty());
            assert!(row.warnings[0].contains("Duplicate document ID found"));
        }
        assert!(ValidationReport::run(&parsed.rows, &mapping, &settings, KNOWLEDGE_BASE_FIELDS).is_valid());
    }

    #[test]
    fn test_blank_ids_are_not_duplicates() {
        let parsed = parse_csv("ID,Title,Sector\n,A,rail\n,B,rail").unwrap();
        let settings = ImportSettings {
            document_id_column: Some("ID".into()),
            ..Default::default()
        };
        let flagged = validate(&parsed.rows, &ColumnMapping::new(), &settings, KNOWLEDGE_BASE_FIELDS);
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let parsed = parse_csv("ID,Title,Sector\nD1,,rail\nD1,B,rail").unwrap();
        let mapping = mapping(&[("title", "Title"), ("sector", "Sector")]);
        let settings = ImportSettings {
            document_id_column: Some("ID".into()),
            ..Default::default()
        };

        let first = validate(&parsed.rows, &mapping, &settings, KNOWLEDGE_BASE_FIELDS);
        let second = validate(&first, &mapping, &settings, KNOWLEDGE_BASE_FIELDS);
        let third = validate(&parsed.rows, &mapping, &settings, KNOWLEDGE_BASE_FIELDS);

        assert_eq!(first, third);
        // annotations are replaced, never accumulated
        assert_eq!(first, second);
    }

    #[test]
    fn test_annotate_recorrelates_by_row_index() {
        let mut parsed = parse_csv("Title,Sector\nA,rail\n,rail\nC,rail").unwrap();
        let mapping = mapping(&[("title", "Title"), ("sector", "Sector")]);

        let report = ValidationReport::run(&parsed.rows, &mapping, &ImportSettings::default(), KNOWLEDGE_BASE_FIELDS);
        report.annotate(&mut parsed.rows);

        assert!(!report.is_valid());
        assert_eq!(report.invalid_rows(), 1);
        assert!(parsed.rows[0].errors.is_empty());
        assert_eq!(parsed.rows[1].errors.len(), 1);
        assert!(parsed.rows[2].errors.is_empty());
    }
}
