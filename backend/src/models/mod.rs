//! Domain models for the import pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`CsvColumn`] / [`CsvRow`] - Parsed CSV content with row annotations
//! - [`KnowledgeBaseField`] - Canonical document attributes columns map onto
//! - [`ImportSettings`] / [`ConflictResolution`] - Import configuration
//! - [`ImportResult`] - Accumulated outcome of one import run
//! - [`KnowledgeDocument`] / [`Sector`] - The record an imported row becomes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Columns and Rows
// =============================================================================

/// Inferred or declared type of a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column of the parsed CSV file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvColumn {
    /// Header text (trimmed).
    pub name: String,
    /// Type inferred from the first sample values.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column feeds a required field.
    pub required: bool,
    /// Knowledge-base field key this column is mapped to, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mapped: Option<String>,
}

impl CsvColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            required: false,
            mapped: None,
        }
    }
}

/// One data row of the CSV file.
///
/// `row_index` is the 1-based line number the row would have in a
/// spreadsheet view, i.e. data index + 2 to account for the header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvRow {
    /// Raw values keyed by source column name.
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
    #[serde(rename = "_rowIndex")]
    pub row_index: usize,
    #[serde(rename = "_errors", default)]
    pub errors: Vec<String>,
    #[serde(rename = "_warnings", default)]
    pub warnings: Vec<String>,
}

impl CsvRow {
    pub fn new(row_index: usize, values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            row_index,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Raw value of a column, `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True when the row carries at least one error or warning.
    pub fn is_flagged(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

// =============================================================================
// Knowledge-base Fields
// =============================================================================

/// A canonical document attribute that CSV columns are mapped onto.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct KnowledgeBaseField {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: ColumnType,
    pub required: bool,
}

impl KnowledgeBaseField {
    pub const fn new(
        key: &'static str,
        label: &'static str,
        field_type: ColumnType,
        required: bool,
    ) -> Self {
        Self {
            key,
            label,
            field_type,
            required,
        }
    }
}

/// The knowledge-base field set, in template column order.
pub const KNOWLEDGE_BASE_FIELDS: &[KnowledgeBaseField] = &[
    KnowledgeBaseField::new("id", "Document ID", ColumnType::String, false),
    KnowledgeBaseField::new("title", "Title", ColumnType::String, true),
    KnowledgeBaseField::new("description", "Description", ColumnType::String, false),
    KnowledgeBaseField::new("sector", "Sector", ColumnType::String, true),
    KnowledgeBaseField::new("useCases", "Use Cases", ColumnType::String, false),
    KnowledgeBaseField::new("source", "Source", ColumnType::String, false),
    KnowledgeBaseField::new("date", "Date", ColumnType::Date, false),
    KnowledgeBaseField::new("status", "Status", ColumnType::String, false),
    KnowledgeBaseField::new("tags", "Tags", ColumnType::String, false),
    KnowledgeBaseField::new("content", "Content", ColumnType::String, false),
    KnowledgeBaseField::new("metadata", "Metadata", ColumnType::String, false),
];

/// Look up a knowledge-base field by key.
pub fn knowledge_base_field(key: &str) -> Option<&'static KnowledgeBaseField> {
    KNOWLEDGE_BASE_FIELDS.iter().find(|f| f.key == key)
}

// =============================================================================
// Import Settings
// =============================================================================

/// How an already-existing document (by ID) is handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Replace the existing document.
    Overwrite,
    /// Create a new document regardless of the conflict.
    New,
    /// Leave the existing document untouched.
    #[default]
    Skip,
    /// Merge incoming fields into the existing document.
    Merge,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::New => "new",
            Self::Skip => "skip",
            Self::Merge => "merge",
        }
    }
}

impl std::str::FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "new" => Ok(Self::New),
            "skip" => Ok(Self::Skip),
            "merge" => Ok(Self::Merge),
            other => Err(format!(
                "unknown conflict resolution '{}' (expected overwrite, new, skip or merge)",
                other
            )),
        }
    }
}

/// Configuration of one import session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSettings {
    pub conflict_resolution: ConflictResolution,
    /// CSV column holding the document ID used for conflict detection.
    pub document_id_column: Option<String>,
    pub validate_data: bool,
    pub skip_invalid_rows: bool,
    pub create_backup: bool,
    /// Rows per existence lookup.
    pub batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolution::Skip,
            document_id_column: None,
            validate_data: true,
            skip_invalid_rows: true,
            create_backup: true,
            batch_size: 100,
        }
    }
}

impl ImportSettings {
    /// The configured ID column, ignoring blank values.
    pub fn id_column(&self) -> Option<&str> {
        self.document_id_column
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != "none")
    }
}

// =============================================================================
// Import Result
// =============================================================================

/// Severity of an import issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A row-level problem recorded during import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportIssue {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ImportIssue {
    pub fn error(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Accumulated outcome of one import run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub total_rows: usize,
    /// Rows that produced a new or updated record.
    pub processed_rows: usize,
    pub new_records: usize,
    pub updated_records: usize,
    pub skipped_rows: usize,
    pub errors: Vec<ImportIssue>,
    /// The run was stopped through its cancel token.
    #[serde(default)]
    pub cancelled: bool,
}

impl ImportResult {
    pub fn new(total_rows: usize) -> Self {
        Self {
            total_rows,
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    /// Summary line for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} new, {} updated, {} skipped, {} errors",
            self.total_rows,
            self.new_records,
            self.updated_records,
            self.skipped_rows,
            self.error_count()
        )
    }
}

// =============================================================================
// Knowledge Documents
// =============================================================================

/// Domain a document belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Rail,
    Maritime,
    Highways,
    #[default]
    General,
}

impl Sector {
    /// Parse a sector from a free-text label.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "rail" | "railway" | "railways" | "train" | "trains" => Some(Self::Rail),
            "maritime" | "marine" | "shipping" | "ports" | "port" => Some(Self::Maritime),
            "highways" | "highway" | "roads" | "road" => Some(Self::Highways),
            "general" | "cross-sector" | "multimodal" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rail => "rail",
            Self::Maritime => "maritime",
            Self::Highways => "highways",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A knowledge-base document as produced from one CSV row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sector: Sector,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub use_cases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
    /// ISO date (`YYYY-MM-DD`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub metadata: Map<String, Value>,
}

impl KnowledgeDocument {
    /// Create a document with minimal required fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, sector: Sector) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            sector,
            use_cases: Vec::new(),
            source: None,
            date: None,
            status: None,
            tags: Vec::new(),
            content: None,
            metadata: Map::new(),
        }
    }
}

/// What applying a planned document does to the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Create,
    Overwrite,
    Merge,
}

/// A document the executor decided to write, with the row it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDocument {
    pub row: usize,
    pub action: ImportAction,
    pub document: KnowledgeDocument,
    /// The row carried a sector value. When false the document holds the
    /// `general` fallback, which must not replace a stored sector on merge.
    pub sector_given: bool,
}

// =============================================================================
// Tests
// =============================================================================
