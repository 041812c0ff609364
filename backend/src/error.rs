//! Error types for the knowledge-base import pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV decoding and parsing errors
//! - [`MappingError`] - Field mapping errors
//! - [`ImportError`] - Import executor errors
//! - [`StoreError`] - Document store errors
//! - [`RegistryError`] - Saved mapping registry errors
//! - [`WizardError`] - Wizard state machine errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//! - [`ConfigError`] - Environment configuration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors during CSV decoding and parsing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Malformed CSV record.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// No usable (non-blank) line in the file.
    #[error("CSV file is empty")]
    EmptyFile,
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors while editing a column mapping.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The field key is not a knowledge-base field.
    #[error("Unknown knowledge-base field: {0}")]
    UnknownField(String),

    /// JSON (de)serialization of a mapping failed.
    #[error("Invalid mapping JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Import Errors
// =============================================================================

/// Errors raised before an import run starts.
///
/// Row-level failures never surface here: they are collected in
/// [`crate::models::ImportResult::errors`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// Another import is holding the in-progress lock.
    #[error("An import is already in progress")]
    AlreadyRunning,

    /// Settings cannot be executed.
    #[error("Invalid import settings: {0}")]
    InvalidSettings(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the on-disk document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV export error.
    #[error("Export error: {0}")]
    ExportError(#[from] csv::Error),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the saved mapping registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Mapping not found.
    #[error("Mapping not found: {0}")]
    NotFound(String),

    /// Invalid mapping data.
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Wizard Errors
// =============================================================================

/// Errors from the import wizard state machine.
#[derive(Debug, Error)]
pub enum WizardError {
    /// The requested action is not allowed in the current stage.
    #[error("Cannot {action} from the {from} stage")]
    InvalidTransition { from: &'static str, action: &'static str },

    /// Forward navigation is blocked by a gate.
    #[error("Cannot continue: {0}")]
    Blocked(String),

    /// The uploaded file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] CsvError),

    /// Mapping edit failed.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The executor refused to start.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::import::pipeline::run_import`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Wizard error.
    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Validation blocked the import.
    #[error("Validation failed: {errors} row error(s), enable skip-invalid-rows to import anyway")]
    ValidationFailed { errors: usize },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> WizardError -> PipelineError
        let wizard_err: WizardError = CsvError::EmptyFile.into();
        let pipeline_err: PipelineError = wizard_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let pipeline_err: PipelineError = StoreError::NotFound("doc-1".into()).into();
        assert!(pipeline_err.to_string().contains("doc-1"));
    }

    #[test]
    fn test_transition_error_format() {
        let err = WizardError::InvalidTransition {
            from: "results",
            action: "go back",
        };
        let msg = err.to_string();
        assert!(msg.contains("results"));
        assert!(msg.contains("go back"));
    }

    #[test]
    fn test_parse_error_format() {
        let err = CsvError::ParseError {
            line: 4,
            message: "unterminated quote".into(),
        };
        assert!(err.to_string().contains("line 4"));
    }
}
