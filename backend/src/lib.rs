//! # kbimport - CSV import for the transport knowledge base
//!
//! kbimport turns spreadsheet exports of rail, maritime and highways strategy
//! documents into knowledge-base documents, through a six-stage import wizard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ CSV File │──▶│  Parser  │──▶│ Mapping  │──▶│ Validator │──▶│ Executor │──▶│  Store   │
//! │(any enc.)│   │(+ types) │   │(registry)│   │(+ schema) │   │(batches) │   │ (JSON)   │
//! └──────────┘   └──────────┘   └──────────┘   └───────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kbimport::{run_import, CancelToken, DocumentStore, ImportExecutor, ImportRequest, MappingRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bytes = std::fs::read("strategies.csv").unwrap();
//!     let mut store = DocumentStore::with_dir(".kb-import");
//!     let mut registry = MappingRegistry::in_data_dir(".kb-import");
//!     let output = run_import(
//!         &bytes,
//!         ImportRequest::default(),
//!         &mut store,
//!         &mut registry,
//!         &ImportExecutor::default(),
//!         &CancelToken::new(),
//!     )
//!     .await
//!     .unwrap();
//!     println!("{}", output.result.summary());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (rows, fields, settings, results, documents)
//! - [`parser`] - CSV parsing with auto-detection and type inference
//! - [`mapping`] - Field to column mapping
//! - [`validation`] - Row validation and document schema
//! - [`import`] - Import executor and end-to-end pipeline
//! - [`wizard`] - Import wizard state machine
//! - [`store`] - On-disk document store
//! - [`export`] - CSV template and export
//! - [`cache`] - Saved mapping registry
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing and mapping
pub mod mapping;
pub mod parser;

// Validation
pub mod validation;

// Import
pub mod import;
pub mod wizard;

// Persistence
pub mod cache;
pub mod export;
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, ImportError, MappingError, PipelineError, RegistryError, ServerError,
    StoreError, WizardError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ColumnType, ConflictResolution, CsvColumn, CsvRow, ImportIssue, ImportResult, ImportSettings,
    KnowledgeBaseField, KnowledgeDocument, Sector, Severity, KNOWLEDGE_BASE_FIELDS,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, infer_type, parse_bytes, parse_csv,
    parse_file, CsvInfo, ParseResult, ParsedCsv,
};

// =============================================================================
// Re-exports - Mapping & Validation
// =============================================================================

pub use mapping::{ColumnMapping, MappingTarget};
pub use validation::{validate, validate_document, ValidationReport};

// =============================================================================
// Re-exports - Import
// =============================================================================

pub use import::{
    preview, run_import, CancelToken, DocumentIndex, FnIndex, ImportExecutor, ImportLock,
    ImportOutcome, ImportProgress, ImportRequest, PipelineOutput, PreviewOutput,
};
pub use wizard::{ImportWizard, Stage, WizardState};

// =============================================================================
// Re-exports - Persistence
// =============================================================================

pub use cache::{MappingRegistry, StoredMapping};
pub use export::{export_csv, template_csv, TEMPLATE_FILE_NAME};
pub use store::{ApplySummary, DocumentStore};

// =============================================================================
// Re-exports - Config & API
// =============================================================================

pub use config::Config;
pub use api::types::{error_response, ImportResponse, PreviewResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
