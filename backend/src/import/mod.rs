//! Import execution.
//!
//! - [`executor`] - batched, policy-driven import runs
//! - [`document`] - row to knowledge-document conversion
//! - [`index`] - existence lookups for conflict detection
//! - [`pipeline`] - end-to-end import of an uploaded file

pub mod document;
pub mod executor;
pub mod index;
pub mod pipeline;

pub use document::{build_document, split_list};
pub use executor::{
    resolve_document_id, CancelToken, ImportExecutor, ImportGuard, ImportLock, ImportOutcome,
    ImportProgress, DEFAULT_ROW_DELAY,
};
pub use index::{DocumentIndex, FnIndex};
pub use pipeline::{
    preview, run_import, ImportRequest, MappingSource, PipelineOutput, PreviewOutput,
    ValidationSummary,
};
