//! Import executor.
//!
//! Walks the rows in batches, looks up which document IDs already exist (one
//! lookup per batch), applies the conflict-resolution policy and accumulates
//! an [`ImportResult`]. The executor only plans writes: persisting the
//! returned [`PlannedDocument`]s is the caller's job.
//!
//! | Policy      | Existing ID      | New ID |
//! |-------------|------------------|--------|
//! | `overwrite` | updated          | new    |
//! | `skip`      | skipped          | new    |
//! | `new`       | new (fresh UUID) | new    |
//! | `merge`     | updated          | new    |

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::document::build_document;
use super::index::DocumentIndex;
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::error::ImportError;
use crate::mapping::ColumnMapping;
use crate::models::{
    ConflictResolution, CsvRow, ImportAction, ImportIssue, ImportResult, ImportSettings,
    PlannedDocument,
};
use crate::validation::validate_document;

/// Default pause before each row.
pub const DEFAULT_ROW_DELAY: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag, checked before every row.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both tokens control the same run.
    pub fn same_run(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// In-progress flag shared by every executor that must not overlap.
#[derive(Debug, Clone, Default)]
pub struct ImportLock(Arc<AtomicBool>);

impl ImportLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or fail if an import is already running.
    pub fn try_acquire(&self) -> Result<ImportGuard, ImportError> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ImportError::AlreadyRunning)?;
        Ok(ImportGuard(self.0.clone()))
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the import lock when dropped.
#[derive(Debug)]
pub struct ImportGuard(Arc<AtomicBool>);

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress notification sent after each row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub handled: usize,
    pub total: usize,
    pub percent: f64,
}

/// Result of one run: the counters plus the documents to write.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub result: ImportResult,
    pub documents: Vec<PlannedDocument>,
}

/// What happens to a single row.
enum RowDecision {
    Skip,
    Write(PlannedDocument),
}

/// Runs imports one at a time.
#[derive(Debug, Clone)]
pub struct ImportExecutor {
    row_delay: Duration,
    lock: ImportLock,
    progress: Option<UnboundedSender<ImportProgress>>,
}

impl Default for ImportExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_DELAY)
    }
}

impl ImportExecutor {
    pub fn new(row_delay: Duration) -> Self {
        Self {
            row_delay,
            lock: ImportLock::new(),
            progress: None,
        }
    }

    /// Share an in-progress lock with other executors.
    pub fn with_lock(mut self, lock: ImportLock) -> Self {
        self.lock = lock;
        self
    }

    /// Send an [`ImportProgress`] after each handled row.
    pub fn with_progress(mut self, sender: UnboundedSender<ImportProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn lock(&self) -> &ImportLock {
        &self.lock
    }

    /// Import `rows` against `index`.
    ///
    /// Only fails before the first row (lock held, unusable settings); every
    /// row-level failure is recorded in the result instead. With
    /// `skip_invalid_rows` off, the first failing row stops the run and the
    /// partial result is returned.
    pub async fn execute(
        &self,
        rows: &[CsvRow],
        mapping: &ColumnMapping,
        settings: &ImportSettings,
        index: &dyn DocumentIndex,
        cancel: &CancelToken,
    ) -> Result<ImportOutcome, ImportError> {
        if settings.batch_size == 0 {
            return Err(ImportError::InvalidSettings(
                "batch size must be at least 1".to_string(),
            ));
        }
        let _guard = self.lock.try_acquire()?;

        let total = rows.len();
        let batch_count = total.div_ceil(settings.batch_size);
        let mut result = ImportResult::new(total);
        let mut documents = Vec::new();
        let mut handled = 0;

        log_info(format!(
            "📥 Importing {} rows (policy: {}, {} batch(es) of up to {})",
            total,
            settings.conflict_resolution.as_str(),
            batch_count,
            settings.batch_size
        ));

        'batches: for (batch_no, batch) in rows.chunks(settings.batch_size).enumerate() {
            let ids: Vec<Option<String>> = batch
                .iter()
                .map(|row| resolve_document_id(row, mapping, settings))
                .collect();
            let existing = {
                let lookup: Vec<&str> = ids.iter().flatten().map(String::as_str).collect();
                if lookup.is_empty() {
                    HashSet::new()
                } else {
                    index.existing_ids(&lookup)
                }
            };

            for (row, id) in batch.iter().zip(ids) {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    log_warning(format!("Import cancelled after {} of {} rows", handled, total));
                    break 'batches;
                }
                self.pause().await;

                result.errors.extend(
                    row.warnings
                        .iter()
                        .map(|w| ImportIssue::warning(row.row_index, w.clone())),
                );

                let exists = id.as_deref().is_some_and(|id| existing.contains(id));

                match process_row(row, id, exists, mapping, settings) {
                    Ok(RowDecision::Skip) => result.skipped_rows += 1,
                    Ok(RowDecision::Write(planned)) => {
                        match planned.action {
                            ImportAction::Create => result.new_records += 1,
                            ImportAction::Overwrite | ImportAction::Merge => {
                                result.updated_records += 1
                            }
                        }
                        result.processed_rows += 1;
                        documents.push(planned);
                    }
                    Err(issues) => {
                        result.errors.extend(issues);
                        if !settings.skip_invalid_rows {
                            handled += 1;
                            self.report(handled, total);
                            log_error(format!(
                                "Row {} failed, stopping import (skip invalid rows is off)",
                                row.row_index
                            ));
                            break 'batches;
                        }
                    }
                }

                handled += 1;
                self.report(handled, total);
            }

            log_info(format!(
                "Batch {}/{} done ({:.0}%)",
                batch_no + 1,
                batch_count,
                percent(handled, total)
            ));
        }

        log_success(result.summary());
        Ok(ImportOutcome { result, documents })
    }

    async fn pause(&self) {
        if self.row_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.row_delay).await;
        }
    }

    fn report(&self, handled: usize, total: usize) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ImportProgress {
                handled,
                total,
                percent: percent(handled, total),
            });
        }
    }
}

fn percent(handled: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        handled as f64 / total as f64 * 100.0
    }
}

/// Document ID of a row: the configured ID column, else the mapped `id` field.
pub fn resolve_document_id(
    row: &CsvRow,
    mapping: &ColumnMapping,
    settings: &ImportSettings,
) -> Option<String> {
    settings
        .id_column()
        .or_else(|| mapping.column_for("id"))
        .map(|column| row.get(column).trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn process_row(
    row: &CsvRow,
    id: Option<String>,
    exists: bool,
    mapping: &ColumnMapping,
    settings: &ImportSettings,
) -> Result<RowDecision, Vec<ImportIssue>> {
    if row.has_errors() {
        return Err(row
            .errors
            .iter()
            .map(|e| ImportIssue::error(row.row_index, e.clone()))
            .collect());
    }

    let policy = settings.conflict_resolution;
    let action = match (exists, policy) {
        (false, _) | (true, ConflictResolution::New) => ImportAction::Create,
        (true, ConflictResolution::Skip) => return Ok(RowDecision::Skip),
        (true, ConflictResolution::Overwrite) => ImportAction::Overwrite,
        (true, ConflictResolution::Merge) => ImportAction::Merge,
    };

    let document_id = match id {
        Some(id) if !(exists && policy == ConflictResolution::New) => id,
        _ => Uuid::new_v4().to_string(),
    };

    let document = build_document(row, mapping, document_id).map_err(|issue| vec![issue])?;

    if settings.validate_data {
        let json = serde_json::to_value(&document)
            .map_err(|e| vec![ImportIssue::error(row.row_index, e.to_string())])?;
        validate_document(&json).map_err(|errors| {
            errors
                .into_iter()
                .map(|e| ImportIssue::error(row.row_index, format!("Schema violation: {}", e)))
                .collect::<Vec<_>>()
        })?;
    }

    let sector_given = mapping
        .column_for("sector")
        .is_some_and(|column| !row.get(column).trim().is_empty());

    Ok(RowDecision::Write(PlannedDocument {
        row: row.row_index,
        action,
        document,
        sector_given,
    }))
}
