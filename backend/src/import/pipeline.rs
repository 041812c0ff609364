//! End-to-end import of an uploaded CSV file.
//!
//! Drives an [`ImportWizard`] through every stage without user interaction:
//!
//! 1. Parse the upload
//! 2. Resolve the mapping: explicit, else best saved mapping, else auto-detect
//! 3. Validate (preview stage)
//! 4. Execute against the document store
//! 5. Back up and apply the planned documents (unless dry-run)
//! 6. Save the mapping or update its stats in the registry

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::executor::{CancelToken, ImportExecutor};
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::cache::MappingRegistry;
use crate::error::{PipelineError, PipelineResult, WizardError};
use crate::mapping::ColumnMapping;
use crate::models::{CsvColumn, CsvRow, ImportResult, ImportSettings, PlannedDocument};
use crate::parser::CsvInfo;
use crate::store::{ApplySummary, DocumentStore};
use crate::validation::ValidationReport;
use crate::wizard::ImportWizard;

/// What to import and how.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file_name: String,
    /// Explicit mapping; when absent the registry and auto-detection are used.
    pub mapping: Option<ColumnMapping>,
    pub settings: ImportSettings,
    /// Look for a compatible saved mapping before auto-detecting.
    pub use_saved_mappings: bool,
    /// Save a newly built mapping to the registry after a run.
    pub save_mapping: bool,
    /// Plan only: nothing is written to the store or the registry.
    pub dry_run: bool,
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            file_name: "upload.csv".to_string(),
            mapping: None,
            settings: ImportSettings::default(),
            use_saved_mappings: true,
            save_mapping: true,
            dry_run: false,
        }
    }
}

/// Where the mapping of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MappingSource {
    Explicit,
    Saved,
    AutoDetected,
}

/// Validation counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub error_count: usize,
    pub warning_count: usize,
    pub invalid_rows: usize,
    pub unmapped_required: Vec<String>,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        Self {
            error_count: report.error_count,
            warning_count: report.warning_count,
            invalid_rows: report.invalid_rows(),
            unmapped_required: report.unmapped_required.clone(),
        }
    }
}

/// Output of [`preview`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOutput {
    pub file_name: String,
    pub csv_info: CsvInfo,
    pub columns: Vec<CsvColumn>,
    pub mapping: ColumnMapping,
    pub mapping_source: MappingSource,
    pub mapping_id: Option<String>,
    pub report: ValidationReport,
    /// All rows, annotated with their errors and warnings.
    pub rows: Vec<CsvRow>,
    pub can_import: bool,
}

/// Output of [`run_import`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub file_name: String,
    pub csv_info: CsvInfo,
    pub columns: Vec<CsvColumn>,
    pub mapping: ColumnMapping,
    pub mapping_source: MappingSource,
    pub mapping_id: Option<String>,
    pub validation: ValidationSummary,
    pub result: ImportResult,
    pub documents: Vec<PlannedDocument>,
    /// Store writes, absent on dry runs.
    pub applied: Option<ApplySummary>,
    pub backup_path: Option<PathBuf>,
}

/// Resolved mapping with its origin.
struct ResolvedMapping {
    mapping: ColumnMapping,
    source: MappingSource,
    id: Option<String>,
}

fn resolve_mapping(
    headers: &[String],
    explicit: Option<ColumnMapping>,
    registry: &MappingRegistry,
    use_saved: bool,
) -> ResolvedMapping {
    if let Some(mapping) = explicit {
        log_info("🗺️  Using the provided mapping");
        return ResolvedMapping {
            mapping,
            source: MappingSource::Explicit,
            id: None,
        };
    }

    if use_saved {
        if let Some((stored, score)) = registry.find_compatible(headers).into_iter().next() {
            log_info(format!(
                "🗺️  Using saved mapping '{}' ({:.0}% column match, {:.0}% success rate)",
                stored.name,
                score * 100.0,
                stored.success_rate * 100.0
            ));
            return ResolvedMapping {
                mapping: stored.mapping.clone(),
                source: MappingSource::Saved,
                id: Some(stored.id.clone()),
            };
        }
    }

    let mapping = ColumnMapping::auto_detect(headers);
    log_info(format!(
        "🗺️  Auto-detected mapping for {} field(s)",
        mapping.mapped().count()
    ));
    for (field, column) in mapping.mapped() {
        log_info_indent(format!("{} ← {}", field, column), 1);
    }
    ResolvedMapping {
        mapping,
        source: MappingSource::AutoDetected,
        id: None,
    }
}

/// Walk a fresh wizard up to the preview stage.
fn prepare(
    wizard: &mut ImportWizard,
    bytes: &[u8],
    file_name: &str,
    explicit: Option<ColumnMapping>,
    settings: ImportSettings,
    registry: &MappingRegistry,
    use_saved: bool,
) -> PipelineResult<ResolvedMapping> {
    wizard.load_file(file_name, bytes)?;
    wizard.next()?;

    let headers = wizard
        .draft()
        .map(|d| d.file.info.headers.clone())
        .unwrap_or_default();
    let resolved = resolve_mapping(&headers, explicit, registry, use_saved);
    wizard.replace_mapping(resolved.mapping.clone())?;
    wizard.next()?;

    wizard.update_settings(|s| *s = settings)?;
    wizard.next()?;

    Ok(resolved)
}

/// Parse, map and validate without importing.
pub fn preview(
    bytes: &[u8],
    file_name: &str,
    mapping: Option<ColumnMapping>,
    settings: ImportSettings,
    registry: &MappingRegistry,
) -> PipelineResult<PreviewOutput> {
    let mut wizard = ImportWizard::new();
    let resolved = prepare(&mut wizard, bytes, file_name, mapping, settings, registry, true)?;

    let can_import = wizard.can_start_import();
    let (draft, report) = match (wizard.draft(), wizard.report()) {
        (Some(draft), Some(report)) => (draft, report),
        _ => return Err(wizard_not_at("preview", "read the preview").into()),
    };

    Ok(PreviewOutput {
        file_name: file_name.to_string(),
        csv_info: draft.file.info.clone(),
        columns: draft.mapped_columns(),
        mapping: resolved.mapping,
        mapping_source: resolved.source,
        mapping_id: resolved.id,
        report: report.clone(),
        rows: draft.file.rows.clone(),
        can_import,
    })
}

/// Import an uploaded file into `store`.
pub async fn run_import(
    bytes: &[u8],
    request: ImportRequest,
    store: &mut DocumentStore,
    registry: &mut MappingRegistry,
    executor: &ImportExecutor,
    cancel: &CancelToken,
) -> PipelineResult<PipelineOutput> {
    let ImportRequest {
        file_name,
        mapping,
        settings,
        use_saved_mappings,
        save_mapping,
        dry_run,
    } = request;

    log_info(format!(
        "📥 Import of {} ({} bytes){}",
        file_name,
        bytes.len(),
        if dry_run { " [dry run]" } else { "" }
    ));

    let mut wizard = ImportWizard::new();
    let resolved = prepare(
        &mut wizard,
        bytes,
        &file_name,
        mapping,
        settings.clone(),
        registry,
        use_saved_mappings,
    )?;

    let (csv_info, columns, validation) = match (wizard.draft(), wizard.report()) {
        (Some(draft), Some(report)) => (
            draft.file.info.clone(),
            draft.mapped_columns(),
            ValidationSummary::from(report),
        ),
        _ => return Err(wizard_not_at("preview", "read the preview").into()),
    };

    if !wizard.can_start_import() {
        log_warning(format!(
            "Import blocked: {} validation error(s) and invalid rows are not skipped",
            validation.error_count
        ));
        return Err(PipelineError::ValidationFailed {
            errors: validation.error_count,
        });
    }

    let result = wizard.start_import(executor, &*store, cancel).await?;
    let documents = wizard
        .into_outcome()
        .map(|o| o.documents)
        .ok_or_else(|| wizard_not_at("results", "read the results"))?;

    let mut backup_path = None;
    let mut applied = None;
    let mut mapping_id = resolved.id.clone();

    if dry_run {
        log_info(format!("Dry run: {} document(s) not written", documents.len()));
    } else {
        if settings.create_backup && !store.is_empty() && !documents.is_empty() {
            let path = store.backup()?;
            log_info(format!("💾 Backup of {} document(s) in {}", store.len(), path.display()));
            backup_path = Some(path);
        }

        let summary = store.apply(&documents)?;
        log_success(format!(
            "Stored {} document(s): {} created, {} overwritten, {} merged",
            documents.len(),
            summary.created,
            summary.overwritten,
            summary.merged
        ));
        applied = Some(summary);

        match (&resolved.id, resolved.source) {
            (Some(id), MappingSource::Saved) => {
                registry.update_stats(id, result.error_count() == 0)?;
            }
            _ if save_mapping && !resolved.mapping.is_empty() => {
                let id = registry.save(
                    resolved.mapping.clone(),
                    &mapping_name(&file_name),
                    csv_info.headers.clone(),
                )?;
                log_info(format!("Mapping saved as {}", id));
                mapping_id = Some(id);
            }
            _ => {}
        }
    }

    Ok(PipelineOutput {
        file_name,
        csv_info,
        columns,
        mapping: resolved.mapping,
        mapping_source: resolved.source,
        mapping_id,
        validation,
        result,
        documents,
        applied,
        backup_path,
    })
}

fn mapping_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload")
        .to_string()
}

fn wizard_not_at(from: &'static str, action: &'static str) -> WizardError {
    WizardError::InvalidTransition { from, action }
}
