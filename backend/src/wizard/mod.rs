//! Import wizard: the six-stage import flow as an explicit state machine.
//!
//! ```text
//! upload ──▶ mapping ──▶ settings ──▶ preview ══▶ import ──▶ results
//!    ◀──────────  ◀──────────  ◀──────────
//! ```
//!
//! `next()` and `back()` move one stage at a time; the preview stage is left
//! only through [`ImportWizard::start_import`]. `results` is terminal until
//! [`ImportWizard::reset`]. Each stage carries its own payload, so data that
//! does not exist yet (a validation report before preview, an outcome before
//! results) cannot be read.

use serde::Serialize;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::error::{WizardError, WizardResult};
use crate::import::executor::{CancelToken, ImportExecutor, ImportOutcome};
use crate::import::index::DocumentIndex;
use crate::mapping::ColumnMapping;
use crate::models::{CsvColumn, CsvRow, ImportResult, ImportSettings, KNOWLEDGE_BASE_FIELDS};
use crate::parser::{parse_bytes, CsvInfo};
use crate::validation::ValidationReport;

/// Wizard stage, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Upload,
    Mapping,
    Settings,
    Preview,
    Import,
    Results,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Mapping => "mapping",
            Stage::Settings => "settings",
            Stage::Preview => "preview",
            Stage::Import => "import",
            Stage::Results => "results",
        }
    }
}

/// A parsed upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedFile {
    pub name: String,
    pub info: CsvInfo,
    pub columns: Vec<CsvColumn>,
    pub rows: Vec<CsvRow>,
}

/// Everything the user has entered so far.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub file: LoadedFile,
    pub mapping: ColumnMapping,
    pub settings: ImportSettings,
}

impl Draft {
    /// File columns annotated with the field each one feeds.
    pub fn mapped_columns(&self) -> Vec<CsvColumn> {
        self.mapping
            .annotate_columns(&self.file.columns, KNOWLEDGE_BASE_FIELDS)
    }
}

#[derive(Debug)]
pub enum WizardState {
    Upload { draft: Option<Draft> },
    Mapping(Draft),
    Settings(Draft),
    Preview { draft: Draft, report: ValidationReport },
    Import { file_name: String, total_rows: usize },
    Results { file_name: String, outcome: ImportOutcome },
}

impl Default for WizardState {
    fn default() -> Self {
        WizardState::Upload { draft: None }
    }
}

impl WizardState {
    pub fn stage(&self) -> Stage {
        match self {
            WizardState::Upload { .. } => Stage::Upload,
            WizardState::Mapping(_) => Stage::Mapping,
            WizardState::Settings(_) => Stage::Settings,
            WizardState::Preview { .. } => Stage::Preview,
            WizardState::Import { .. } => Stage::Import,
            WizardState::Results { .. } => Stage::Results,
        }
    }
}

type Transition = Result<WizardState, (WizardState, WizardError)>;

pub type ImportCompleteCallback = Box<dyn FnMut(&ImportResult) + Send>;
pub type OpenChangeCallback = Box<dyn FnMut(bool) + Send>;

/// Headless import wizard.
#[derive(Default)]
pub struct ImportWizard {
    state: WizardState,
    open: bool,
    on_import_complete: Option<ImportCompleteCallback>,
    on_open_change: Option<OpenChangeCallback>,
}

impl ImportWizard {
    pub fn new() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }

    /// Called with the result of every finished import run.
    pub fn on_import_complete(mut self, callback: impl FnMut(&ImportResult) + Send + 'static) -> Self {
        self.on_import_complete = Some(Box::new(callback));
        self
    }

    /// Called whenever the wizard is opened or closed.
    pub fn on_open_change(mut self, callback: impl FnMut(bool) + Send + 'static) -> Self {
        self.on_open_change = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            WizardState::Upload { draft } => draft.as_ref(),
            WizardState::Mapping(draft) | WizardState::Settings(draft) => Some(draft),
            WizardState::Preview { draft, .. } => Some(draft),
            WizardState::Import { .. } | WizardState::Results { .. } => None,
        }
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match &self.state {
            WizardState::Preview { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&ImportOutcome> {
        match &self.state {
            WizardState::Results { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn into_outcome(self) -> Option<ImportOutcome> {
        match self.state {
            WizardState::Results { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Upload
    // -------------------------------------------------------------------------

    /// Parse an uploaded file. Replaces any previously loaded file.
    ///
    /// On a parse error the previous upload (if any) is kept.
    pub fn load_file(&mut self, name: &str, bytes: &[u8]) -> WizardResult<()> {
        if self.stage() != Stage::Upload {
            return Err(self.invalid("load a file"));
        }

        let parsed = parse_bytes(bytes).map_err(|e| {
            log_error(format!("Cannot read {}: {}", name, e));
            e
        })?;

        log_info(format!(
            "📄 Loaded {} ({} rows, {} columns, {}, delimiter '{}')",
            name,
            parsed.info.row_count,
            parsed.csv.columns.len(),
            parsed.info.encoding,
            parsed.info.delimiter
        ));

        let draft = Draft {
            file: LoadedFile {
                name: name.to_string(),
                info: parsed.info,
                columns: parsed.csv.columns,
                rows: parsed.csv.rows,
            },
            mapping: ColumnMapping::new(),
            settings: ImportSettings::default(),
        };
        self.state = WizardState::Upload { draft: Some(draft) };
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mapping / settings edits
    // -------------------------------------------------------------------------

    pub fn set_mapping(&mut self, field: &str, column: &str) -> WizardResult<()> {
        let stage = self.stage();
        match &mut self.state {
            WizardState::Mapping(draft) => Ok(draft.mapping.set_mapping(field, column)?),
            _ => Err(invalid(stage, "edit the mapping")),
        }
    }

    /// Replace the mapping with one suggested from the file headers.
    pub fn auto_map(&mut self) -> WizardResult<&ColumnMapping> {
        let stage = self.stage();
        match &mut self.state {
            WizardState::Mapping(draft) => {
                let headers = draft.file.info.headers.clone();
                draft.mapping = ColumnMapping::auto_detect(&headers);
                Ok(&draft.mapping)
            }
            _ => Err(invalid(stage, "edit the mapping")),
        }
    }

    pub fn replace_mapping(&mut self, mapping: ColumnMapping) -> WizardResult<()> {
        let stage = self.stage();
        match &mut self.state {
            WizardState::Mapping(draft) => {
                draft.mapping = mapping;
                Ok(())
            }
            _ => Err(invalid(stage, "edit the mapping")),
        }
    }

    pub fn update_settings<F>(&mut self, edit: F) -> WizardResult<()>
    where
        F: FnOnce(&mut ImportSettings),
    {
        let stage = self.stage();
        match &mut self.state {
            WizardState::Settings(draft) => {
                edit(&mut draft.settings);
                Ok(())
            }
            _ => Err(invalid(stage, "edit the settings")),
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Move to the next stage.
    pub fn next(&mut self) -> WizardResult<Stage> {
        self.transition(Self::advance)
    }

    /// Return to the previous stage, keeping everything entered so far.
    pub fn back(&mut self) -> WizardResult<Stage> {
        self.transition(Self::retreat)
    }

    fn transition(&mut self, step: fn(WizardState) -> Transition) -> WizardResult<Stage> {
        match step(std::mem::take(&mut self.state)) {
            Ok(state) => {
                self.state = state;
                Ok(self.stage())
            }
            Err((state, err)) => {
                self.state = state;
                Err(err)
            }
        }
    }

    fn advance(state: WizardState) -> Transition {
        match state {
            WizardState::Upload { draft: Some(draft) } => Ok(WizardState::Mapping(draft)),
            WizardState::Upload { draft: None } => Err((
                WizardState::Upload { draft: None },
                WizardError::Blocked("no file loaded".to_string()),
            )),
            WizardState::Mapping(draft) => {
                for (column, fields) in draft.mapping.collisions() {
                    log_warning(format!(
                        "Column '{}' is mapped to several fields: {}",
                        column,
                        fields.join(", ")
                    ));
                }
                for (field, column) in draft.mapping.missing_columns(&draft.file.info.headers) {
                    log_warning(format!("Field '{}' is mapped to unknown column '{}'", field, column));
                }
                Ok(WizardState::Settings(draft))
            }
            WizardState::Settings(mut draft) => {
                if let Some(column) = draft.settings.id_column() {
                    if !draft.file.info.headers.iter().any(|h| h == column) {
                        let err = WizardError::Blocked(format!(
                            "document ID column '{}' is not in the file",
                            column
                        ));
                        return Err((WizardState::Settings(draft), err));
                    }
                }

                let report = if draft.settings.validate_data {
                    ValidationReport::run(
                        &draft.file.rows,
                        &draft.mapping,
                        &draft.settings,
                        KNOWLEDGE_BASE_FIELDS,
                    )
                } else {
                    ValidationReport::default()
                };
                report.annotate(&mut draft.file.rows);

                log_info(format!(
                    "🔍 Validation: {} error(s) in {} row(s), {} warning(s)",
                    report.error_count,
                    report.invalid_rows(),
                    report.warning_count
                ));
                for label in &report.unmapped_required {
                    log_warning(format!("Required field '{}' is not mapped", label));
                }

                Ok(WizardState::Preview { draft, report })
            }
            state => {
                let err = invalid(state.stage(), "continue");
                Err((state, err))
            }
        }
    }

    fn retreat(state: WizardState) -> Transition {
        match state {
            WizardState::Mapping(draft) => Ok(WizardState::Upload { draft: Some(draft) }),
            WizardState::Settings(draft) => Ok(WizardState::Mapping(draft)),
            WizardState::Preview { draft, .. } => Ok(WizardState::Settings(draft)),
            state => {
                let err = invalid(state.stage(), "go back");
                Err((state, err))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Import
    // -------------------------------------------------------------------------

    /// Whether the preview stage allows starting the import.
    pub fn can_start_import(&self) -> bool {
        match &self.state {
            WizardState::Preview { draft, report } => {
                report.is_valid() || draft.settings.skip_invalid_rows
            }
            _ => false,
        }
    }

    /// Run the import and move to the results stage.
    ///
    /// If the executor refuses to start, the wizard stays on the preview stage.
    pub async fn start_import(
        &mut self,
        executor: &ImportExecutor,
        index: &dyn DocumentIndex,
        cancel: &CancelToken,
    ) -> WizardResult<ImportResult> {
        if self.stage() != Stage::Preview {
            return Err(self.invalid("start the import"));
        }
        if !self.can_start_import() {
            let errors = self.report().map(|r| r.error_count).unwrap_or_default();
            return Err(WizardError::Blocked(format!(
                "{} validation error(s); fix them or enable skipping invalid rows",
                errors
            )));
        }

        let (draft, report) = match std::mem::take(&mut self.state) {
            WizardState::Preview { draft, report } => (draft, report),
            other => {
                self.state = other;
                return Err(self.invalid("start the import"));
            }
        };
        self.state = WizardState::Import {
            file_name: draft.file.name.clone(),
            total_rows: draft.file.rows.len(),
        };

        let outcome = match executor
            .execute(&draft.file.rows, &draft.mapping, &draft.settings, index, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                log_error(format!("Import did not start: {}", e));
                self.state = WizardState::Preview { draft, report };
                return Err(e.into());
            }
        };

        if let Some(callback) = self.on_import_complete.as_mut() {
            callback(&outcome.result);
        }
        log_success(format!("🏁 {}: {}", draft.file.name, outcome.result.summary()));

        let result = outcome.result.clone();
        self.state = WizardState::Results {
            file_name: draft.file.name,
            outcome,
        };
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Back to an empty upload stage.
    pub fn reset(&mut self) {
        self.state = WizardState::default();
    }

    /// Open or close the wizard. Closing discards the session.
    pub fn set_open(&mut self, open: bool) {
        if !open {
            self.reset();
        }
        if self.open != open {
            self.open = open;
            if let Some(callback) = self.on_open_change.as_mut() {
                callback(open);
            }
        }
    }

    fn invalid(&self, action: &'static str) -> WizardError {
        invalid(self.stage(), action)
    }
}

fn invalid(stage: Stage, action: &'static str) -> WizardError {
    WizardError::InvalidTransition {
        from: stage.as_str(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CsvError, ImportError};
    use crate::import::index::FnIndex;
    use crate::models::ConflictResolution;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const CSV: &[u8] = b"Title,Sector\nDocA,rail\nDocB,maritime";

    fn executor() -> ImportExecutor {
        ImportExecutor::new(Duration::ZERO)
    }

    fn no_documents() -> FnIndex<fn(&str) -> bool> {
        FnIndex(|_| false)
    }

    /// Wizard on the preview stage for `csv` with title/sector mapped.
    fn at_preview(csv: &[u8], edit: impl FnOnce(&mut ImportSettings)) -> ImportWizard {
        let mut wizard = ImportWizard::new();
        wizard.load_file("docs.csv", csv).unwrap();
        wizard.next().unwrap();
        wizard.set_mapping("title", "Title").unwrap();
        wizard.set_mapping("sector", "Sector").unwrap();
        wizard.next().unwrap();
        wizard.update_settings(edit).unwrap();
        assert_eq!(wizard.next().unwrap(), Stage::Preview);
        wizard
    }

    #[test]
    fn test_next_requires_file() {
        let mut wizard = ImportWizard::new();
        assert!(matches!(wizard.next(), Err(WizardError::Blocked(_))));
        assert_eq!(wizard.stage(), Stage::Upload);
    }

    #[test]
    fn test_parse_error_is_visible() {
        let mut wizard = ImportWizard::new();
        let err = wizard.load_file("empty.csv", b"\n\n").unwrap_err();
        assert!(matches!(err, WizardError::Parse(CsvError::EmptyFile)));
        assert!(wizard.draft().is_none());
    }

    #[test]
    fn test_back_keeps_entered_data() {
        let mut wizard = ImportWizard::new();
        wizard.load_file("docs.csv", CSV).unwrap();
        wizard.next().unwrap();
        wizard.set_mapping("title", "Title").unwrap();
        wizard.next().unwrap();

        assert_eq!(wizard.back().unwrap(), Stage::Mapping);
        assert_eq!(wizard.back().unwrap(), Stage::Upload);
        let draft = wizard.draft().unwrap();
        assert_eq!(draft.mapping.column_for("title"), Some("Title"));
        assert_eq!(draft.file.rows.len(), 2);

        let err = wizard.back().unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { from: "upload", .. }));
    }

    #[test]
    fn test_edits_only_in_their_stage() {
        let mut wizard = ImportWizard::new();
        wizard.load_file("docs.csv", CSV).unwrap();
        assert!(wizard.set_mapping("title", "Title").is_err());
        assert!(wizard.update_settings(|s| s.batch_size = 5).is_err());

        wizard.next().unwrap();
        assert!(wizard.load_file("other.csv", CSV).is_err());
        assert!(matches!(
            wizard.set_mapping("author", "Title"),
            Err(WizardError::Mapping(_))
        ));
        assert_eq!(wizard.auto_map().unwrap().column_for("sector"), Some("Sector"));
    }

    #[test]
    fn test_preview_annotates_rows() {
        let wizard = at_preview(b"Title,Sector\nDocA,rail\n,rail", |s| {
            s.skip_invalid_rows = false;
        });

        let report = wizard.report().unwrap();
        assert_eq!(report.error_count, 1);
        assert!(!wizard.can_start_import());

        let rows = &wizard.draft().unwrap().file.rows;
        assert!(rows[0].errors.is_empty());
        assert!(rows[1].errors[0].contains("Title"));
    }

    #[test]
    fn test_preview_cannot_be_skipped_with_next() {
        let mut wizard = at_preview(CSV, |_| {});
        let err = wizard.next().unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { from: "preview", .. }));
        assert_eq!(wizard.stage(), Stage::Preview);
    }

    #[test]
    fn test_missing_id_column_blocks_preview() {
        let mut wizard = ImportWizard::new();
        wizard.load_file("docs.csv", CSV).unwrap();
        wizard.next().unwrap();
        wizard.next().unwrap();
        wizard
            .update_settings(|s| s.document_id_column = Some("Ref".into()))
            .unwrap();

        assert!(matches!(wizard.next(), Err(WizardError::Blocked(_))));
        assert_eq!(wizard.stage(), Stage::Settings);
    }

    #[test]
    fn test_validation_disabled() {
        let wizard = at_preview(b"Title,Sector\n,rail", |s| s.validate_data = false);
        assert!(wizard.report().unwrap().is_valid());
        assert!(wizard.can_start_import());
    }

    #[tokio::test]
    async fn test_blocked_import() {
        let mut wizard = at_preview(b"Title,Sector\n,rail", |s| s.skip_invalid_rows = false);
        let err = wizard
            .start_import(&executor(), &no_documents(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::Blocked(_)));
        assert_eq!(wizard.stage(), Stage::Preview);
    }

    #[tokio::test]
    async fn test_end_to_end_new_documents() {
        let completed = Arc::new(Mutex::new(None));
        let sink = completed.clone();

        let mut wizard = at_preview(CSV, |s| {
            s.conflict_resolution = ConflictResolution::New;
        });
        wizard = std::mem::take(&mut wizard).on_import_complete(move |r| {
            *sink.lock().unwrap() = Some(r.clone());
        });

        let result = wizard
            .start_import(&executor(), &no_documents(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_rows, 2);
        assert_eq!(result.new_records, 2);
        assert!(result.errors.is_empty());
        assert_eq!(completed.lock().unwrap().as_ref(), Some(&result));
        assert_eq!(wizard.stage(), Stage::Results);
        assert_eq!(wizard.outcome().unwrap().documents.len(), 2);
    }

    #[tokio::test]
    async fn test_results_terminal_until_reset() {
        let mut wizard = at_preview(CSV, |_| {});
        wizard
            .start_import(&executor(), &no_documents(), &CancelToken::new())
            .await
            .unwrap();

        assert!(wizard.back().is_err());
        assert!(wizard.next().is_err());
        assert_eq!(wizard.stage(), Stage::Results);

        wizard.reset();
        assert_eq!(wizard.stage(), Stage::Upload);
        assert!(wizard.draft().is_none());
    }

    #[tokio::test]
    async fn test_executor_refusal_restores_preview() {
        let executor = executor();
        let _held = executor.lock().try_acquire().unwrap();
        let mut wizard = at_preview(CSV, |_| {});

        let err = wizard
            .start_import(&executor, &no_documents(), &CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WizardError::Import(ImportError::AlreadyRunning)));
        assert_eq!(wizard.stage(), Stage::Preview);
        assert!(wizard.report().is_some());
    }

    #[test]
    fn test_close_resets_and_notifies() {
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        let mut wizard = ImportWizard::new().on_open_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        wizard.load_file("docs.csv", CSV).unwrap();

        wizard.set_open(false);
        assert!(!wizard.is_open());
        assert!(wizard.draft().is_none());

        wizard.set_open(true);
        wizard.set_open(true);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }
}
