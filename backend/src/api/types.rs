//! REST API types.
//!
//! Wire structs are camelCase. Successful responses carry `"status": "ok"` or
//! `"warning"`, failures go through [`error_response`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::import::pipeline::{PipelineOutput, PreviewOutput};
use crate::mapping::ColumnMapping;
use crate::models::{CsvColumn, CsvRow, ImportResult, ImportSettings, KnowledgeDocument};
use crate::parser::CsvInfo;
use crate::store::ApplySummary;
use crate::validation::ValidationReport;

/// Rows echoed back by the preview endpoint
pub const PREVIEW_ROWS: usize = 20;

/// Optional JSON parts accepted next to the uploaded file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub mapping: Option<ColumnMapping>,
    pub settings: Option<ImportSettings>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Response of `POST /api/preview`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub job_id: String,
    pub status: String,
    pub file_name: String,
    pub csv_info: CsvInfo,
    pub columns: Vec<CsvColumn>,
    pub mapping: ColumnMapping,
    pub mapping_id: Option<String>,
    pub validation: ValidationReport,
    /// First rows of the file, annotated
    pub rows: Vec<CsvRow>,
    pub can_import: bool,
}

impl From<PreviewOutput> for PreviewResponse {
    fn from(output: PreviewOutput) -> Self {
        let mut rows = output.rows;
        rows.truncate(PREVIEW_ROWS);

        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status(output.report.is_valid()),
            file_name: output.file_name,
            csv_info: output.csv_info,
            columns: output.columns,
            mapping: output.mapping,
            mapping_id: output.mapping_id,
            validation: output.report,
            rows,
            can_import: output.can_import,
        }
    }
}

/// Response of `POST /api/import`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub job_id: String,
    pub status: String,
    pub file_name: String,
    pub result: ImportResult,
    pub mapping: ColumnMapping,
    pub mapping_id: Option<String>,
    pub applied: Option<ApplySummary>,
    pub backup: Option<String>,
    pub documents: Vec<KnowledgeDocument>,
}

impl From<PipelineOutput> for ImportResponse {
    fn from(output: PipelineOutput) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status(output.result.error_count() == 0),
            file_name: output.file_name,
            mapping: output.mapping,
            mapping_id: output.mapping_id,
            applied: output.applied,
            backup: output.backup_path.map(|p| p.display().to_string()),
            documents: output.documents.into_iter().map(|d| d.document).collect(),
            result: output.result,
        }
    }
}

fn status(clean: bool) -> String {
    if clean { "ok" } else { "warning" }.to_string()
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}
