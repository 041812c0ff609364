//! CSV template and document export.
//!
//! Both use the same header, so an exported file re-imports with the
//! auto-detected mapping.

use crate::error::StoreResult;
use crate::models::KnowledgeDocument;

pub const TEMPLATE_FILE_NAME: &str = "knowledge_base_template.csv";

pub const EXPORT_HEADERS: [&str; 11] = [
    "Document ID",
    "Title",
    "Description",
    "Sector",
    "Use Cases",
    "Source",
    "Date",
    "Status",
    "Tags",
    "Content",
    "Metadata",
];

/// Header-only CSV users fill in before importing.
pub fn template_csv() -> StoreResult<String> {
    export_csv(std::iter::empty::<&KnowledgeDocument>())
}

/// Write `documents` as CSV, one row each.
///
/// List fields are joined with `"; "`, metadata is written as compact JSON.
pub fn export_csv<'a, I>(documents: I) -> StoreResult<String>
where
    I: IntoIterator<Item = &'a KnowledgeDocument>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;

    for doc in documents {
        let metadata = if doc.metadata.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&doc.metadata)?
        };

        let use_cases = doc.use_cases.join("; ");
        let tags = doc.tags.join("; ");
        writer.write_record([
            doc.id.as_str(),
            doc.title.as_str(),
            doc.description.as_deref().unwrap_or_default(),
            doc.sector.as_str(),
            use_cases.as_str(),
            doc.source.as_deref().unwrap_or_default(),
            doc.date.as_deref().unwrap_or_default(),
            doc.status.as_deref().unwrap_or_default(),
            tags.as_str(),
            doc.content.as_deref().unwrap_or_default(),
            metadata.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
