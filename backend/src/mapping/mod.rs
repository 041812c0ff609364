//! Field mapping: knowledge-base field key → source CSV column.
//!
//! A field can be mapped to a column, explicitly unmapped (`"none"`), or never
//! set at all. Mapping correctness (blank required values, type mismatches) is
//! checked later by the validator, not here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::MappingError;
use crate::models::{knowledge_base_field, CsvColumn, KnowledgeBaseField, KNOWLEDGE_BASE_FIELDS};

/// Sentinel value for an explicitly unmapped field.
pub const UNMAPPED: &str = "none";

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid header normalization regex"));

/// Header spellings recognized for each field, besides its key and label.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("id", &["docid", "documentid", "reference", "ref", "identifier"]),
    ("title", &["name", "documenttitle", "documentname"]),
    ("description", &["summary", "abstract"]),
    ("sector", &["domain", "mode", "transportmode"]),
    ("useCases", &["usecase", "applications"]),
    ("source", &["publisher", "origin", "author"]),
    ("date", &["published", "publicationdate", "publisheddate", "issued"]),
    ("status", &["state"]),
    ("tags", &["keywords", "labels"]),
    ("content", &["body", "text", "fulltext"]),
    ("metadata", &["meta", "extra"]),
];

/// Where a field points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MappingTarget {
    Column(String),
    /// Explicitly set to "none".
    Unmapped,
}

impl From<String> for MappingTarget {
    fn from(value: String) -> Self {
        if value == UNMAPPED || value.trim().is_empty() {
            MappingTarget::Unmapped
        } else {
            MappingTarget::Column(value)
        }
    }
}

impl From<MappingTarget> for String {
    fn from(target: MappingTarget) -> Self {
        match target {
            MappingTarget::Column(c) => c,
            MappingTarget::Unmapped => UNMAPPED.to_string(),
        }
    }
}

/// Field key → column mapping, edited by the user during the mapping stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    fields: BTreeMap<String, MappingTarget>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `field` to `column`, or unmap it with `"none"`.
    ///
    /// Re-mapping a field replaces its previous column.
    pub fn set_mapping(&mut self, field: &str, column: &str) -> Result<(), MappingError> {
        if knowledge_base_field(field).is_none() {
            return Err(MappingError::UnknownField(field.to_string()));
        }
        self.fields
            .insert(field.to_string(), MappingTarget::from(column.to_string()));
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&MappingTarget> {
        self.fields.get(field)
    }

    /// Column a field reads from, if mapped to one.
    pub fn column_for(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(MappingTarget::Column(c)) => Some(c.as_str()),
            _ => None,
        }
    }

    /// `(field, column)` pairs for every field mapped to a column.
    pub fn mapped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(f, t)| match t {
            MappingTarget::Column(c) => Some((f.as_str(), c.as_str())),
            MappingTarget::Unmapped => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.mapped().next().is_none()
    }

    /// Distinct source columns referenced by the mapping.
    pub fn source_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.mapped()
            .filter(|(_, c)| seen.insert(*c))
            .map(|(_, c)| c.to_string())
            .collect()
    }

    /// Columns targeted by more than one field, with those fields.
    pub fn collisions(&self) -> Vec<(String, Vec<String>)> {
        let mut by_column: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (field, column) in self.mapped() {
            by_column.entry(column).or_default().push(field.to_string());
        }
        by_column
            .into_iter()
            .filter(|(_, fields)| fields.len() > 1)
            .map(|(c, fields)| (c.to_string(), fields))
            .collect()
    }

    /// Fields mapped to columns that the file does not have.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<(String, String)> {
        self.mapped()
            .filter(|(_, c)| !headers.iter().any(|h| h == c))
            .map(|(f, c)| (f.to_string(), c.to_string()))
            .collect()
    }

    /// Copy of `columns` with `mapped`/`required` filled from this mapping.
    pub fn annotate_columns(
        &self,
        columns: &[CsvColumn],
        fields: &[KnowledgeBaseField],
    ) -> Vec<CsvColumn> {
        columns
            .iter()
            .map(|col| {
                let mut col = col.clone();
                let field = fields
                    .iter()
                    .find(|f| self.column_for(f.key) == Some(col.name.as_str()));
                col.mapped = field.map(|f| f.key.to_string());
                col.required = field.is_some_and(|f| f.required);
                col
            })
            .collect()
    }

    /// Suggest a mapping by matching headers against field keys, labels and
    /// common aliases. Each column is used at most once.
    pub fn auto_detect(headers: &[String]) -> Self {
        let mut mapping = Self::new();
        let mut used: HashSet<&str> = HashSet::new();

        for field in KNOWLEDGE_BASE_FIELDS {
            let candidates = field_spellings(field);
            let hit = headers
                .iter()
                .filter(|h| !used.contains(h.as_str()))
                .find(|h| candidates.contains(&normalize_header(h)));

            if let Some(header) = hit {
                used.insert(header.as_str());
                mapping
                    .fields
                    .insert(field.key.to_string(), MappingTarget::Column(header.clone()));
            }
        }

        mapping
    }

    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        let mapping: Self = serde_json::from_str(json)?;
        if let Some(unknown) = mapping
            .fields
            .keys()
            .find(|k| knowledge_base_field(k).is_none())
        {
            return Err(MappingError::UnknownField(unknown.clone()));
        }
        Ok(mapping)
    }

    pub fn to_json(&self) -> Result<String, MappingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Lowercase a header and drop everything but letters and digits.
pub fn normalize_header(header: &str) -> String {
    NON_ALNUM
        .replace_all(&header.trim().to_lowercase(), "")
        .into_owned()
}

fn field_spellings(field: &KnowledgeBaseField) -> Vec<String> {
    let mut spellings = vec![normalize_header(field.key), normalize_header(field.label)];
    if let Some((_, aliases)) = FIELD_ALIASES.iter().find(|(k, _)| *k == field.key) {
        spellings.extend(aliases.iter().map(|a| a.to_string()));
    }
    spellings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_and_unset() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("sector", "none").unwrap();

        assert_eq!(mapping.column_for("title"), Some("Title"));
        assert_eq!(mapping.get("sector"), Some(&MappingTarget::Unmapped));
        // never set is distinct from explicitly unmapped
        assert_eq!(mapping.get("tags"), None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut mapping = ColumnMapping::new();
        let err = mapping.set_mapping("iswc", "ISWC").unwrap_err();
        assert!(matches!(err, MappingError::UnknownField(f) if f == "iswc"));
    }

    #[test]
    fn test_remap_replaces_previous() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Name").unwrap();
        mapping.set_mapping("title", "Title").unwrap();
        assert_eq!(mapping.column_for("title"), Some("Title"));
        assert_eq!(mapping.mapped().count(), 1);
    }

    #[test]
    fn test_collisions_reported() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Name").unwrap();
        mapping.set_mapping("description", "Name").unwrap();
        mapping.set_mapping("sector", "Sector").unwrap();

        let collisions = mapping.collisions();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].0, "Name");
        assert_eq!(collisions[0].1.len(), 2);
        assert_eq!(mapping.source_columns(), vec!["Name", "Sector"]);
    }

    #[test]
    fn test_auto_detect_template_headers() {
        let mapping = ColumnMapping::auto_detect(&headers(&[
            "Document ID",
            "Title",
            "Sector",
            "Use Cases",
            "Keywords",
            "Unrelated",
        ]));

        assert_eq!(mapping.column_for("id"), Some("Document ID"));
        assert_eq!(mapping.column_for("title"), Some("Title"));
        assert_eq!(mapping.column_for("useCases"), Some("Use Cases"));
        assert_eq!(mapping.column_for("tags"), Some("Keywords"));
        assert_eq!(mapping.column_for("content"), None);
        assert!(mapping.collisions().is_empty());
    }

    #[test]
    fn test_json_roundtrip_keeps_sentinel() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("tags", "none").unwrap();

        let json = mapping.to_json().unwrap();
        assert!(json.contains("\"none\""));
        assert_eq!(ColumnMapping::from_json(&json).unwrap(), mapping);
        assert!(ColumnMapping::from_json(r#"{"iswc":"X"}"#).is_err());
    }

    #[test]
    fn test_annotate_columns() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Name").unwrap();

        let columns = vec![
            CsvColumn::new("Name", ColumnType::String),
            CsvColumn::new("Other", ColumnType::Number),
        ];
        let annotated = mapping.annotate_columns(&columns, KNOWLEDGE_BASE_FIELDS);

        assert_eq!(annotated[0].mapped.as_deref(), Some("title"));
        assert!(annotated[0].required);
        assert_eq!(annotated[1].mapped, None);
        assert!(columns[0].mapped.is_none());
    }

    #[test]
    fn test_missing_columns() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Title").unwrap();
        mapping.set_mapping("sector", "Domain").unwrap();

        let missing = mapping.missing_columns(&headers(&["Title"]));
        assert_eq!(missing, vec![("sector".to_string(), "Domain".to_string())]);
    }
}
