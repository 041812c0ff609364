//! Document Store - the on-disk knowledge base
//!
//! One JSON file per document under `<data_dir>/documents`. Backups are full
//! snapshots copied to `<data_dir>/backups/<timestamp>/` before an import
//! writes anything.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::logs::log_warning;
use crate::error::{StoreError, StoreResult};
use crate::import::index::DocumentIndex;
use crate::models::{ImportAction, KnowledgeDocument, PlannedDocument};

const DOCUMENTS_DIR: &str = "documents";
const BACKUPS_DIR: &str = "backups";

/// Counts of what [`DocumentStore::apply`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    pub created: usize,
    pub overwritten: usize,
    pub merged: usize,
}

/// Knowledge-base documents persisted as JSON files.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    data_dir: PathBuf,
    documents: BTreeMap<String, KnowledgeDocument>,
}

impl DocumentStore {
    /// Open the store under `data_dir`, loading existing documents.
    pub fn with_dir(data_dir: impl AsRef<Path>) -> Self {
        let mut store = Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            documents: BTreeMap::new(),
        };
        store.load_all();
        store
    }

    fn documents_dir(&self) -> PathBuf {
        self.data_dir.join(DOCUMENTS_DIR)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.documents_dir().join(format!("{}.json", file_stem(id)))
    }

    fn load_all(&mut self) {
        let entries = match fs::read_dir(self.documents_dir()) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|c| Ok(serde_json::from_str::<KnowledgeDocument>(&c)?));
            match loaded {
                Ok(doc) => {
                    self.documents.insert(doc.id.clone(), doc);
                }
                Err(e) => log_warning(format!("Ignoring {}: {}", path.display(), e)),
            }
        }
    }

    /// All documents, ordered by ID.
    pub fn list(&self) -> Vec<&KnowledgeDocument> {
        self.documents.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeDocument> {
        self.documents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Write a document, replacing any previous version.
    pub fn put(&mut self, document: KnowledgeDocument) -> StoreResult<()> {
        fs::create_dir_all(self.documents_dir())?;
        let content = serde_json::to_string_pretty(&document)?;
        fs::write(self.document_path(&document.id), content)?;
        self.documents.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        if self.documents.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(self.document_path(id))?;
        Ok(())
    }

    /// Apply the documents planned by an import run.
    pub fn apply(&mut self, planned: &[PlannedDocument]) -> StoreResult<ApplySummary> {
        let mut summary = ApplySummary::default();

        for item in planned {
            let document = match (item.action, self.documents.get(&item.document.id)) {
                (ImportAction::Merge, Some(existing)) => {
                    summary.merged += 1;
                    merge_documents(existing, item)
                }
                (ImportAction::Create, _) => {
                    summary.created += 1;
                    item.document.clone()
                }
                (ImportAction::Overwrite | ImportAction::Merge, _) => {
                    summary.overwritten += 1;
                    item.document.clone()
                }
            };
            self.put(document)?;
        }

        Ok(summary)
    }

    /// Snapshot every document into a timestamped backup directory.
    pub fn backup(&self) -> StoreResult<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let target = self.data_dir.join(BACKUPS_DIR).join(stamp);
        fs::create_dir_all(&target)?;

        for document in self.documents.values() {
            let path = target.join(format!("{}.json", file_stem(&document.id)));
            fs::write(path, serde_json::to_string_pretty(document)?)?;
        }

        Ok(target)
    }
}

impl DocumentIndex for DocumentStore {
    fn existing_ids(&self, ids: &[&str]) -> HashSet<String> {
        ids.iter()
            .filter(|id| self.contains(id))
            .map(|id| id.to_string())
            .collect()
    }
}

/// Merge `incoming` into `existing`.
///
/// Non-empty incoming scalars win, list fields are unioned and metadata
/// objects are merged key by key. The sector is only replaced when the row
/// gave one.
pub fn merge_documents(existing: &KnowledgeDocument, planned: &PlannedDocument) -> KnowledgeDocument {
    let incoming = &planned.document;
    let mut merged = existing.clone();

    if !incoming.title.trim().is_empty() {
        merged.title = incoming.title.clone();
    }
    if planned.sector_given {
        merged.sector = incoming.sector;
    }
    merge_option(&mut merged.description, &incoming.description);
    merge_option(&mut merged.source, &incoming.source);
    merge_option(&mut merged.date, &incoming.date);
    merge_option(&mut merged.status, &incoming.status);
    merge_option(&mut merged.content, &incoming.content);
    union_into(&mut merged.tags, &incoming.tags);
    union_into(&mut merged.use_cases, &incoming.use_cases);

    for (key, value) in &incoming.metadata {
        match (merged.metadata.get_mut(key), value) {
            (Some(Value::Object(current)), Value::Object(update)) => {
                for (k, v) in update {
                    current.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.metadata.insert(key.clone(), value.clone());
            }
        }
    }

    merged
}

fn merge_option(target: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        *target = Some(value.clone());
    }
}

fn union_into(target: &mut Vec<String>, incoming: &[String]) {
    for item in incoming {
        if !target.iter().any(|t| t.eq_ignore_ascii_case(item)) {
            target.push(item.clone());
        }
    }
}

/// File-name-safe, reversible encoding of a document ID.
fn file_stem(id: &str) -> String {
    id.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
