//! Mapping Registry - Store and reuse column mappings
//!
//! Saves mappings to disk and automatically matches them to CSV layouts based on columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::mapping::ColumnMapping;

/// Subdirectory of the data dir where mappings are stored
const MAPPINGS_DIR: &str = "mappings";

/// Minimum column overlap for a stored mapping to be offered
const MIN_COMPATIBILITY: f64 = 0.5;

/// A stored mapping with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMapping {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Field key -> column mapping
    pub mapping: ColumnMapping,
    /// CSV columns this mapping was created for
    pub csv_columns: Vec<String>,
    pub created_at: String,
    pub last_used: Option<String>,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub use_count: u32,
}

/// Registry for managing saved column mappings
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    registry_dir: PathBuf,
    mappings: HashMap<String, StoredMapping>,
}

impl MappingRegistry {
    /// Open the registry under `<data_dir>/mappings`
    pub fn in_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::with_dir(data_dir.as_ref().join(MAPPINGS_DIR))
    }

    /// Create a registry with a custom directory, loading existing mappings
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            mappings: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(stored) = serde_json::from_str::<StoredMapping>(&content) {
                        self.mappings.insert(stored.id.clone(), stored);
                    }
                }
            }
        }
    }

    /// All stored mappings, most used first
    pub fn list(&self) -> Vec<&StoredMapping> {
        let mut all: Vec<_> = self.mappings.values().collect();
        all.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn get(&self, id: &str) -> Option<&StoredMapping> {
        self.mappings.get(id)
    }

    /// Find compatible mappings for given CSV columns.
    /// Returns mappings sorted by compatibility score times success rate.
    pub fn find_compatible(&self, csv_columns: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .mappings
            .values()
            .filter_map(|m| {
                let score = compatibility(&m.csv_columns, csv_columns);
                (score > MIN_COMPATIBILITY).then_some((m, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        compatible
    }

    /// Save a new mapping to the registry
    pub fn save(
        &mut self,
        mapping: ColumnMapping,
        name: &str,
        csv_columns: Vec<String>,
    ) -> RegistryResult<String> {
        if mapping.is_empty() {
            return Err(RegistryError::InvalidMapping(
                "mapping has no mapped fields".to_string(),
            ));
        }
        fs::create_dir_all(&self.registry_dir)?;

        let id = generate_id(name);
        let stored = StoredMapping {
            id: id.clone(),
            name: name.to_string(),
            mapping,
            csv_columns,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.mappings.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a mapping from a JSON file (field key -> column)
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let mapping = ColumnMapping::from_json(&content)
            .map_err(|e| RegistryError::InvalidMapping(e.to_string()))?;

        let mapping_name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });

        let csv_columns = mapping.source_columns();
        self.save(mapping, mapping_name, csv_columns)
    }

    /// Update statistics after using a mapping
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let stored = self
            .mappings
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Exponential moving average
        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    /// Delete a mapping from the registry
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.mappings.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredMapping) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }
}

/// Share of the stored columns present in the CSV (case-insensitive)
fn compatibility(stored: &[String], csv: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let csv_lower: Vec<String> = csv.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| csv_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}

/// Slug of the name, a millisecond timestamp and a short random suffix
fn generate_id(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "mapping".to_string() } else { slug };

    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        slug,
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_mapping() -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("title", "Name").unwrap();
        mapping.set_mapping("sector", "Mode").unwrap();
        mapping
    }

    #[test]
    fn test_compatibility_score() {
        let stored = columns(&["Ref", "Name", "Mode"]);
        let csv = columns(&["Ref", "Name", "Owner"]);
        assert!((compatibility(&stored, &csv) - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_case_insensitive_match() {
        let stored = columns(&["ref", "NAME"]);
        let csv = columns(&["REF", "name"]);
        assert!((compatibility(&stored, &csv) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_save_reload_and_find() {
        let dir = tempdir().unwrap();
        let id = {
            let mut registry = MappingRegistry::in_data_dir(dir.path());
            registry
                .save(sample_mapping(), "Rail register", columns(&["Name", "Mode"]))
                .unwrap()
        };
        assert!(id.starts_with("rail-register-"));

        let registry = MappingRegistry::in_data_dir(dir.path());
        let found = registry.find_compatible(&columns(&["name", "mode", "Notes"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.mapping, sample_mapping());
        assert!(registry.find_compatible(&columns(&["Other"])).is_empty());
    }

    #[test]
    fn test_ranking_uses_success_rate() {
        let dir = tempdir().unwrap();
        let mut registry = MappingRegistry::with_dir(dir.path());
        let weak = registry
            .save(sample_mapping(), "weak", columns(&["Name", "Mode"]))
            .unwrap();
        let strong = registry
            .save(sample_mapping(), "strong", columns(&["Name", "Mode"]))
            .unwrap();

        for _ in 0..3 {
            registry.update_stats(&weak, false).unwrap();
        }
        registry.update_stats(&strong, true).unwrap();

        let found = registry.find_compatible(&columns(&["Name", "Mode"]));
        assert_eq!(found[0].0.id, strong);
        assert_eq!(registry.get(&strong).unwrap().use_count, 1);
        assert_eq!(registry.list()[0].id, weak);
    }

    #[test]
    fn test_import_and_delete() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ports.json");
        fs::write(&file, r#"{"title": "Name", "sector": "Mode", "tags": "none"}"#).unwrap();

        let mut registry = MappingRegistry::with_dir(dir.path().join("reg"));
        let id = registry.import(&file, None).unwrap();
        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.name, "ports");
        assert_eq!(stored.csv_columns, columns(&["Mode", "Name"]));

        registry.delete(&id).unwrap();
        assert!(matches!(registry.delete(&id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_same_name_saves_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let mut registry = MappingRegistry::with_dir(dir.path());
        let first = registry
            .save(sample_mapping(), "ports", columns(&["Name", "Mode"]))
            .unwrap();
        let second = registry
            .save(sample_mapping(), "ports", columns(&["Name", "Mode"]))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.list().len(), 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let dir = tempdir().unwrap();
        let mut registry = MappingRegistry::with_dir(dir.path());
        let err = registry
            .save(ColumnMapping::new(), "empty", Vec::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidMapping(_)));
    }
}
