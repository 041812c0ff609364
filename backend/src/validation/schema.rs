//! JSON Schema validation for knowledge-base documents.
//!
//! The document schema is embedded at compile time from
//! `schemas/knowledge-document.json` (draft 7).

use once_cell::sync::Lazy;
use serde_json::Value;

static DOCUMENT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/knowledge-document.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use kbimport::validation::schema::validate_against;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["title"],
///     "properties": { "title": { "type": "string" } }
/// });
///
/// assert!(validate_against(&schema, &json!({ "title": "HS2" })).is_ok());
/// assert!(validate_against(&schema, &json!({ "pages": 42 })).is_err());
/// ```
pub fn validate_against(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a serialized document against the knowledge-document schema.
pub fn validate_document(document: &Value) -> Result<(), Vec<String>> {
    validate_against(&DOCUMENT_SCHEMA, document)
}

/// Quick check against the knowledge-document schema.
pub fn is_valid_document(document: &Value) -> bool {
    jsonschema::draft7::is_valid(&DOCUMENT_SCHEMA, document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_document() {
        let doc = json!({
            "id": "doc-1",
            "title": "Rail Network Enhancements Pipeline",
            "sector": "rail",
            "tags": ["capacity", "electrification"],
            "date": "2024-03-01"
        });
        assert!(is_valid_document(&doc));
    }

    #[test]
    fn test_empty_title_rejected() {
        let doc = json!({ "id": "doc-1", "title": "", "sector": "rail" });
        let errors = validate_document(&doc).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_unknown_sector_rejected() {
        let doc = json!({ "id": "doc-1", "title": "Airports", "sector": "aviation" });
        assert!(!is_valid_document(&doc));
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let doc = json!({
            "id": "doc-1",
            "title": "Ports",
            "sector": "maritime",
            "tags": ["ports", "ports"]
        });
        assert!(!is_valid_document(&doc));
    }
}
