//! Existence lookup used for conflict detection.

use std::collections::HashSet;

/// Keyed lookup answering "which of these document IDs already exist?".
///
/// Called once per batch with the non-blank IDs of that batch.
pub trait DocumentIndex: Send + Sync {
    fn existing_ids(&self, ids: &[&str]) -> HashSet<String>;
}

impl DocumentIndex for HashSet<String> {
    fn existing_ids(&self, ids: &[&str]) -> HashSet<String> {
        ids.iter()
            .filter(|id| self.contains(**id))
            .map(|id| id.to_string())
            .collect()
    }
}

/// Index backed by a predicate, e.g. a remote lookup or a test stub.
pub struct FnIndex<F>(pub F);

impl<F> DocumentIndex for FnIndex<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn existing_ids(&self, ids: &[&str]) -> HashSet<String> {
        ids.iter()
            .filter(|id| (self.0)(**id))
            .map(|id| id.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashset_index() {
        let index: HashSet<String> = ["D1".to_string(), "D3".to_string()].into_iter().collect();
        let found = index.existing_ids(&["D1", "D2", "D3"]);
        assert_eq!(found.len(), 2);
        assert!(found.contains("D3"));
    }

    #[test]
    fn test_fn_index() {
        let index = FnIndex(|id: &str| id.starts_with("RAIL-"));
        let found = index.existing_ids(&["RAIL-1", "SEA-1"]);
        assert_eq!(found, ["RAIL-1".to_string()].into_iter().collect());
    }
}
