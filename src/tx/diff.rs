//! Structural diffs: added, removed, modified component ids.

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use crate::base::ComponentId;
use crate::ops::OperationOutcome;

/// One diff entry: the originating operation of the first mention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub origin: SmolStr,
}

/// The structural diff of a transaction.
///
/// Entries keep first-mention order; merging is idempotent on repeated ids.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelDiff {
    pub added: IndexMap<ComponentId, DiffEntry>,
    pub removed: IndexMap<ComponentId, DiffEntry>,
    pub modified: IndexMap<ComponentId, DiffEntry>,
}

impl ModelDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Fold an operation outcome into the diff.
    ///
    /// An id added earlier in the transaction stays "added" even when later
    /// modified; removing an id added in the same transaction cancels both
    /// mentions.
    pub fn merge(&mut self, outcome: &OperationOutcome, origin: &SmolStr) {
        for id in &outcome.added {
            self.added
                .entry(id.clone())
                .or_insert_with(|| DiffEntry { origin: origin.clone() });
        }
        for id in &outcome.removed {
            if self.added.shift_remove(id).is_some() {
                self.modified.shift_remove(id);
                continue;
            }
            self.modified.shift_remove(id);
            self.removed
                .entry(id.clone())
                .or_insert_with(|| DiffEntry { origin: origin.clone() });
        }
        for id in &outcome.modified {
            if self.added.contains_key(id) || self.removed.contains_key(id) {
                continue;
            }
            self.modified
                .entry(id.clone())
                .or_insert_with(|| DiffEntry { origin: origin.clone() });
        }
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        added: &[&str],
        removed: &[&str],
        modified: &[&str],
    ) -> OperationOutcome {
        OperationOutcome {
            added: added.iter().map(|s| ComponentId::new(s)).collect(),
            removed: removed.iter().map(|s| ComponentId::new(s)).collect(),
            modified: modified.iter().map(|s| ComponentId::new(s)).collect(),
            result: serde_json::Value::Null,
        }
    }

    #[test]
    fn merge_is_idempotent_on_repeated_ids() {
        let mut diff = ModelDiff::new();
        let origin = SmolStr::new("update_component");
        diff.merge(&outcome(&[], &[], &["PMP-1"]), &origin);
        diff.merge(&outcome(&[], &[], &["PMP-1"]), &SmolStr::new("retag_component"));
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[&ComponentId::new("PMP-1")].origin, "update_component");
    }

    #[test]
    fn add_then_modify_stays_added() {
        let mut diff = ModelDiff::new();
        diff.merge(&outcome(&["TNK-1"], &[], &[]), &SmolStr::new("create_component"));
        diff.merge(&outcome(&[], &[], &["TNK-1"]), &SmolStr::new("update_component"));
        assert_eq!(diff.added.len(), 1);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn add_then_remove_cancels() {
        let mut diff = ModelDiff::new();
        diff.merge(&outcome(&["VLV-1"], &[], &[]), &SmolStr::new("create_component"));
        diff.merge(&outcome(&[], &["VLV-1"], &[]), &SmolStr::new("remove_component"));
        assert!(diff.is_empty());
    }

    #[test]
    fn first_mention_order_is_preserved() {
        let mut diff = ModelDiff::new();
        let origin = SmolStr::new("create_component");
        diff.merge(&outcome(&["B-2"], &[], &[]), &origin);
        diff.merge(&outcome(&["A-1"], &[], &[]), &origin);
        diff.merge(&outcome(&["B-2"], &[], &[]), &origin);
        let order: Vec<&str> = diff.added.keys().map(|k| k.as_str()).collect();
        assert_eq!(order, vec!["B-2", "A-1"]);
    }
}
