//! Per-iteration status tracking

use mailguard_core::types::{preview, PREVIEW_CHARS};
use mailguard_core::{IterationRecord, IterationStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Latest status of every iteration, keyed by iteration number
///
/// Updating an iteration replaces its record, so observers always see one
/// entry per iteration.
#[derive(Debug, Clone, Default)]
pub struct IterationHistory {
    records: BTreeMap<u32, IterationRecord>,
}

impl IterationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of an iteration, with a preview of its draft
    pub fn record(&mut self, iteration: u32, status: IterationStatus, draft: &str) {
        self.records.insert(
            iteration,
            IterationRecord {
                iteration,
                status,
                preview: preview(draft, PREVIEW_CHARS),
            },
        );
    }

    pub fn get(&self, iteration: u32) -> Option<&IterationRecord> {
        self.records.get(&iteration)
    }

    /// Records in iteration order
    pub fn records(&self) -> Vec<IterationRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One decision made during a run, as reported by the sync endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub iteration: u32,
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub thought: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_status_wins() {
        let mut history = IterationHistory::new();
        history.record(1, IterationStatus::Starting, "draft one");
        history.record(1, IterationStatus::Issues, "draft one");
        history.record(2, IterationStatus::Starting, "draft two");

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(1).unwrap().status, IterationStatus::Issues);

        let order: Vec<u32> = history.records().iter().map(|r| r.iteration).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_preview_truncated() {
        let mut history = IterationHistory::new();
        history.record(1, IterationStatus::Rewrite, &"x".repeat(500));
        assert_eq!(history.get(1).unwrap().preview.chars().count(), PREVIEW_CHARS);
    }
}
