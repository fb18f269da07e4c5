//! Structural diff output and the wire form published to the subscriber bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field-level difference produced by the explicit field-wise
/// reconciler (see `SPEC_FULL.md` §4.4a).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEntry {
    Added { value: serde_json::Value },
    Removed { value: serde_json::Value },
    Changed { old: serde_json::Value, new: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    NewEntry,
    UpdatedEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeTopic {
    Tns,
    Xmatch,
}

/// The result of diffing a freshly computed `ObjectMetadata` (or
/// `CrossMatchHit`) against whatever was previously stored, restricted to
/// the fields `{identifiers, object_type, host_name, redshift,
/// latest_detection}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub status: NoticeStatus,
    pub changes: BTreeMap<String, ChangeEntry>,
    #[serde(with = "crate::time::serde_iso_space")]
    pub timestamp: DateTime<Utc>,
}

impl ChangeSummary {
    /// A summary carries substantive content when it has at least one
    /// field-level change beyond its own status/timestamp bookkeeping.
    #[must_use]
    pub fn is_substantive(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Wire form published to the subscriber bus for every new or updated hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub key: String,
    pub topic: NoticeTopic,
    pub status: NoticeStatus,
    pub changes: BTreeMap<String, ChangeEntry>,
    #[serde(with = "crate::time::serde_iso_space")]
    pub timestamp: DateTime<Utc>,
}

impl ChangeNotice {
    #[must_use]
    pub fn from_summary(key: impl Into<String>, topic: NoticeTopic, summary: ChangeSummary) -> Self {
        Self {
            key: key.into(),
            topic,
            status: summary.status,
            changes: summary.changes,
            timestamp: summary.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_changes_are_not_substantive() {
        let summary = ChangeSummary { status: NoticeStatus::NewEntry, changes: BTreeMap::new(), timestamp: Utc::now() };
        assert!(!summary.is_substantive());
    }

    #[test]
    fn non_empty_changes_are_substantive() {
        let mut changes = BTreeMap::new();
        changes.insert(
            "host_name".to_string(),
            ChangeEntry::Added { value: serde_json::json!("NGC 1234") },
        );
        let summary = ChangeSummary { status: NoticeStatus::UpdatedEntry, changes, timestamp: Utc::now() };
        assert!(summary.is_substantive());
    }
}
